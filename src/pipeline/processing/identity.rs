//! Identity resolution: attach directory phones to purchase aggregates.
//!
//! Directory rows are keyed with the same `JoinKey` rules as the sales side,
//! rows without a key are dropped, and duplicate keys keep the first row so
//! every buyer gets at most one phone.

use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

use super::phone::PhoneNormalizer;
use super::roles::MatchMode;
use crate::domain::{
    ColumnRole, ColumnRoleMap, JoinKey, JoinedPurchase, KeyKind, MemberRecord, Phone,
    PurchaseAggregate, SemanticTable,
};
use crate::observability::metrics;

/// What happened during one join.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinReport {
    pub matched: usize,
    pub unmatched: usize,
    /// Directory rows dropped because an earlier row had the same key.
    pub duplicate_keys: usize,
    /// By-name keys shared by directory rows with different phones: likely
    /// distinct people who will be merged into one contact.
    pub name_collisions: usize,
    /// Directory rows dropped for lacking a key.
    pub keyless_rows: usize,
    /// True when the directory had no usable key or phone column.
    pub directory_unusable: bool,
}

/// The deduplicated directory side of a join.
#[derive(Debug, Clone, Default)]
pub struct MemberDirectory {
    members: HashMap<JoinKey, MemberRecord>,
    pub duplicate_keys: usize,
    pub name_collisions: usize,
    pub keyless_rows: usize,
}

impl MemberDirectory {
    /// Key every row by the identity column `mode` selects; first row per key wins.
    pub fn build(
        table: &SemanticTable,
        roles: &ColumnRoleMap,
        mode: MatchMode,
        normalizer: &PhoneNormalizer,
    ) -> Option<Self> {
        let key_role = match mode {
            MatchMode::ById => ColumnRole::BuyerId,
            MatchMode::ByName => ColumnRole::BuyerName,
        };
        let key_col = roles.index_in(key_role, table)?;
        let phone_col = roles.index_in(ColumnRole::Phone, table)?;
        let name_col = roles.index_in(ColumnRole::BuyerName, table);

        let mut directory = MemberDirectory::default();
        let mut collided: HashSet<JoinKey> = HashSet::new();

        for row in &table.rows {
            let raw_key = table.cell(row, key_col);
            let key = match mode {
                MatchMode::ById => raw_key.and_then(JoinKey::from_id),
                MatchMode::ByName => raw_key.and_then(JoinKey::from_name),
            };
            let Some(key) = key else {
                directory.keyless_rows += 1;
                continue;
            };

            let phone = normalizer.normalize(table.cell(row, phone_col));
            match directory.members.entry(key) {
                Entry::Occupied(existing) => {
                    directory.duplicate_keys += 1;
                    debug!("duplicate directory key '{}'; keeping first row", existing.key());
                    if mode == MatchMode::ByName
                        && existing.get().phone != phone
                        && collided.insert(existing.key().clone())
                    {
                        directory.name_collisions += 1;
                    }
                }
                Entry::Vacant(slot) => {
                    let name = name_col.and_then(|c| table.cell(row, c)).map(str::to_string);
                    let key = slot.key().clone();
                    slot.insert(MemberRecord { key, name, phone });
                }
            }
        }

        Some(directory)
    }

    pub fn get(&self, key: &JoinKey) -> Option<&MemberRecord> {
        self.members.get(key)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Joins aggregated purchases against a membership directory.
#[derive(Debug, Default, Clone)]
pub struct IdentityResolver {
    normalizer: PhoneNormalizer,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self {
            normalizer: PhoneNormalizer::new(),
        }
    }

    pub fn resolve_contacts(
        &self,
        purchases: &[PurchaseAggregate],
        directory: &SemanticTable,
        directory_roles: &ColumnRoleMap,
        match_mode: MatchMode,
    ) -> Vec<JoinedPurchase> {
        self.resolve_contacts_with_report(purchases, directory, directory_roles, match_mode)
            .0
    }

    /// Left join on `JoinKey`. Unmatched purchases get the sentinel phone.
    #[instrument(skip_all, fields(purchases = purchases.len(), mode = ?match_mode))]
    pub fn resolve_contacts_with_report(
        &self,
        purchases: &[PurchaseAggregate],
        directory: &SemanticTable,
        directory_roles: &ColumnRoleMap,
        match_mode: MatchMode,
    ) -> (Vec<JoinedPurchase>, JoinReport) {
        let mut report = JoinReport::default();

        let Some(members) = MemberDirectory::build(directory, directory_roles, match_mode, &self.normalizer)
        else {
            warn!(
                "directory has no usable {:?} key or phone column (labels: {:?}); all phones unverified",
                match_mode, directory.labels
            );
            report.directory_unusable = true;
            report.unmatched = purchases.len();
            metrics::join::recorded(&report);
            return (with_sentinel(purchases), report);
        };

        report.duplicate_keys = members.duplicate_keys;
        report.name_collisions = members.name_collisions;
        report.keyless_rows = members.keyless_rows;
        if members.duplicate_keys > 0 {
            info!(
                "{} duplicate directory keys resolved first-wins",
                members.duplicate_keys
            );
        }
        if members.name_collisions > 0 {
            warn!(
                "{} names are shared by members with different phones; by-name matches may merge distinct people",
                members.name_collisions
            );
        }

        let joined: Vec<JoinedPurchase> = purchases
            .iter()
            .map(|aggregate| {
                let member = purchase_key(aggregate, match_mode).and_then(|key| members.get(&key));
                match member {
                    Some(member) => {
                        report.matched += 1;
                        let mut aggregate = aggregate.clone();
                        // Id-only sales rows borrow the directory's name.
                        if aggregate.display_name == aggregate.join_key.value {
                            if let Some(name) = member.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                                aggregate.display_name = name.to_string();
                            }
                        }
                        JoinedPurchase {
                            aggregate,
                            phone: member.phone.clone(),
                        }
                    }
                    None => {
                        report.unmatched += 1;
                        JoinedPurchase {
                            aggregate: aggregate.clone(),
                            phone: Phone::Sentinel,
                        }
                    }
                }
            })
            .collect();

        info!(
            "join matched {} of {} buyers against {} directory keys",
            report.matched,
            purchases.len(),
            members.len()
        );
        metrics::join::recorded(&report);
        (joined, report)
    }

    /// Directory-less join: use each buyer's own sales-side phone.
    pub fn attach_sales_phones(&self, purchases: &[PurchaseAggregate]) -> Vec<JoinedPurchase> {
        purchases
            .iter()
            .map(|aggregate| JoinedPurchase {
                aggregate: aggregate.clone(),
                phone: self.normalizer.normalize(aggregate.phone_hint.as_deref()),
            })
            .collect()
    }
}

/// Key a purchase aggregate the way the directory side is keyed.
fn purchase_key(aggregate: &PurchaseAggregate, mode: MatchMode) -> Option<JoinKey> {
    match mode {
        MatchMode::ById if aggregate.join_key.kind == KeyKind::Id => Some(aggregate.join_key.clone()),
        MatchMode::ById => None,
        MatchMode::ByName => JoinKey::from_name(&aggregate.display_name),
    }
}

fn with_sentinel(purchases: &[PurchaseAggregate]) -> Vec<JoinedPurchase> {
    purchases
        .iter()
        .map(|aggregate| JoinedPurchase {
            aggregate: aggregate.clone(),
            phone: Phone::Sentinel,
        })
        .collect()
}
