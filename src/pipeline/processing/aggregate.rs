use std::collections::{BTreeSet, HashMap};
use tracing::{debug, instrument};

use crate::domain::{ColumnRole, ColumnRoleMap, JoinKey, PurchaseAggregate, SalesRecord, SemanticTable};
use crate::error::{PipelineError, Result};

/// Typed view of a sales table. Rows without a producer value are dropped.
pub fn sales_records(table: &SemanticTable, roles: &ColumnRoleMap) -> Result<Vec<SalesRecord>> {
    let farmer_col = required_index(table, roles, ColumnRole::Farmer)?;
    let name_col = roles.index_in(ColumnRole::BuyerName, table);
    let id_col = roles.index_in(ColumnRole::BuyerId, table);
    let item_col = roles.index_in(ColumnRole::Item, table);
    let phone_col = roles.index_in(ColumnRole::Phone, table);

    let cell = |row: &[String], col: Option<usize>| -> Option<String> {
        col.and_then(|c| table.cell(row, c)).map(str::to_string)
    };

    Ok(table
        .rows
        .iter()
        .filter_map(|row| {
            let row = row.as_slice();
            let farmer = table.cell(row, farmer_col)?.to_string();
            Some(SalesRecord {
                farmer,
                buyer_name: cell(row, name_col),
                buyer_id: cell(row, id_col),
                item: cell(row, item_col),
                phone: cell(row, phone_col),
            })
        })
        .collect())
}

fn required_index(table: &SemanticTable, roles: &ColumnRoleMap, role: ColumnRole) -> Result<usize> {
    roles
        .index_in(role, table)
        .ok_or_else(|| PipelineError::MissingRequiredColumn {
            role,
            available: table.labels.clone(),
        })
}

/// Groups one producer's sales into per-buyer purchase counts.
#[derive(Debug, Default, Clone)]
pub struct PurchaseAggregator;

impl PurchaseAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Count purchases per buyer for `farmer`, optionally for one item only.
    ///
    /// Buyers are keyed by id when the id column is resolved, otherwise by
    /// trimmed name. Rows lacking that key are not counted. Output is sorted
    /// by count descending; ties keep first-seen order.
    #[instrument(skip(self, sales, roles))]
    pub fn aggregate(
        &self,
        sales: &SemanticTable,
        roles: &ColumnRoleMap,
        farmer: &str,
        item_filter: Option<&str>,
    ) -> Result<Vec<PurchaseAggregate>> {
        let records = sales_records(sales, roles)?;
        let by_id = roles.buyer_id.is_some();
        let farmer = farmer.trim();
        // Without an item column the filter cannot apply.
        let item_filter = item_filter
            .map(str::trim)
            .filter(|_| roles.item.is_some());

        let mut groups: Vec<PurchaseAggregate> = Vec::new();
        let mut index: HashMap<JoinKey, usize> = HashMap::new();
        let mut keyless = 0usize;

        for record in records.iter().filter(|r| r.farmer == farmer) {
            if let Some(wanted) = item_filter {
                if record.item.as_deref() != Some(wanted) {
                    continue;
                }
            }

            let key = if by_id {
                record.buyer_id.as_deref().and_then(JoinKey::from_id)
            } else {
                record.buyer_name.as_deref().and_then(JoinKey::from_name)
            };
            let Some(key) = key else {
                keyless += 1;
                continue;
            };

            match index.get(&key) {
                Some(&slot) => {
                    let group = &mut groups[slot];
                    group.count += 1;
                    if group.phone_hint.is_none() {
                        group.phone_hint = record.phone.clone();
                    }
                    if group.display_name == group.join_key.value {
                        if let Some(name) = &record.buyer_name {
                            group.display_name = name.clone();
                        }
                    }
                }
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push(PurchaseAggregate {
                        farmer: farmer.to_string(),
                        display_name: record
                            .buyer_name
                            .clone()
                            .unwrap_or_else(|| key.value.clone()),
                        join_key: key,
                        item: item_filter.map(str::to_string),
                        count: 1,
                        phone_hint: record.phone.clone(),
                    });
                }
            }
        }

        if keyless > 0 {
            debug!("{} rows for {} had no buyer key and were not counted", keyless, farmer);
        }

        // Stable: equal counts keep discovery order.
        groups.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(groups)
    }
}

/// Distinct producer names, sorted, optionally filtered by substring.
pub fn list_farmers(table: &SemanticTable, roles: &ColumnRoleMap, query: Option<&str>) -> Result<Vec<String>> {
    let farmer_col = required_index(table, roles, ColumnRole::Farmer)?;
    let query = query.map(str::trim).filter(|q| !q.is_empty());

    let farmers: BTreeSet<&str> = table
        .column_values(farmer_col)
        .filter(|name| query.map_or(true, |q| name.contains(q)))
        .collect();

    Ok(farmers.into_iter().map(str::to_string).collect())
}

/// Most frequently sold items for one producer, count descending.
pub fn top_items(
    table: &SemanticTable,
    roles: &ColumnRoleMap,
    farmer: &str,
    limit: usize,
) -> Result<Vec<(String, u32)>> {
    if roles.item.is_none() {
        return Ok(Vec::new());
    }
    let farmer = farmer.trim();

    let mut counts: Vec<(String, u32)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in sales_records(table, roles)?.into_iter().filter(|r| r.farmer == farmer) {
        let Some(item) = record.item else { continue };
        match index.get(&item) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                index.insert(item.clone(), counts.len());
                counts.push((item, 1));
            }
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(limit);
    Ok(counts)
}
