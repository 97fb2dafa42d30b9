//! Column role resolution.
//!
//! Each role has an ordered keyword list and a list of exclusion keywords.
//! Tie-break: the first column, in table order, whose folded label
//! (lowercased, separators removed) contains any keyword and no exclusion
//! keyword. No scoring across candidates.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{
    BUYER_ID_KEYWORDS, BUYER_NAME_EXCLUDES, BUYER_NAME_KEYWORDS, FARMER_EXCLUDES, FARMER_KEYWORDS,
    ITEM_EXCLUDES, ITEM_KEYWORDS, PHONE_KEYWORDS,
};
use crate::domain::{ColumnRole, ColumnRoleMap, DomainType, SemanticTable};
use crate::error::{PipelineError, Result};
use crate::pipeline::ingestion::header::fold_label;

/// Keywords deciding which column plays one role.
#[derive(Debug, Clone, Copy)]
pub struct RoleRule {
    pub role: ColumnRole,
    pub keywords: &'static [&'static str],
    pub excludes: &'static [&'static str],
}

impl RoleRule {
    pub fn matches(&self, label: &str) -> bool {
        let label = fold_label(label);
        self.keywords.iter().any(|k| label.contains(k))
            && !self.excludes.iter().any(|x| label.contains(x))
    }
}

pub const ROLE_RULES: [RoleRule; 5] = [
    RoleRule {
        role: ColumnRole::Farmer,
        keywords: FARMER_KEYWORDS,
        excludes: FARMER_EXCLUDES,
    },
    RoleRule {
        role: ColumnRole::BuyerName,
        keywords: BUYER_NAME_KEYWORDS,
        excludes: BUYER_NAME_EXCLUDES,
    },
    RoleRule {
        role: ColumnRole::BuyerId,
        keywords: BUYER_ID_KEYWORDS,
        excludes: &[],
    },
    RoleRule {
        role: ColumnRole::Item,
        keywords: ITEM_KEYWORDS,
        excludes: ITEM_EXCLUDES,
    },
    RoleRule {
        role: ColumnRole::Phone,
        keywords: PHONE_KEYWORDS,
        excludes: &[],
    },
];

/// Roles a table of this domain cannot do without.
pub fn required_roles(domain: DomainType) -> &'static [ColumnRole] {
    match domain {
        DomainType::Sales => &[ColumnRole::Farmer, ColumnRole::BuyerName],
        DomainType::Member => &[],
    }
}

/// How sales buyers are matched to directory members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMode {
    ById,
    ByName,
}

impl MatchMode {
    /// `ById` when both sides expose an id column, otherwise `ByName`.
    pub fn choose(sales: &ColumnRoleMap, directory: &ColumnRoleMap) -> Self {
        if sales.buyer_id.is_some() && directory.buyer_id.is_some() {
            MatchMode::ById
        } else {
            MatchMode::ByName
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnRoleResolver {
    rules: Vec<RoleRule>,
}

impl ColumnRoleResolver {
    pub fn new() -> Self {
        Self {
            rules: ROLE_RULES.to_vec(),
        }
    }

    /// Map every role that some column satisfies. Unresolved roles stay `None`.
    pub fn resolve(&self, table: &SemanticTable) -> ColumnRoleMap {
        let mut map = ColumnRoleMap::default();
        for rule in &self.rules {
            if let Some(label) = table.labels.iter().find(|label| rule.matches(label)) {
                debug!("{} role -> column '{}'", rule.role, label);
                map.set(rule.role, label.clone());
            }
        }
        map
    }

    /// Resolve, then fail if a role required for the table's domain is missing.
    pub fn resolve_validated(&self, table: &SemanticTable) -> Result<ColumnRoleMap> {
        let map = self.resolve(table);
        for &role in required_roles(table.domain) {
            if map.get(role).is_none() {
                warn!(
                    "required {} column not found among {:?}",
                    role, table.labels
                );
                return Err(PipelineError::MissingRequiredColumn {
                    role,
                    available: table.labels.clone(),
                });
            }
        }
        Ok(map)
    }
}

impl Default for ColumnRoleResolver {
    fn default() -> Self {
        Self::new()
    }
}
