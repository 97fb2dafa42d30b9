//! Data shapes shared by every pipeline stage.
//!
//! All of these are derived from the input files on each run and never
//! persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::SENTINEL_PHONE;

/// Which keyword set the ingestor hunts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainType {
    Sales,
    Member,
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainType::Sales => write!(f, "sales"),
            DomainType::Member => write!(f, "member"),
        }
    }
}

/// Untyped grid straight out of a parse strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows
            .iter()
            .all(|row| row.iter().all(|cell| cell.trim().is_empty()))
    }
}

/// A raw grid with a promoted header row.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticTable {
    pub domain: DomainType,
    /// Column labels, cleaned; placeholder columns already removed.
    pub labels: Vec<String>,
    /// Data rows below the header, aligned with `labels`.
    pub rows: Vec<Vec<String>>,
    /// Index of the promoted row in the raw grid.
    pub header_row: usize,
    /// False when no row met the keyword threshold and row 0 was used.
    pub header_detected: bool,
}

impl SemanticTable {
    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Trimmed cell value; empty cells read as `None`.
    pub fn cell<'a>(&'a self, row: &'a [String], column: usize) -> Option<&'a str> {
        row.get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Iterate the non-empty values of one column.
    pub fn column_values<'a>(&'a self, column: usize) -> impl Iterator<Item = &'a str> + 'a {
        self.rows.iter().filter_map(move |row| self.cell(row, column))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnRole {
    Farmer,
    BuyerName,
    BuyerId,
    Item,
    Phone,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnRole::Farmer => "farmer",
            ColumnRole::BuyerName => "buyer name",
            ColumnRole::BuyerId => "buyer id",
            ColumnRole::Item => "item",
            ColumnRole::Phone => "phone",
        };
        write!(f, "{}", name)
    }
}

/// Column label chosen for each role. Every role is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRoleMap {
    pub farmer: Option<String>,
    pub buyer_name: Option<String>,
    pub buyer_id: Option<String>,
    pub item: Option<String>,
    pub phone: Option<String>,
}

impl ColumnRoleMap {
    pub fn get(&self, role: ColumnRole) -> Option<&str> {
        match role {
            ColumnRole::Farmer => self.farmer.as_deref(),
            ColumnRole::BuyerName => self.buyer_name.as_deref(),
            ColumnRole::BuyerId => self.buyer_id.as_deref(),
            ColumnRole::Item => self.item.as_deref(),
            ColumnRole::Phone => self.phone.as_deref(),
        }
    }

    pub fn set(&mut self, role: ColumnRole, label: String) {
        let slot = match role {
            ColumnRole::Farmer => &mut self.farmer,
            ColumnRole::BuyerName => &mut self.buyer_name,
            ColumnRole::BuyerId => &mut self.buyer_id,
            ColumnRole::Item => &mut self.item,
            ColumnRole::Phone => &mut self.phone,
        };
        *slot = Some(label);
    }

    /// Position of the role's column in `table`, if resolved.
    pub fn index_in(&self, role: ColumnRole, table: &SemanticTable) -> Option<usize> {
        self.get(role).and_then(|label| table.column_index(label))
    }
}

/// One transaction row, typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesRecord {
    pub farmer: String,
    pub buyer_name: Option<String>,
    pub buyer_id: Option<String>,
    pub item: Option<String>,
    pub phone: Option<String>,
}

/// One directory row, keyed for the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRecord {
    pub key: JoinKey,
    pub name: Option<String>,
    pub phone: Phone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    Id,
    Name,
}

/// Normalized identity used on both sides of the join.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinKey {
    pub kind: KeyKind,
    pub value: String,
}

impl JoinKey {
    /// Trimmed id with a spreadsheet float suffix (`.0`) removed.
    pub fn from_id(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let value = trimmed.strip_suffix(".0").unwrap_or(trimmed).trim();
        if value.is_empty() {
            return None;
        }
        Some(Self {
            kind: KeyKind::Id,
            value: value.to_string(),
        })
    }

    pub fn from_name(raw: &str) -> Option<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }
        Some(Self {
            kind: KeyKind::Name,
            value: value.to_string(),
        })
    }
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Output of phone normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phone {
    /// Hyphenated national format.
    Canonical(String),
    /// Digits that fit no known length; passed through unformatted.
    Suspect(String),
    /// No verified contact.
    Sentinel,
}

impl Phone {
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Phone::Sentinel)
    }

    pub fn is_canonical(&self) -> bool {
        matches!(self, Phone::Canonical(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Phone::Canonical(s) | Phone::Suspect(s) => s,
            Phone::Sentinel => SENTINEL_PHONE,
        }
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One buyer's purchase count with one producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseAggregate {
    pub farmer: String,
    pub join_key: JoinKey,
    pub display_name: String,
    pub item: Option<String>,
    pub count: u32,
    /// First phone seen on the sales side for this buyer, unnormalized.
    pub phone_hint: Option<String>,
}

/// A purchase aggregate after the directory join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinedPurchase {
    pub aggregate: PurchaseAggregate,
    pub phone: Phone,
}

/// Final unit handed to export and dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactResult {
    pub display_name: String,
    pub phone: Phone,
    pub count: u32,
}
