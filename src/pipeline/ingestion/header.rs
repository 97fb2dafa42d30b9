//! Header sniffing: locate the row of a raw grid that holds column labels.
//!
//! A row qualifies when one cell holds a keyword from the domain's role set
//! and a different cell holds one from its supporting set. A single title
//! cell such as "회원 연락처 명단" therefore never qualifies. Rows are
//! scanned top down and the first qualifying row wins.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::constants::{
    BUYER_ID_KEYWORDS, BUYER_NAME_KEYWORDS, FARMER_KEYWORDS, ITEM_KEYWORDS, PHONE_KEYWORDS,
};
use crate::domain::{DomainType, RawTable, SemanticTable};

static UNNAMED_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^unnamed(:|_)?\d*$").expect("valid unnamed-label regex"));

/// The two keyword sets searched for one domain.
#[derive(Debug, Clone)]
pub struct HeaderKeywords {
    pub role: Vec<&'static str>,
    pub supporting: Vec<&'static str>,
}

impl HeaderKeywords {
    pub fn for_domain(domain: DomainType) -> Self {
        match domain {
            DomainType::Sales => Self {
                role: FARMER_KEYWORDS.to_vec(),
                supporting: ITEM_KEYWORDS
                    .iter()
                    .chain(BUYER_NAME_KEYWORDS)
                    .chain(BUYER_ID_KEYWORDS)
                    .copied()
                    .collect(),
            },
            DomainType::Member => Self {
                role: BUYER_NAME_KEYWORDS
                    .iter()
                    .chain(BUYER_ID_KEYWORDS)
                    .copied()
                    .collect(),
                supporting: PHONE_KEYWORDS.to_vec(),
            },
        }
    }

    pub fn row_qualifies(&self, row: &[String]) -> bool {
        let cells: Vec<String> = row.iter().map(|cell| fold_label(cell)).collect();
        let hits = |keywords: &[&str], cell: &str| {
            !cell.is_empty() && keywords.iter().any(|k| cell.contains(k))
        };

        cells.iter().enumerate().any(|(i, role_cell)| {
            hits(self.role.as_slice(), role_cell.as_str())
                && cells
                    .iter()
                    .enumerate()
                    .any(|(j, other)| j != i && hits(self.supporting.as_slice(), other.as_str()))
        })
    }
}

/// Index of the first qualifying row among the first `scan_rows` rows.
pub fn find_header_row(raw: &RawTable, keywords: &HeaderKeywords, scan_rows: usize) -> Option<usize> {
    raw.rows
        .iter()
        .take(scan_rows)
        .position(|row| keywords.row_qualifies(row))
}

/// Labels lose all whitespace, including embedded newlines.
pub fn clean_label(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Lowercased label without whitespace or `_ - .` separators, the form
/// keywords are compared against: `Member_ID` and `member-id` fold to `memberid`.
pub fn fold_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '_' | '-' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn is_placeholder_label(label: &str) -> bool {
    label.is_empty() || UNNAMED_LABEL.is_match(label)
}

/// Promote `header_row` to labels and slice the rows beneath it as data.
pub fn promote(raw: &RawTable, header_row: usize, domain: DomainType, header_detected: bool) -> SemanticTable {
    let header = raw.rows.get(header_row).cloned().unwrap_or_default();

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<(usize, String)> = Vec::new();
    for (index, cell) in header.iter().enumerate() {
        let label = clean_label(cell);
        if is_placeholder_label(&label) {
            continue;
        }
        let occurrences = seen.entry(label.clone()).or_insert(0);
        let unique = if *occurrences == 0 {
            label
        } else {
            format!("{}.{}", label, occurrences)
        };
        *occurrences += 1;
        kept.push((index, unique));
    }

    let rows = raw
        .rows
        .iter()
        .skip(header_row + 1)
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|row| {
            kept.iter()
                .map(|(index, _)| row.get(*index).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    SemanticTable {
        domain,
        labels: kept.into_iter().map(|(_, label)| label).collect(),
        rows,
        header_row,
        header_detected,
    }
}

/// First row holding any non-blank cell; used when sniffing fails.
pub fn fallback_header_row(raw: &RawTable) -> usize {
    raw.rows
        .iter()
        .position(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .unwrap_or(0)
}
