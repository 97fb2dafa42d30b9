use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::domain::{ContactResult, JoinedPurchase, Phone};
use crate::observability::metrics;

/// Filtering applied before contacts are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CurationOptions {
    /// Drop rows without a directory-verified phone.
    pub strict: bool,
    /// Also drop phones that did not fit a known format.
    pub drop_suspect: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ResultCurator;

impl ResultCurator {
    pub fn new() -> Self {
        Self
    }

    pub fn curate(&self, joined: &[JoinedPurchase], strict: bool) -> Vec<ContactResult> {
        self.curate_with(
            joined,
            CurationOptions {
                strict,
                drop_suspect: false,
            },
        )
    }

    /// Filter, merge rows sharing `(name, phone)` by summing counts, and sort
    /// by count descending. Merged rows keep the position of their first member
    /// among equal counts.
    #[instrument(skip_all, fields(rows = joined.len(), strict = options.strict))]
    pub fn curate_with(&self, joined: &[JoinedPurchase], options: CurationOptions) -> Vec<ContactResult> {
        let mut contacts: Vec<ContactResult> = Vec::new();
        let mut index: HashMap<(String, Phone), usize> = HashMap::new();
        let mut dropped = 0usize;

        for row in joined {
            if (options.strict && row.phone.is_sentinel())
                || (options.drop_suspect && matches!(row.phone, Phone::Suspect(_)))
            {
                dropped += 1;
                continue;
            }

            let name = merge_name(&row.aggregate.display_name);
            let key = (name.clone(), row.phone.clone());
            match index.get(&key) {
                Some(&slot) => contacts[slot].count += row.aggregate.count,
                None => {
                    index.insert(key, contacts.len());
                    contacts.push(ContactResult {
                        display_name: name,
                        phone: row.phone.clone(),
                        count: row.aggregate.count,
                    });
                }
            }
        }

        let merged = joined.len() - dropped - contacts.len();
        debug!("curation dropped {} rows and merged {} duplicates", dropped, merged);
        metrics::curate::recorded(dropped, contacts.len());

        contacts.sort_by(|a, b| b.count.cmp(&a.count));
        contacts
    }
}

/// Names compare with surrounding whitespace removed and inner runs collapsed.
fn merge_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comma-separated top-N list for pasting into a messaging app. Contacts
/// without a verified phone contribute their name.
pub fn outreach_list(contacts: &[ContactResult], limit: usize) -> String {
    contacts
        .iter()
        .take(limit)
        .map(|c| match &c.phone {
            Phone::Canonical(phone) => phone.clone(),
            _ => c.display_name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
