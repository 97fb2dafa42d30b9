use sha2::{Digest, Sha256};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

use super::TabularIngestor;
use crate::domain::{DomainType, SemanticTable};
use crate::error::Result;

/// Hex SHA-256 of a file's bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Ingested tables keyed by content hash and domain, so re-running the
/// pipeline over the same upload skips the parse.
#[derive(Debug, Default)]
pub struct IngestCache {
    entries: HashMap<(String, DomainType), SemanticTable>,
    hits: u64,
    misses: u64,
}

impl IngestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_ingest(
        &mut self,
        ingestor: &TabularIngestor,
        bytes: &[u8],
        domain: DomainType,
    ) -> Result<&SemanticTable> {
        let hash = content_hash(bytes);
        match self.entries.entry((hash, domain)) {
            Entry::Occupied(entry) => {
                self.hits += 1;
                debug!("ingest cache hit for {} table {}", domain, entry.key().0);
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => {
                self.misses += 1;
                let table = ingestor.ingest(bytes, domain)?;
                Ok(entry.insert(table))
            }
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
