use serde::Serialize;
use tracing::{info, warn};

use crate::constants::DEFAULT_TOP_ITEMS;
use crate::domain::{ContactResult, DomainType};
use crate::error::Result;
use crate::pipeline::ingestion::{IngestCache, TabularIngestor};
use crate::pipeline::processing::{
    list_farmers, top_items, ColumnRoleResolver, CurationOptions, IdentityResolver, JoinReport,
    MatchMode, PurchaseAggregator, ResultCurator,
};

/// Parameters for one producer's contact list.
#[derive(Debug, Clone)]
pub struct OutreachRequest {
    pub farmer: String,
    pub item: Option<String>,
    /// Forced join mode; `None` picks by-id when both sides have ids.
    pub match_mode: Option<MatchMode>,
    pub curation: CurationOptions,
    pub top_items: usize,
}

impl OutreachRequest {
    pub fn new(farmer: impl Into<String>) -> Self {
        Self {
            farmer: farmer.into(),
            item: None,
            match_mode: None,
            curation: CurationOptions::default(),
            top_items: DEFAULT_TOP_ITEMS,
        }
    }
}

/// Everything the pipeline learned while building one contact list.
#[derive(Debug, Clone, Serialize)]
pub struct OutreachReport {
    pub farmer: String,
    pub contacts: Vec<ContactResult>,
    /// `None` when no directory was supplied.
    pub match_mode: Option<MatchMode>,
    pub join_report: Option<JoinReport>,
    pub top_items: Vec<(String, u32)>,
    pub sales_header_detected: bool,
    pub directory_header_detected: Option<bool>,
}

/// Runs ingestion through curation for sales exports and a member directory.
///
/// Tables are cached by content hash, so several producers can be processed
/// from the same uploads without re-parsing.
pub struct OutreachUseCase {
    ingestor: TabularIngestor,
    cache: IngestCache,
    resolver: ColumnRoleResolver,
    aggregator: PurchaseAggregator,
    identity: IdentityResolver,
    curator: ResultCurator,
}

impl OutreachUseCase {
    pub fn new(ingestor: TabularIngestor) -> Self {
        Self {
            ingestor,
            cache: IngestCache::new(),
            resolver: ColumnRoleResolver::new(),
            aggregator: PurchaseAggregator::new(),
            identity: IdentityResolver::new(),
            curator: ResultCurator::new(),
        }
    }

    pub fn cache(&self) -> &IngestCache {
        &self.cache
    }

    /// Producers present in the sales export, optionally filtered by substring.
    pub fn farmers(&mut self, sales: &[u8], query: Option<&str>) -> Result<Vec<String>> {
        let table = self.cache.get_or_ingest(&self.ingestor, sales, DomainType::Sales)?;
        let roles = self.resolver.resolve_validated(table)?;
        list_farmers(table, &roles, query)
    }

    pub fn run(
        &mut self,
        sales: &[u8],
        directory: Option<&[u8]>,
        request: &OutreachRequest,
    ) -> Result<OutreachReport> {
        let (aggregates, sales_roles, top, sales_header_detected) = {
            let table = self.cache.get_or_ingest(&self.ingestor, sales, DomainType::Sales)?;
            let roles = self.resolver.resolve_validated(table)?;
            let aggregates = self.aggregator.aggregate(
                table,
                &roles,
                &request.farmer,
                request.item.as_deref(),
            )?;
            let top = top_items(table, &roles, &request.farmer, request.top_items)?;
            (aggregates, roles, top, table.header_detected)
        };

        if aggregates.is_empty() {
            warn!("no purchases found for producer '{}'", request.farmer);
        }

        let (joined, match_mode, join_report, directory_header_detected) = match directory {
            Some(bytes) => {
                let table = self.cache.get_or_ingest(&self.ingestor, bytes, DomainType::Member)?;
                let roles = self.resolver.resolve_validated(table)?;
                let mode = request
                    .match_mode
                    .unwrap_or_else(|| MatchMode::choose(&sales_roles, &roles));
                let (joined, report) =
                    self.identity
                        .resolve_contacts_with_report(&aggregates, table, &roles, mode);
                (joined, Some(mode), Some(report), Some(table.header_detected))
            }
            None => {
                info!("no directory supplied; using phones from the sales export");
                (self.identity.attach_sales_phones(&aggregates), None, None, None)
            }
        };

        let contacts = self.curator.curate_with(&joined, request.curation);
        info!(
            "{} contacts for '{}' from {} buyers",
            contacts.len(),
            request.farmer,
            aggregates.len()
        );

        Ok(OutreachReport {
            farmer: request.farmer.clone(),
            contacts,
            match_mode,
            join_report,
            top_items: top,
            sales_header_detected,
            directory_header_detected,
        })
    }
}

impl Default for OutreachUseCase {
    fn default() -> Self {
        Self::new(TabularIngestor::new())
    }
}
