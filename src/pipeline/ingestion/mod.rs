// Ingestion: bytes of unknown format -> semantic table

pub mod cache;
pub mod header;
pub mod strategy;

use tracing::{debug, info, instrument, warn};

use crate::constants::DEFAULT_SCAN_ROWS;
use crate::domain::{DomainType, RawTable, SemanticTable};
use crate::error::{PipelineError, Result, StrategyFailure};
use crate::observability::metrics;

pub use cache::{content_hash, IngestCache};
pub use header::HeaderKeywords;
pub use strategy::{default_strategies, ParseStrategy, TextEncoding};

/// Loads spreadsheet or delimited-text exports and promotes their header row.
pub struct TabularIngestor {
    strategies: Vec<Box<dyn ParseStrategy>>,
    scan_rows: usize,
}

impl TabularIngestor {
    /// Create an ingestor with the default strategy order
    pub fn new() -> Self {
        Self {
            strategies: default_strategies(),
            scan_rows: DEFAULT_SCAN_ROWS,
        }
    }

    pub fn with_scan_rows(mut self, scan_rows: usize) -> Self {
        self.scan_rows = scan_rows.max(1);
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<Box<dyn ParseStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Run strategies in order until one yields a grid.
    ///
    /// Returns the grid and the name of the strategy that produced it. Every
    /// failed attempt is carried in the error when nothing works.
    pub fn read_raw(&self, bytes: &[u8]) -> Result<(RawTable, String)> {
        let mut attempts = Vec::new();

        for strategy in &self.strategies {
            match strategy.parse(bytes) {
                Ok(table) => {
                    debug!(
                        "strategy {} produced {} rows after {} failed attempts",
                        strategy.name(),
                        table.rows.len(),
                        attempts.len()
                    );
                    return Ok((table, strategy.name().to_string()));
                }
                Err(error) => {
                    debug!("strategy {} failed: {}", strategy.name(), error);
                    attempts.push(StrategyFailure {
                        strategy: strategy.name().to_string(),
                        error,
                    });
                }
            }
        }

        metrics::ingest::unreadable_file();
        Err(PipelineError::UnreadableFile { attempts })
    }

    /// Parse `bytes` and promote the header row for `domain`.
    ///
    /// A missing header is not an error: the first non-blank row is used and
    /// the table is marked `header_detected = false`.
    #[instrument(skip(self, bytes), fields(bytes_len = bytes.len()))]
    pub fn ingest(&self, bytes: &[u8], domain: DomainType) -> Result<SemanticTable> {
        let (raw, strategy) = self.read_raw(bytes)?;
        let keywords = HeaderKeywords::for_domain(domain);

        let table = match header::find_header_row(&raw, &keywords, self.scan_rows) {
            Some(row) => header::promote(&raw, row, domain, true),
            None => {
                let row = header::fallback_header_row(&raw);
                warn!(
                    "no {} header found in first {} rows; falling back to row {}",
                    domain, self.scan_rows, row
                );
                metrics::ingest::header_fallback(domain);
                header::promote(&raw, row, domain, false)
            }
        };

        metrics::ingest::file_ingested(&strategy, table.rows.len());
        info!(
            "ingested {} table via {}: header at row {}, {} columns, {} rows",
            domain,
            strategy,
            table.header_row,
            table.labels.len(),
            table.rows.len()
        );
        Ok(table)
    }
}

impl Default for TabularIngestor {
    fn default() -> Self {
        Self::new()
    }
}

/// Ingest with default settings.
pub fn ingest(bytes: &[u8], domain: DomainType) -> Result<SemanticTable> {
    TabularIngestor::new().ingest(bytes, domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StrategyError;

    #[test]
    fn test_ingest_finds_header_in_csv() {
        let csv = "판매내역\n농가명,상품명,회원번호,회원명\n행복농장,사과,1,김철수\n";
        let table = ingest(csv.as_bytes(), DomainType::Sales).unwrap();
        assert!(table.header_detected);
        assert_eq!(table.header_row, 1);
        assert_eq!(table.labels, vec!["농가명", "상품명", "회원번호", "회원명"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_header_fallback_uses_first_row() {
        let mut csv = String::from("a,b,c\n");
        for i in 0..25 {
            csv.push_str(&format!("{},{},{}\n", i, i + 1, i + 2));
        }
        let table = ingest(csv.as_bytes(), DomainType::Sales).unwrap();
        assert!(!table.header_detected);
        assert_eq!(table.header_row, 0);
        assert_eq!(table.labels, vec!["a", "b", "c"]);
        assert_eq!(table.rows.len(), 25);
    }

    #[test]
    fn test_unreadable_file_lists_every_attempt() {
        let err = ingest(&[0xFF, 0xFF, 0x00, 0x81], DomainType::Member).unwrap_err();
        match err {
            PipelineError::UnreadableFile { attempts } => {
                assert_eq!(attempts.len(), default_strategies().len());
                assert_eq!(attempts[0].strategy, "spreadsheet");
                assert!(matches!(attempts[1].error, StrategyError::Encoding("utf-8-sig")));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    struct FixedStrategy(RawTable);

    impl ParseStrategy for FixedStrategy {
        fn name(&self) -> &str {
            "fixed"
        }

        fn parse(&self, _bytes: &[u8]) -> std::result::Result<RawTable, StrategyError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_custom_strategy_and_scan_window() {
        let mut rows: Vec<Vec<String>> = (0..5).map(|i| vec![format!("title {}", i)]).collect();
        rows.push(vec!["회원명".into(), "핸드폰".into()]);
        rows.push(vec!["김철수".into(), "010-1111-2222".into()]);

        let narrow = TabularIngestor::new()
            .with_strategies(vec![Box::new(FixedStrategy(RawTable::new(rows.clone())))])
            .with_scan_rows(3);
        let table = narrow.ingest(b"", DomainType::Member).unwrap();
        assert!(!table.header_detected);

        let wide = TabularIngestor::new()
            .with_strategies(vec![Box::new(FixedStrategy(RawTable::new(rows)))])
            .with_scan_rows(10);
        let table = wide.ingest(b"", DomainType::Member).unwrap();
        assert!(table.header_detected);
        assert_eq!(table.header_row, 5);
        assert_eq!(table.rows, vec![vec!["김철수", "010-1111-2222"]]);
    }
}
