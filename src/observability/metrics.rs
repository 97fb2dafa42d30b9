//! Metrics for the contact pipeline.
//!
//! Recording goes through the `metrics` facade; nothing is exported unless
//! the host process installs a recorder.

pub mod ingest {
    use crate::domain::DomainType;

    /// Record a file parsed by `strategy`
    pub fn file_ingested(strategy: &str, rows: usize) {
        ::metrics::counter!("outreach_ingest_files_total", "strategy" => strategy.to_string()).increment(1);
        ::metrics::histogram!("outreach_ingest_rows").record(rows as f64);
    }

    /// Record that no header row met the keyword threshold
    pub fn header_fallback(domain: DomainType) {
        ::metrics::counter!("outreach_ingest_header_fallback_total", "domain" => domain.to_string())
            .increment(1);
    }

    pub fn unreadable_file() {
        ::metrics::counter!("outreach_ingest_unreadable_total").increment(1);
    }
}

pub mod join {
    use crate::pipeline::processing::identity::JoinReport;

    pub fn recorded(report: &JoinReport) {
        ::metrics::counter!("outreach_join_matched_total").increment(report.matched as u64);
        ::metrics::counter!("outreach_join_unmatched_total").increment(report.unmatched as u64);
        ::metrics::counter!("outreach_join_duplicate_keys_total").increment(report.duplicate_keys as u64);
        ::metrics::counter!("outreach_join_name_collisions_total").increment(report.name_collisions as u64);
        if report.directory_unusable {
            ::metrics::counter!("outreach_join_directory_unusable_total").increment(1);
        }
    }
}

pub mod curate {
    pub fn recorded(dropped: usize, contacts: usize) {
        ::metrics::counter!("outreach_curate_dropped_total").increment(dropped as u64);
        ::metrics::gauge!("outreach_curate_contacts").set(contacts as f64);
    }
}

pub mod dispatch {
    pub fn sent() {
        ::metrics::counter!("outreach_dispatch_sent_total").increment(1);
    }

    pub fn failed(transient: bool) {
        let kind = if transient { "transient" } else { "permanent" };
        ::metrics::counter!("outreach_dispatch_failed_total", "kind" => kind).increment(1);
    }

    pub fn retried() {
        ::metrics::counter!("outreach_dispatch_retries_total").increment(1);
    }

    pub fn skipped(count: usize) {
        ::metrics::counter!("outreach_dispatch_skipped_total").increment(count as u64);
    }

    /// Record the wall time of one dispatch batch
    pub fn batch_duration(secs: f64) {
        ::metrics::histogram!("outreach_dispatch_batch_duration_seconds").record(secs);
    }
}
