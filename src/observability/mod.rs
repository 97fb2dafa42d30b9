// Observability: per-stage metrics

pub mod metrics;
