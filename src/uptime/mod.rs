//! Historical uptime reconstruction from Prometheus range data.

pub mod query;
pub mod report;

pub use query::{PrometheusClient, RangeSeries, Sample, SampleSource};
pub use report::{BucketKind, BucketStat, BucketStatus, ServiceUptime, UptimeReport, build_report};
