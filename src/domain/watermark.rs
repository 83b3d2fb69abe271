//! Per-source ingestion watermark.

use chrono::{DateTime, Utc};

/// One record per source name, marking the lower bound for the next run.
///
/// Created on first successful run; updated on each successful run;
/// never deleted by the Ingestion Engine itself (§3.2).
#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    pub source: String,
    pub last_run: DateTime<Utc>,
    pub last_count: i64,
    pub updated_at: DateTime<Utc>,
}
