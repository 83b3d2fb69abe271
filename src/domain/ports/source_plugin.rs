//! Source Plugin port (§4.4.1): the contract an ingestion source
//! implements so the Ingestion Engine can schedule and run it uniformly,
//! whether it's a filesystem watcher, a polling HTTP client, or a
//! one-shot importer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

use crate::domain::entity::NewEntity;

use super::define_port_error;

define_port_error! {
    pub enum SourcePluginError {
        Discovery { message: String } => "source discovery failed: {message}",
        Extraction { message: String } => "source extraction failed: {message}",
        Unavailable { message: String } => "source unavailable: {message}",
    }
}

/// A unit of work discovered by [`SourcePlugin::discover`]: opaque to the
/// engine, meaningful only to the plugin that produced it (a file path, a
/// paginated API cursor, a date range).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem(pub String);

/// Outcome of extracting one [`WorkItem`]: the entities it yielded, ready
/// for enrichment and upsert by the engine.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub entities: Vec<NewEntity>,
}

/// A source of entities, driven by the Ingestion Engine's run loop
/// (§4.4.2). Implementations own their own durable cursor/offset only if
/// that is cheaper than relying on the engine's watermark; the engine is
/// the source of truth for `(last_run, last_count)`.
#[async_trait]
pub trait SourcePlugin: Send + Sync {
    /// Stable identifier, matching the `source` column entities from this
    /// plugin are upserted with, and the watermark key.
    fn name(&self) -> &str;

    /// Whether entities from this plugin carry native coordinates,
    /// exempting them from the Location Enrichment Resolver.
    fn has_native_location(&self) -> bool;

    /// Find work to do since the watermark, without extracting payloads
    /// yet (cheap: a directory listing, a single index query).
    ///
    /// Returns a lazy, finite, non-restartable stream: the engine pulls one
    /// item at a time and extracts it before asking for the next, so a
    /// plugin never has to hold its entire backlog in memory at once.
    async fn discover(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<BoxStream<'static, Result<WorkItem, SourcePluginError>>, SourcePluginError>;

    /// Extract entities for one discovered item.
    async fn extract(&self, item: &WorkItem) -> Result<ExtractionResult, SourcePluginError>;
}

#[cfg(test)]
mockall::mock! {
    pub SourcePlugin {}

    #[async_trait]
    impl SourcePlugin for SourcePlugin {
        fn name(&self) -> &str;
        fn has_native_location(&self) -> bool;
        async fn discover(&self, since: Option<DateTime<Utc>>) -> Result<BoxStream<'static, Result<WorkItem, SourcePluginError>>, SourcePluginError>;
        async fn extract(&self, item: &WorkItem) -> Result<ExtractionResult, SourcePluginError>;
    }
}
