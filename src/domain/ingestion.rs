//! Ingestion Engine: runs source plugins, normalizes their output,
//! enriches missing locations, upserts into the Store, and advances
//! watermarks (§4.4.2 run protocol).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tracing::{info, warn};

use super::Error;
use super::entity::NewEntity;
use super::ports::{Clock, EntityStore, EntityStoreError, SourcePlugin, SourcePluginError};
use super::resolver::{LocationResolver, NativeFixLookup};

impl From<EntityStoreError> for Error {
    fn from(err: EntityStoreError) -> Self {
        match err {
            EntityStoreError::NotFound { message } => Error::not_found(message),
            EntityStoreError::Conflict { message } => Error::conflict(message),
            EntityStoreError::Connection { message } => Error::service_unavailable(message),
            EntityStoreError::Query { message } => Error::internal(message),
        }
    }
}

impl From<SourcePluginError> for Error {
    fn from(err: SourcePluginError) -> Self {
        match err {
            SourcePluginError::Unavailable { message } => Error::service_unavailable(message),
            SourcePluginError::Discovery { message } | SourcePluginError::Extraction { message } => {
                Error::internal(message)
            }
        }
    }
}

/// Outcome of a single run, reported for logging and scheduling decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub source: String,
    pub upserted: u64,
}

/// Orchestrates source plugins against a Store, applying the Location
/// Enrichment Resolver to entities that lack native coordinates.
///
/// Failure during discovery, extraction, or upsert aborts the run without
/// advancing the watermark (§4.4.2): already-upserted rows are retained,
/// since the `(source, external_id)` unique key makes re-running the full
/// window idempotent.
pub struct IngestionEngine<L> {
    store: Arc<dyn EntityStore>,
    resolver: LocationResolver<L>,
    clock: Arc<dyn Clock>,
    watermark_epoch: DateTime<Utc>,
}

impl<L> IngestionEngine<L>
where
    L: NativeFixLookup,
{
    pub fn new(
        store: Arc<dyn EntityStore>,
        resolver: LocationResolver<L>,
        clock: Arc<dyn Clock>,
        watermark_epoch: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            resolver,
            clock,
            watermark_epoch,
        }
    }

    /// Execute the run protocol for one plugin end to end.
    pub async fn run(&self, plugin: &dyn SourcePlugin) -> Result<RunReport, Error> {
        let since = match self.store.get_watermark(plugin.name()).await? {
            Some(watermark) => Some(watermark.last_run),
            None => Some(self.watermark_epoch),
        };

        info!(source = plugin.name(), since = ?since, "ingestion run starting");

        let mut items = plugin.discover(since).await?;
        let mut entities: Vec<NewEntity> = Vec::new();
        while let Some(item) = items.next().await {
            let extraction = plugin.extract(&item?).await?;
            entities.extend(extraction.entities);
        }

        let mut enriched = Vec::with_capacity(entities.len());
        for mut entity in entities {
            entity.source = Some(plugin.name().to_owned());
            entity = self
                .resolver
                .enrich(entity, plugin.has_native_location())
                .await?;
            enriched.push(entity);
        }

        let count = enriched.len() as i64;
        if !enriched.is_empty() {
            self.store.bulk_upsert(enriched).await?;
        }

        let now = self.clock.utc();
        self.store.set_watermark(plugin.name(), now, count).await?;

        info!(
            source = plugin.name(),
            count, "ingestion run completed successfully"
        );

        Ok(RunReport {
            source: plugin.name().to_owned(),
            upserted: count.max(0) as u64,
        })
    }
}

/// Run every registered plugin, logging (but not propagating) per-source
/// failures so that one misbehaving source never blocks the others.
pub async fn run_all<L>(engine: &IngestionEngine<L>, plugins: &[Arc<dyn SourcePlugin>])
where
    L: NativeFixLookup,
{
    for plugin in plugins {
        if let Err(err) = engine.run(plugin.as_ref()).await {
            warn!(source = plugin.name(), error = %err, "ingestion run failed; watermark not advanced");
        }
    }
}
