//! The Store port: durable, indexed persistence of entities and
//! watermarks, with transactional upsert and streaming read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use uuid::Uuid;

use crate::domain::entity::{Entity, NewEntity};
use crate::domain::watermark::Watermark;

use super::define_port_error;

define_port_error! {
    pub enum EntityStoreError {
        Connection { message: String } => "store connection error: {message}",
        Query { message: String } => "store query error: {message}",
        NotFound { message: String } => "store record not found: {message}",
        Conflict { message: String } => "store conflict: {message}",
    }
}

/// Ascending or descending `t_start` ordering for time/bbox queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOrder {
    Asc,
    Desc,
}

/// Ordering for bbox queries, which additionally support a pseudo-random
/// permutation intended for uniform marker sampling (§9 Design Notes:
/// not required to be stable across requests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BboxOrder {
    TStartAsc,
    TStartDesc,
    Random,
}

/// Newest-first or oldest-first ordering for the export cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportOrder {
    #[default]
    Newest,
    Oldest,
}

/// Outcome of a single upsert: whether a new row was inserted or an
/// existing `(source, external_id)` row was replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// A closed `[t0, t1]` UTC window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// WGS84 envelope `[lonmin, latmin, lonmax, latmax]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lon_min: f64,
    pub lat_min: f64,
    pub lon_max: f64,
    pub lat_max: f64,
}

#[derive(Debug, Clone)]
pub struct TimeQuery {
    pub types: Vec<String>,
    pub window: TimeWindow,
    pub limit: u32,
    pub order: TimeOrder,
}

#[derive(Debug, Clone)]
pub struct BboxQuery {
    pub types: Vec<String>,
    pub bbox: BoundingBox,
    pub window: Option<TimeWindow>,
    pub limit: u32,
    pub order: BboxOrder,
}

/// One equal-width bin of the uniform-time resample operator (§4.1),
/// planned as an independent bounded lookup using the `(type, t_start)`
/// index rather than folded into a single `O(N)` scan.
#[derive(Debug, Clone)]
pub struct ResampleBin {
    pub types: Vec<String>,
    pub bin_start: DateTime<Utc>,
    pub bin_end: DateTime<Utc>,
    pub center: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    pub types: Option<Vec<String>>,
    pub order: ExportOrder,
}

/// Aggregate stats surfaced by `GET /stats`.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub total_entities: i64,
    pub entities_by_type: Vec<(String, i64)>,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub database_size_mb: f64,
    pub table_size_mb: f64,
    pub index_size_mb: f64,
}

/// A `place` row together with its visit-count/dwell aggregates, as
/// surfaced by `GET /v1/places`.
#[derive(Debug, Clone)]
pub struct PlaceSummary {
    pub entity: Entity,
    pub visit_count: i64,
    pub total_dwell_minutes: f64,
}

/// A `place` row together with its most recent visits, as surfaced by
/// `GET /v1/places/{id}`.
#[derive(Debug, Clone)]
pub struct PlaceDetail {
    pub entity: Entity,
    pub recent_visits: Vec<Entity>,
}

/// Result of `PATCH /v1/places/{id}`: the updated place plus the count of
/// `place.visit` rows whose `name` was propagated in the same
/// transaction (§4.4.3 rename propagation, a testable invariant).
#[derive(Debug, Clone)]
pub struct RenamePlaceOutcome {
    pub place: Entity,
    pub updated_visits: u64,
}

/// Durable, indexed storage of entities and watermarks.
///
/// Required indices (design-level, enforced by migrations rather than
/// this trait): range index on `t_range`, b-tree on `(type, t_start DESC)`,
/// 2-D spatial index on `geom`, partial unique index on
/// `(source, external_id)`, inverted index on `payload`, b-tree on
/// `t_start`/`t_end` individually.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn upsert(&self, entity: NewEntity) -> Result<(Uuid, UpsertOutcome), EntityStoreError>;

    async fn bulk_upsert(
        &self,
        entities: Vec<NewEntity>,
    ) -> Result<Vec<(Uuid, UpsertOutcome)>, EntityStoreError>;

    async fn query_time(&self, query: TimeQuery) -> Result<Vec<Entity>, EntityStoreError>;

    /// Resample operator: `bins.len()` independent bounded lookups, one
    /// per bin, each returning the candidate row (if any) minimizing
    /// `|t_start - center|` within that bin (ties: earlier `t_start`,
    /// then lower `id`).
    async fn query_resample(
        &self,
        bins: Vec<ResampleBin>,
    ) -> Result<Vec<Entity>, EntityStoreError>;

    async fn query_bbox(&self, query: BboxQuery) -> Result<Vec<Entity>, EntityStoreError>;

    /// A lazy, finite, non-restartable stream driven by a server-side
    /// cursor with constant memory, alongside the total row count known
    /// up front.
    async fn stream_all(
        &self,
        filter: ExportFilter,
    ) -> Result<(i64, BoxStream<'static, Result<Entity, EntityStoreError>>), EntityStoreError>;

    async fn get_watermark(&self, source: &str) -> Result<Option<Watermark>, EntityStoreError>;

    async fn set_watermark(
        &self,
        source: &str,
        last_run: DateTime<Utc>,
        last_count: i64,
    ) -> Result<(), EntityStoreError>;

    async fn list_places(&self) -> Result<Vec<PlaceSummary>, EntityStoreError>;

    async fn get_place(&self, id: Uuid) -> Result<Option<PlaceDetail>, EntityStoreError>;

    async fn rename_place(
        &self,
        id: Uuid,
        name: String,
        color: Option<String>,
    ) -> Result<RenamePlaceOutcome, EntityStoreError>;

    async fn delete_visits(
        &self,
        window: Option<TimeWindow>,
    ) -> Result<u64, EntityStoreError>;

    async fn stats(&self) -> Result<StoreStats, EntityStoreError>;
}

#[cfg(test)]
mockall::mock! {
    pub EntityStore {}

    #[async_trait]
    impl EntityStore for EntityStore {
        async fn upsert(&self, entity: NewEntity) -> Result<(Uuid, UpsertOutcome), EntityStoreError>;
        async fn bulk_upsert(&self, entities: Vec<NewEntity>) -> Result<Vec<(Uuid, UpsertOutcome)>, EntityStoreError>;
        async fn query_time(&self, query: TimeQuery) -> Result<Vec<Entity>, EntityStoreError>;
        async fn query_resample(&self, bins: Vec<ResampleBin>) -> Result<Vec<Entity>, EntityStoreError>;
        async fn query_bbox(&self, query: BboxQuery) -> Result<Vec<Entity>, EntityStoreError>;
        async fn stream_all(&self, filter: ExportFilter) -> Result<(i64, BoxStream<'static, Result<Entity, EntityStoreError>>), EntityStoreError>;
        async fn get_watermark(&self, source: &str) -> Result<Option<Watermark>, EntityStoreError>;
        async fn set_watermark(&self, source: &str, last_run: DateTime<Utc>, last_count: i64) -> Result<(), EntityStoreError>;
        async fn list_places(&self) -> Result<Vec<PlaceSummary>, EntityStoreError>;
        async fn get_place(&self, id: Uuid) -> Result<Option<PlaceDetail>, EntityStoreError>;
        async fn rename_place(&self, id: Uuid, name: String, color: Option<String>) -> Result<RenamePlaceOutcome, EntityStoreError>;
        async fn delete_visits(&self, window: Option<TimeWindow>) -> Result<u64, EntityStoreError>;
        async fn stats(&self) -> Result<StoreStats, EntityStoreError>;
    }
}
