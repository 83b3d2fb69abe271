//! Ports: traits adapters implement to satisfy the domain, following a
//! hexagonal architecture. Keeping these as traits lets the HTTP adapter,
//! the ingestion engine, and tests all depend on behaviour rather than on
//! concrete Diesel/actix types.

mod macros;

pub mod clock;
pub mod entity_store;
pub mod source_plugin;

pub(crate) use macros::define_port_error;

pub use clock::{Clock, DefaultClock};
pub use entity_store::{
    BboxOrder, BboxQuery, BoundingBox, EntityStore, EntityStoreError, ExportFilter, ExportOrder,
    PlaceDetail, PlaceSummary, RenamePlaceOutcome, ResampleBin, StoreStats, TimeOrder, TimeQuery,
    TimeWindow, UpsertOutcome,
};
pub use source_plugin::{ExtractionResult, SourcePlugin, SourcePluginError, WorkItem};
