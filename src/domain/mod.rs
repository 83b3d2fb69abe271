//! Domain primitives for the spatiotemporal store.
//!
//! Purpose: define the entity aggregate, its derived-column invariants,
//! the location enrichment resolver, and the ports (traits) adapters
//! implement. Keep this module free of HTTP/Diesel/actix concerns so the
//! same types are usable from the HTTP adapter, the ingestion engine, and
//! integration tests alike.

pub mod detector;
pub mod entity;
pub mod error;
pub mod ingestion;
pub mod maintainer;
pub mod payload;
pub mod planner;
pub mod ports;
pub mod resolver;
pub mod watermark;

pub use detector::{ClusterParams, DetectionResult, GpsSample, VisitParams, detect};
pub use entity::{
    Entity, EntityValidationError, GeoPoint, LocSource, NewEntity, RawPayload, TimeRange,
};
pub use error::{Error, ErrorCode, ErrorValidationError};
pub use ingestion::{IngestionEngine, RunReport, run_all};
pub use payload::EntityPayload;
pub use resolver::LocationResolver;
pub use watermark::Watermark;

/// Convenient domain result alias.
pub type DomainResult<T> = Result<T, Error>;

/// Header carrying the per-request trace identifier, echoed on every
/// response and attached to error payload logging (never to the public
/// `{"detail": ...}` body).
pub const TRACE_ID_HEADER: &str = "trace-id";
