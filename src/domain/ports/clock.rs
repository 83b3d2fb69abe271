//! Clock port: the single source of "now" for the ingestion engine and
//! Place/Visit Detector, so tests can drive time deterministically
//! instead of racing the wall clock.
//!
//! Callers depend on `Arc<dyn mockable::Clock>` directly, following the
//! convention used across the rest of the domain: production wiring
//! supplies `Arc::new(mockable::DefaultClock)`, tests supply
//! `mockable::MockClock` or a fixed-time stub.

pub use mockable::{Clock, DefaultClock};
