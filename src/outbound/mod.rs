//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! This module follows the hexagonal architecture pattern, providing concrete
//! implementations of domain port traits for various infrastructure concerns:
//!
//! - **persistence**: PostgreSQL-backed Store using Diesel ORM
//!
//! Adapters are thin translators that convert between domain types and
//! infrastructure-specific representations. They contain no business logic.
//!
//! HTTP-level Prometheus instrumentation (request counts, latencies) is a
//! cross-cutting server concern rather than a domain port adapter, so it
//! lives in [`crate::server`] as middleware instead of here.

pub mod persistence;
