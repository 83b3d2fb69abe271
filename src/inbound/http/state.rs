//! Shared HTTP adapter state.
//!
//! HTTP handlers accept this state via `actix_web::web::Data` so they only
//! depend on the [`EntityStore`] port query and ingestion endpoints share,
//! plus the process start time `GET /stats` reports uptime from. The
//! `X-API-Key` shared secret is wired directly into
//! [`super::auth::ApiKeyAuth`] rather than threaded through here, since
//! only the auth middleware needs it.

use std::sync::Arc;
use std::time::Instant;

use crate::domain::ports::EntityStore;

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<dyn EntityStore>,
    pub started_at: Instant,
}

impl HttpState {
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            started_at: Instant::now(),
        }
    }
}
