//! `GET /stats` (§4.6, §6): totals, by-type counts, time coverage, DB
//! sizes, and process uptime. Unauthenticated, like `/health`.

use actix_web::{HttpResponse, get, web};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::ports::StoreStats;

use super::ApiResult;
use super::state::HttpState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeCount {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimeCoverage {
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSizes {
    pub size_mb: f64,
    pub table_size_mb: f64,
    pub index_size_mb: f64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_entities: i64,
    pub entities_by_type: Vec<EntityTypeCount>,
    pub time_coverage: TimeCoverage,
    pub database: DatabaseSizes,
    pub uptime_seconds: u64,
}

impl StatsResponse {
    fn from_store_stats(stats: StoreStats, uptime_seconds: u64) -> Self {
        Self {
            total_entities: stats.total_entities,
            entities_by_type: stats
                .entities_by_type
                .into_iter()
                .map(|(entity_type, count)| EntityTypeCount { entity_type, count })
                .collect(),
            time_coverage: TimeCoverage {
                oldest: stats.oldest,
                newest: stats.newest,
            },
            database: DatabaseSizes {
                size_mb: stats.database_size_mb,
                table_size_mb: stats.table_size_mb,
                index_size_mb: stats.index_size_mb,
            },
            uptime_seconds,
        }
    }
}

/// Aggregate store statistics; unauthenticated like `/health`.
#[utoipa::path(
    get,
    path = "/stats",
    tags = ["stats"],
    security([]),
    responses((status = 200, description = "Store statistics", body = StatsResponse))
)]
#[get("/stats")]
pub async fn stats(state: web::Data<HttpState>) -> ApiResult<HttpResponse> {
    let stats = state.store.stats().await?;
    let uptime_seconds = state.started_at.elapsed().as_secs();
    Ok(HttpResponse::Ok().json(StatsResponse::from_store_stats(stats, uptime_seconds)))
}
