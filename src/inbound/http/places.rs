//! `GET /v1/places`, `GET /v1/places/{id}`, and `PATCH /v1/places/{id}`
//! (§4.4.3, §4.6).

use actix_web::{HttpResponse, get, patch, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::Error;
use crate::domain::ports::{PlaceDetail, PlaceSummary};

use super::ApiResult;
use super::dto::EntityResponse;
use super::state::HttpState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceSummaryResponse {
    pub place: EntityResponse,
    pub visit_count: i64,
    pub total_dwell_minutes: f64,
}

impl From<PlaceSummary> for PlaceSummaryResponse {
    fn from(summary: PlaceSummary) -> Self {
        Self {
            place: summary.entity.into(),
            visit_count: summary.visit_count,
            total_dwell_minutes: summary.total_dwell_minutes,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlacesResponse {
    pub places: Vec<PlaceSummaryResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceDetailResponse {
    pub place: EntityResponse,
    pub recent_visits: Vec<EntityResponse>,
}

impl From<PlaceDetail> for PlaceDetailResponse {
    fn from(detail: PlaceDetail) -> Self {
        Self {
            place: detail.entity.into(),
            recent_visits: detail
                .recent_visits
                .into_iter()
                .map(EntityResponse::from)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenamePlaceResponse {
    pub place: EntityResponse,
    pub updated_visits: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenamePlaceRequest {
    pub name: String,
    pub color: Option<String>,
}

/// List places with their visit-count/dwell aggregates.
#[utoipa::path(
    get,
    path = "/v1/places",
    responses((status = 200, description = "Places with stats", body = PlacesResponse)),
    security(("api_key" = []))
)]
#[get("/v1/places")]
pub async fn list_places(state: web::Data<HttpState>) -> ApiResult<HttpResponse> {
    let places = state.store.list_places().await?;
    let places = places.into_iter().map(PlaceSummaryResponse::from).collect();
    Ok(HttpResponse::Ok().json(PlacesResponse { places }))
}

/// Fetch one place with its most recent visits.
#[utoipa::path(
    get,
    path = "/v1/places/{id}",
    responses(
        (status = 200, description = "Place detail", body = PlaceDetailResponse),
        (status = 404, description = "No such place")
    ),
    security(("api_key" = []))
)]
#[get("/v1/places/{id}")]
pub async fn get_place(
    state: web::Data<HttpState>,
    id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let detail = state
        .store
        .get_place(id.into_inner())
        .await?
        .ok_or_else(|| Error::not_found("place not found"))?;
    Ok(HttpResponse::Ok().json(PlaceDetailResponse::from(detail)))
}

/// Rename a place and optionally recolor it, propagating the new name to
/// every `place.visit` row referencing it (§4.4.3).
#[utoipa::path(
    patch,
    path = "/v1/places/{id}",
    request_body = RenamePlaceRequest,
    responses(
        (status = 200, description = "Place renamed", body = RenamePlaceResponse),
        (status = 404, description = "No such place")
    ),
    security(("api_key" = []))
)]
#[patch("/v1/places/{id}")]
pub async fn rename_place(
    state: web::Data<HttpState>,
    id: web::Path<Uuid>,
    body: web::Json<RenamePlaceRequest>,
) -> ApiResult<HttpResponse> {
    let request = body.into_inner();
    if request.name.trim().is_empty() {
        return Err(Error::invalid_request("name must not be empty"));
    }
    let outcome = state
        .store
        .rename_place(id.into_inner(), request.name, request.color)
        .await?;
    Ok(HttpResponse::Ok().json(RenamePlaceResponse {
        place: outcome.place.into(),
        updated_visits: outcome.updated_visits,
    }))
}
