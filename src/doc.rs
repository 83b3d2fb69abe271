//! OpenAPI surface assembled from the handlers' `#[utoipa::path]`
//! annotations, served by Swagger UI in debug builds.

use utoipa::OpenApi;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};

use crate::inbound::http::{entity, health, places, query, stats, visits};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::live,
        health::ready,
        stats::stats,
        entity::upsert_entity,
        entity::upsert_entities_batch,
        query::query_time,
        query::query_bbox,
        query::export,
        places::list_places,
        places::get_place,
        places::rename_place,
        visits::delete_visits,
    ),
    components(schemas(
        entity::UpsertResponse,
        entity::BatchUpsertResponse,
        query::TimeQueryRequest,
        query::BboxQueryRequest,
        query::TimeWindowRequest,
        query::ResampleRequest,
        query::EntitiesResponse,
        places::PlacesResponse,
        places::PlaceSummaryResponse,
        places::PlaceDetailResponse,
        places::RenamePlaceRequest,
        places::RenamePlaceResponse,
        visits::DeleteVisitsResponse,
        stats::StatsResponse,
        stats::EntityTypeCount,
        stats::TimeCoverage,
        stats::DatabaseSizes,
        crate::inbound::http::dto::EntityRequest,
        crate::inbound::http::dto::EntityResponse,
    )),
    tags(
        (name = "health", description = "Liveness and readiness probes"),
        (name = "stats", description = "Store-wide statistics"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
            );
        }
    }
}
