//! `POST /v1/entity` and `POST /v1/entities/batch`: direct upsert of one
//! or many entities (§4.6).

use actix_web::{HttpResponse, post, web};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::ports::UpsertOutcome;

use super::dto::EntityRequest;
use super::state::HttpState;
use super::ApiResult;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsertResponse {
    pub id: uuid::Uuid,
    pub inserted: bool,
}

impl From<(uuid::Uuid, UpsertOutcome)> for UpsertResponse {
    fn from((id, outcome): (uuid::Uuid, UpsertOutcome)) -> Self {
        Self {
            id,
            inserted: matches!(outcome, UpsertOutcome::Inserted),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpsertResponse {
    pub results: Vec<UpsertResponse>,
}

/// Upsert a single entity.
#[utoipa::path(
    post,
    path = "/v1/entity",
    request_body = EntityRequest,
    responses((status = 200, description = "Entity upserted", body = UpsertResponse)),
    security(("api_key" = []))
)]
#[post("/v1/entity")]
pub async fn upsert_entity(
    state: web::Data<HttpState>,
    body: web::Json<EntityRequest>,
) -> ApiResult<HttpResponse> {
    let new_entity = body.into_inner().into_new_entity()?;
    let outcome = state.store.upsert(new_entity).await?;
    Ok(HttpResponse::Ok().json(UpsertResponse::from(outcome)))
}

/// Upsert a batch of entities in one request.
#[utoipa::path(
    post,
    path = "/v1/entities/batch",
    request_body = Vec<EntityRequest>,
    responses((status = 200, description = "Batch upserted", body = BatchUpsertResponse)),
    security(("api_key" = []))
)]
#[post("/v1/entities/batch")]
pub async fn upsert_entities_batch(
    state: web::Data<HttpState>,
    body: web::Json<Vec<EntityRequest>>,
) -> ApiResult<HttpResponse> {
    let entities = body
        .into_inner()
        .into_iter()
        .map(EntityRequest::into_new_entity)
        .collect::<Result<Vec<_>, _>>()?;
    let outcomes = state.store.bulk_upsert(entities).await?;
    let results = outcomes.into_iter().map(UpsertResponse::from).collect();
    Ok(HttpResponse::Ok().json(BatchUpsertResponse { results }))
}
