//! `DELETE /v1/visits`: bulk delete of `place.visit` rows, gated behind
//! an explicit `confirm=yes` query parameter (§4.6).

use actix_web::{HttpResponse, delete, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::Error;
use crate::domain::ports::TimeWindow;

use super::ApiResult;
use super::state::HttpState;
use super::validation::parse_rfc3339_timestamp;

#[derive(Debug, Deserialize)]
pub struct DeleteVisitsParams {
    pub confirm: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteVisitsResponse {
    pub deleted: u64,
}

/// Delete all `place.visit` rows, optionally restricted to a time window.
/// Requires `?confirm=yes`; any other value (or its absence) is rejected
/// before touching the Store.
#[utoipa::path(
    delete,
    path = "/v1/visits",
    responses(
        (status = 200, description = "Visits deleted", body = DeleteVisitsResponse),
        (status = 400, description = "Missing or invalid confirm=yes gate")
    ),
    security(("api_key" = []))
)]
#[delete("/v1/visits")]
pub async fn delete_visits(
    state: web::Data<HttpState>,
    params: web::Query<DeleteVisitsParams>,
) -> ApiResult<HttpResponse> {
    let params = params.into_inner();
    if params.confirm.as_deref() != Some("yes") {
        return Err(Error::invalid_request(
            "deleting visits requires confirm=yes",
        ));
    }

    let window = match (params.start, params.end) {
        (Some(start), Some(end)) => Some(TimeWindow {
            start: parse_rfc3339_timestamp(start, "start")?,
            end: parse_rfc3339_timestamp(end, "end")?,
        }),
        (None, None) => None,
        _ => {
            return Err(Error::invalid_request(
                "start and end must both be supplied or both omitted",
            ));
        }
    };

    let deleted = state.store.delete_visits(window).await?;
    Ok(HttpResponse::Ok().json(DeleteVisitsResponse { deleted }))
}
