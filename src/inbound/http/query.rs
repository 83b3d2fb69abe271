//! `POST /v1/query/time`, `POST /v1/query/bbox`, and
//! `GET /v1/query/export` (§4.5, §4.6, §6).

use std::future::Future;
use std::time::Duration;

use actix_web::{HttpResponse, get, post, web};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use utoipa::ToSchema;

use crate::domain::ports::{
    BboxOrder, BboxQuery, BoundingBox, ExportFilter, ExportOrder, TimeOrder, TimeQuery, TimeWindow,
};
use crate::domain::{Error, planner};

use super::ApiResult;
use super::dto::EntityResponse;
use super::state::HttpState;
use super::validation::parse_rfc3339_timestamp;

/// Per-endpoint wall-clock budget for query execution (§5 Cancellation /
/// timeout). Exceeding it surfaces as `ErrorCode::Timeout`, distinct from
/// an unexpected `InternalError`.
const QUERY_BUDGET: Duration = Duration::from_secs(10);

async fn within_query_budget<T>(fut: impl Future<Output = ApiResult<T>>) -> ApiResult<T> {
    match timeout(QUERY_BUDGET, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout("query exceeded its wall-clock budget")),
    }
}

fn validation_error(message: impl Into<String>) -> Error {
    Error::invalid_request(message)
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimeOrderDto {
    TStartAsc,
    TStartDesc,
}

impl From<TimeOrderDto> for TimeOrder {
    fn from(value: TimeOrderDto) -> Self {
        match value {
            TimeOrderDto::TStartAsc => TimeOrder::Asc,
            TimeOrderDto::TStartDesc => TimeOrder::Desc,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BboxOrderDto {
    TStartAsc,
    TStartDesc,
    Random,
}

impl From<BboxOrderDto> for BboxOrder {
    fn from(value: BboxOrderDto) -> Self {
        match value {
            BboxOrderDto::TStartAsc => BboxOrder::TStartAsc,
            BboxOrderDto::TStartDesc => BboxOrder::TStartDesc,
            BboxOrderDto::Random => BboxOrder::Random,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResampleRequest {
    pub method: String,
    pub n: u32,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimeQueryRequest {
    pub types: Vec<String>,
    pub start: String,
    pub end: String,
    pub limit: Option<u32>,
    pub order: Option<TimeOrderDto>,
    pub resample: Option<ResampleRequest>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindowRequest {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BboxQueryRequest {
    pub types: Vec<String>,
    pub bbox: [f64; 4],
    pub time: Option<TimeWindowRequest>,
    pub limit: Option<u32>,
    pub order: Option<BboxOrderDto>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntitiesResponse {
    pub entities: Vec<EntityResponse>,
}

fn parse_window(start: String, end: String) -> Result<TimeWindow, Error> {
    let start = parse_rfc3339_timestamp(start, "start")?;
    let end = parse_rfc3339_timestamp(end, "end")?;
    planner::validate_window(start, end)
}

/// Time-window query, optionally resampled to a fixed number of bins.
#[utoipa::path(
    post,
    path = "/v1/query/time",
    request_body = TimeQueryRequest,
    responses((status = 200, description = "Matching entities", body = EntitiesResponse)),
    security(("api_key" = []))
)]
#[post("/v1/query/time")]
pub async fn query_time(
    state: web::Data<HttpState>,
    body: web::Json<TimeQueryRequest>,
) -> ApiResult<HttpResponse> {
    let request = body.into_inner();
    let window = parse_window(request.start, request.end)?;

    let entities = if let Some(resample) = request.resample {
        if resample.method != "uniform_time" {
            return Err(validation_error(format!(
                "unsupported resample method: {}",
                resample.method
            )));
        }
        let n = planner::validate_resample_n(resample.n)?;
        let bins = planner::resample_bins(request.types, window, n);
        within_query_budget(async move { Ok(state.store.query_resample(bins).await?) }).await?
    } else {
        let limit = planner::validate_limit(request.limit, planner::TIME_DEFAULT_LIMIT)?;
        let order = request.order.map(Into::into).unwrap_or(TimeOrder::Asc);
        within_query_budget(async move {
            Ok(state
                .store
                .query_time(TimeQuery {
                    types: request.types,
                    window,
                    limit,
                    order,
                })
                .await?)
        })
        .await?
    };

    let entities = entities.into_iter().map(EntityResponse::from).collect();
    Ok(HttpResponse::Ok().json(EntitiesResponse { entities }))
}

/// Bounding-box query, optionally intersected with a time window.
#[utoipa::path(
    post,
    path = "/v1/query/bbox",
    request_body = BboxQueryRequest,
    responses((status = 200, description = "Matching entities", body = EntitiesResponse)),
    security(("api_key" = []))
)]
#[post("/v1/query/bbox")]
pub async fn query_bbox(
    state: web::Data<HttpState>,
    body: web::Json<BboxQueryRequest>,
) -> ApiResult<HttpResponse> {
    let request = body.into_inner();
    let [lon_min, lat_min, lon_max, lat_max] = request.bbox;
    let bbox: BoundingBox = planner::validate_bbox(lon_min, lat_min, lon_max, lat_max)?;
    let window = request
        .time
        .map(|w| parse_window(w.start, w.end))
        .transpose()?;
    let limit = planner::validate_limit(request.limit, planner::BBOX_DEFAULT_LIMIT)?;
    let order = request.order.map(Into::into).unwrap_or(BboxOrder::TStartDesc);

    let entities = within_query_budget(async move {
        Ok(state
            .store
            .query_bbox(BboxQuery {
                types: request.types,
                bbox,
                window,
                limit,
                order,
            })
            .await?)
    })
    .await?;

    let entities = entities.into_iter().map(EntityResponse::from).collect();
    Ok(HttpResponse::Ok().json(EntitiesResponse { entities }))
}

#[derive(Debug, Deserialize)]
pub struct ExportQueryParams {
    pub types: Option<String>,
    pub order: Option<String>,
}

fn parse_export_order(raw: Option<&str>) -> Result<ExportOrder, Error> {
    match raw {
        None | Some("newest") => Ok(ExportOrder::Newest),
        Some("oldest") => Ok(ExportOrder::Oldest),
        Some(other) => Err(validation_error(format!("unknown export order: {other}"))),
    }
}

/// Stream every entity as newline-delimited JSON: a `{"total": N}` line
/// followed by `N` entity lines (§6). Memory use is independent of `N`
/// because each line is serialized as it is pulled off the Store's
/// cursor.
#[utoipa::path(
    get,
    path = "/v1/query/export",
    responses((status = 200, description = "NDJSON stream of entities", content_type = "application/x-ndjson")),
    security(("api_key" = []))
)]
#[get("/v1/query/export")]
pub async fn export(
    state: web::Data<HttpState>,
    params: web::Query<ExportQueryParams>,
) -> ApiResult<HttpResponse> {
    let params = params.into_inner();
    let order = parse_export_order(params.order.as_deref())?;
    let types = params
        .types
        .map(|raw| raw.split(',').map(str::to_owned).collect::<Vec<_>>());

    // Only the cursor's initial setup is bounded by the query budget; the
    // subsequent stream itself suspends between cursor fetches per §5 and
    // is allowed to run for as long as the client keeps reading.
    let (total, entities) = within_query_budget(async move {
        Ok(state
            .store
            .stream_all(ExportFilter { types, order })
            .await?)
    })
    .await?;

    let header = web::Bytes::from(format!("{{\"total\":{total}}}\n"));
    let body = futures_util::stream::once(async move { Ok(header) }).chain(entities.map(
        |result| {
            result
                .map_err(Error::from)
                .map_err(actix_web::Error::from)
                .and_then(|entity| {
                    let response = EntityResponse::from(entity);
                    let mut line = serde_json::to_vec(&response)
                        .map_err(|err| actix_web::Error::from(Error::internal(err.to_string())))?;
                    line.push(b'\n');
                    Ok(web::Bytes::from(line))
                })
        },
    ));

    Ok(HttpResponse::Ok()
        .content_type("application/x-ndjson")
        .streaming(body))
}
