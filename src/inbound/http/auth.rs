//! `X-API-Key` authentication middleware (§4.6, §6).
//!
//! Wraps the authenticated scope so a missing or mismatched key never
//! reaches the Planner or Ingestion Engine, returning 401 before the
//! inner service is invoked.

use std::rc::Rc;
use std::task::{Context, Poll};

use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error as ActixError, HttpMessage};
use futures_util::future::{LocalBoxFuture, Ready, ready};

use crate::domain::Error;

const API_KEY_HEADER: &str = "x-api-key";

/// Middleware factory checking the `X-API-Key` header against a
/// configured shared secret.
#[derive(Clone)]
pub struct ApiKeyAuth {
    expected: Rc<str>,
}

impl ApiKeyAuth {
    #[must_use]
    pub fn new(expected: impl Into<Rc<str>>) -> Self {
        Self {
            expected: expected.into(),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type InitError = ();
    type Transform = ApiKeyAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyAuthMiddleware {
            service,
            expected: self.expected.clone(),
        }))
    }
}

pub struct ApiKeyAuthMiddleware<S> {
    service: S,
    expected: Rc<str>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let provided = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let authorized = matches!(provided, Some(ref key) if constant_time_eq(key, &self.expected));

        if authorized {
            let fut = self.service.call(req);
            Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
        } else {
            let trace_id = req
                .extensions()
                .get::<crate::middleware::trace::TraceId>()
                .map(|id| id.0.clone());
            let mut error = Error::unauthorized("missing or invalid API key");
            if let Some(id) = trace_id {
                error = error.with_trace_id(id);
            }
            let response = req.into_response(actix_web::HttpResponse::from_error(error));
            Box::pin(async move { Ok(response.map_into_right_body()) })
        }
    }
}

/// Constant-time string comparison, avoiding a timing side-channel on
/// the shared secret.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
