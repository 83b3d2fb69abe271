//! Server construction and middleware wiring.

mod config;
#[cfg(feature = "metrics")]
mod metrics;

pub use config::ServerConfig;

#[cfg(feature = "metrics")]
use metrics::MetricsLayer;

use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::middleware::Compress;
use actix_web::{App, HttpServer, web};

#[cfg(debug_assertions)]
use backend::doc::ApiDoc;
use backend::inbound::http::auth::ApiKeyAuth;
use backend::inbound::http::entity::{upsert_entities_batch, upsert_entity};
use backend::inbound::http::health::{HealthState, health, live, ready};
use backend::inbound::http::places::{get_place, list_places, rename_place};
use backend::inbound::http::query::{export, query_bbox, query_time};
use backend::inbound::http::stats::stats;
use backend::inbound::http::state::HttpState;
use backend::inbound::http::visits::delete_visits;
use backend::outbound::persistence::DieselEntityStore;
use backend::Trace;
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;

#[derive(Clone)]
struct AppDependencies {
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
    api_key: Arc<str>,
}

fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        health_state,
        http_state,
        api_key,
    } = deps;

    let authenticated = web::scope("")
        .wrap(ApiKeyAuth::new(api_key))
        .service(upsert_entity)
        .service(upsert_entities_batch)
        .service(query_time)
        .service(query_bbox)
        .service(export)
        .service(list_places)
        .service(get_place)
        .service(rename_place)
        .service(delete_visits);

    let app = App::new()
        .app_data(health_state)
        .app_data(http_state)
        .wrap(Trace)
        .wrap(Compress::default())
        .service(authenticated)
        .service(stats)
        .service(health)
        .service(live)
        .service(ready);

    #[cfg(debug_assertions)]
    let app =
        app.service(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    #[cfg(not(debug_assertions))]
    let app = app;

    app
}

/// Construct an Actix HTTP server using the provided health state and
/// configuration.
///
/// # Errors
/// Propagates [`std::io::Error`] when binding the socket or starting the
/// server fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    config: ServerConfig,
) -> std::io::Result<Server> {
    let server_health_state = health_state.clone();
    let ServerConfig {
        api_key,
        bind_addr,
        db_pool,
        #[cfg(feature = "metrics")]
        prometheus,
    } = config;

    let store = Arc::new(DieselEntityStore::new(db_pool));
    let http_state = web::Data::new(HttpState::new(store));

    #[cfg(feature = "metrics")]
    let metrics_layer = MetricsLayer::from_option(prometheus);

    let server = HttpServer::new(move || {
        let app = build_app(AppDependencies {
            health_state: server_health_state.clone(),
            http_state: http_state.clone(),
            api_key: api_key.clone(),
        });

        #[cfg(feature = "metrics")]
        let app = app.wrap(metrics_layer.clone());

        app
    })
    .bind(bind_addr)?
    .run();

    health_state.mark_ready();
    Ok(server)
}
