use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower::util::ServiceExt;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod schedule;
pub mod services;
pub mod sync;
pub mod views;
pub mod week;

use services::{bus::EventBus, cache::WeekCache};

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: config::Config,
    pub bus: Arc<EventBus>,
    pub cache: WeekCache,
}

pub fn app(state: AppState) -> Router {
    let api_router = Router::new()
        .nest("/auth", routes::auth::router())
        .nest("/users", routes::users::router())
        .nest("/schedules", routes::schedules::router());

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(handlers::ws::ws_handler))
        .nest("/api", api_router)
        .fallback(serve_spa)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn health_check() -> &'static str {
    "OK"
}

async fn serve_spa(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path();

    // Try to serve static file first
    let static_path = format!("{}{path}", state.config.static_dir);
    if std::path::Path::new(&static_path).exists() {
        let serve_dir = ServeDir::new(&state.config.static_dir);
        let res = serve_dir.oneshot(req).await.unwrap();
        return res.into_response();
    }

    // For SPA routes, serve index.html
    match tokio::fs::read(format!("{}/index.html", state.config.static_dir)).await {
        Ok(contents) => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/html")
            .body(Body::from(contents))
            .unwrap(),
        Err(_) => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("Not found"))
            .unwrap(),
    }
}
