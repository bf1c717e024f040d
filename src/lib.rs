pub mod appresult;
pub mod chat;
pub mod config;
pub mod conversations;
pub mod db;

use axum::{
    extract::FromRef,
    http::{header, HeaderValue, Method},
    Router,
};
use tower_http::cors::CorsLayer;

pub use appresult::{AppError, AppResult};

use chat::{HubHandle, SessionLimits};
use db::Db;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db: Db,
    pub hub: HubHandle,
    pub limits: SessionLimits,
}

pub fn app(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Ok(conversations::router().with_state(state).layer(cors))
}
