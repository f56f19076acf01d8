mod auth;
mod config;
mod db;
mod entities;
mod error;
mod extract;
mod lists;
mod models;
mod reviews;
mod routes;
mod tmdb;

#[cfg(test)]
mod tests;

use std::{sync::Arc, time::Duration};

use axum::Router;
use sea_orm::DatabaseConnection;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth::Identity, config::Config, lists::ListManager, reviews::ReviewEngine, tmdb::TmdbClient,
};

pub struct AppState {
    pub config: Arc<Config>,
    pub tmdb: Arc<TmdbClient>,
    pub reviews: ReviewEngine,
    pub lists: ListManager,
    pub identity: Identity,
}

impl AppState {
    pub fn new(config: Arc<Config>, db: DatabaseConnection, http: reqwest::Client) -> Self {
        let tmdb = TmdbClient::new(
            http,
            config.tmdb_access_token.clone(),
            config.tmdb_api_key.clone(),
            config.tmdb_base_url.clone(),
            config.tmdb_rps,
        );

        Self {
            tmdb: Arc::new(tmdb),
            reviews: ReviewEngine::new(db.clone()),
            lists: ListManager::new(db.clone()),
            identity: Identity::new(db, &config.jwt_secret, config.jwt_ttl_hours),
            config,
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    routes::router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any)),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,reelrate=debug,sqlx=warn".to_string()),
        )
        .init();

    // A panic anywhere takes the process down; the supervisor restarts it.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "fatal panic, exiting");
        default_hook(info);
        std::process::exit(1);
    }));

    let config = Arc::new(Config::from_env()?);

    let http = reqwest::Client::builder()
        .user_agent(concat!("reelrate/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;

    let db = db::connect_and_migrate(&config.database_url).await?;
    let state = Arc::new(AppState::new(config.clone(), db, http));

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app(state)).await?;

    Ok(())
}
