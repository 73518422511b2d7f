mod auth;
mod config;
mod middleware;

mod db;
mod error;
mod events;
mod models;
mod payments;
mod routes;
mod scheduling;

use std::sync::Arc;

use crate::{
    config::Config,
    events::EventBus,
    middleware::maintenance::maintenance_gate,
    models::AppState,
    payments::{DisabledGateway, PaymentGateway, StripeGateway},
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url).await?;

    let payments: Arc<dyn PaymentGateway> = match cfg.payment_secret_key.clone() {
        Some(key) => Arc::new(StripeGateway::new(key, cfg.payment_api_base.clone())),
        None => {
            tracing::warn!("PAYMENT_SECRET_KEY not set; payment intents are disabled");
            Arc::new(DisabledGateway)
        }
    };

    if cfg.dev_auth_bypass {
        tracing::warn!("DEV_AUTH_BYPASS is enabled; unauthenticated requests act as admin");
    }

    let state = AppState {
        db: pool,
        session_ttl_hours: cfg.session_ttl_hours,
        dev_auth_bypass: cfg.dev_auth_bypass,
        maintenance_mode: cfg.maintenance_mode,
        events: EventBus::new(),
        payments,
        payment_publishable_key: cfg.payment_publishable_key.clone(),
    };

    // Browser clients live on other origins (hosted web app, local dev).
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state.clone())
        .layer(axum::middleware::from_fn_with_state(
            state,
            maintenance_gate,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
