//! Shoplite server entry point.

use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shoplite::api::{self, AppState};
use shoplite::auth::TokenAuth;
use shoplite::config::Config;
use shoplite::db;
use shoplite::schema::SchemaMapping;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = db::connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    // Resolved once here; a restored backup needs a restart (or a fresh
    // detect) to pick up a different shape.
    let schema = SchemaMapping::detect(&db).await?;
    tracing::debug!(?schema, "order schema resolved");

    let nats = match &config.nats_url {
        Some(url) => async_nats::connect(url).await.ok(),
        None => None,
    };

    let state = AppState {
        db,
        schema: Arc::new(schema),
        auth: Arc::new(TokenAuth::new(&config.jwt_secret)),
        nats,
    };
    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("shoplite listening on {addr}");
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
