//! Environment configuration.

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    /// Optional NATS endpoint for order events. No eventing when unset.
    pub nats_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://shopping.db".into());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8083".into())
            .parse()?;
        let jwt_secret = std::env::var("SHOP_JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("SHOP_JWT_SECRET not set, using development secret");
            "dev-secret".into()
        });
        let nats_url = std::env::var("NATS_URL").ok();
        Ok(Self {
            database_url,
            port,
            jwt_secret,
            nats_url,
        })
    }
}
