//! Caller identity resolution.
//!
//! Token issuance lives in the external auth service; this side only
//! verifies the HS256 bearer token and extracts the stable user id and
//! role. Handlers take a [`Caller`] argument and axum runs the extractor.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::error::ShopError;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i64,
    role: String,
    exp: i64,
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub user_id: i64,
    pub admin: bool,
}

/// Verifies bearer tokens minted by the auth service.
pub struct TokenAuth {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenAuth {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Caller, ShopError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| ShopError::Unauthorized)?;
        Ok(Caller {
            user_id: data.claims.sub,
            admin: data.claims.role == "admin",
        })
    }

    /// Mint a token for the given user. The production issuer is the
    /// external auth service; this exists for local tooling and tests.
    pub fn issue(&self, user_id: i64, role: &str, ttl_secs: i64) -> Result<String, ShopError> {
        let claims = Claims {
            sub: user_id,
            role: role.to_string(),
            exp: chrono::Utc::now().timestamp() + ttl_secs,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|_| ShopError::Unauthorized)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ShopError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ShopError::Unauthorized)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(ShopError::Unauthorized)?;
        state.auth.verify(token)
    }
}
