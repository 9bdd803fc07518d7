//! Error taxonomy for the checkout service.
//!
//! Every handler returns `Result<_, ShopError>`; the `IntoResponse` impl
//! maps each variant to the status code and JSON envelope the storefront
//! client expects. Stock conflicts keep their own error codes so the client
//! can refresh the cart and resubmit instead of retrying blindly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShopError>;

#[derive(Debug, Error)]
pub enum ShopError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unknown product {product_id}")]
    UnknownProduct { product_id: i64 },

    /// Pre-transaction stock check failed. No writes have happened.
    #[error("product {product_id} out of stock: {available} left, {requested} requested")]
    OutOfStock {
        product_id: i64,
        available: i64,
        requested: i64,
    },

    /// A concurrent checkout consumed the stock between the pre-check and
    /// the conditional decrement. The whole transaction was rolled back.
    #[error("stock for product {product_id} changed while committing")]
    OutOfStockRace { product_id: i64 },

    #[error("not found")]
    NotFound,

    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("access denied")]
    Forbidden,

    /// The order relations are missing or in a shape the introspector does
    /// not recognize.
    #[error("unusable storage schema: {0}")]
    Schema(String),

    #[error("storage error")]
    Storage(#[from] sqlx::Error),
}

impl IntoResponse for ShopError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ShopError::BadRequest(detail) => (
                StatusCode::BAD_REQUEST,
                json!({ "ok": false, "error": "bad_request", "detail": detail }),
            ),
            ShopError::UnknownProduct { product_id } => (
                StatusCode::BAD_REQUEST,
                json!({ "ok": false, "error": "unknown_product", "productId": product_id }),
            ),
            ShopError::OutOfStock {
                product_id,
                available,
                requested,
            } => (
                StatusCode::CONFLICT,
                json!({
                    "ok": false,
                    "error": "out_of_stock",
                    "productId": product_id,
                    "left": available,
                    "want": requested,
                }),
            ),
            ShopError::OutOfStockRace { product_id } => (
                StatusCode::CONFLICT,
                json!({ "ok": false, "error": "out_of_stock_race", "productId": product_id }),
            ),
            ShopError::NotFound => (
                StatusCode::NOT_FOUND,
                json!({ "ok": false, "error": "not_found" }),
            ),
            ShopError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "ok": false, "error": "unauthorized" }),
            ),
            ShopError::Forbidden => (
                StatusCode::FORBIDDEN,
                json!({ "ok": false, "error": "forbidden" }),
            ),
            ShopError::Schema(_) | ShopError::Storage(_) => {
                tracing::error!(error = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "ok": false, "error": "server_error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_conflicts_map_to_409() {
        let pre = ShopError::OutOfStock {
            product_id: 1,
            available: 2,
            requested: 3,
        };
        assert_eq!(pre.into_response().status(), StatusCode::CONFLICT);
        let race = ShopError::OutOfStockRace { product_id: 1 };
        assert_eq!(race.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn storage_errors_hide_details() {
        let err = ShopError::Storage(sqlx::Error::RowNotFound);
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
