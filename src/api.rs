//! HTTP surface: request/response shapes and the router.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use validator::{Validate, ValidationError};

use crate::auth::{Caller, TokenAuth};
use crate::catalog;
use crate::checkout::{self, CartLine, Payment};
use crate::error::ShopError;
use crate::events;
use crate::orders;
use crate::sales::{self, TimelineFilter};
use crate::schema::SchemaMapping;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub schema: Arc<SchemaMapping>,
    pub auth: Arc<TokenAuth>,
    pub nats: Option<async_nats::Client>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/products", get(list_products))
        .route("/api/products/:id", get(get_product))
        .route("/api/checkout", post(place_order))
        .route("/api/my-orders", get(my_orders))
        .route("/api/orders/:order_ref", get(order_detail))
        .route("/api/bestsellers", get(bestsellers))
        .route("/api/admin/sales/summary", get(sales_summary))
        .route("/api/admin/sales/timeline", get(sales_timeline))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "shoplite" }))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    search: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<catalog::Product>>, ShopError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 100);
    let offset = params.offset.unwrap_or(0).max(0);
    let products = catalog::list(&state.db, params.search.as_deref(), limit, offset).await?;
    Ok(Json(products))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<catalog::Product>, ShopError> {
    catalog::get(&state.db, id)
        .await?
        .map(Json)
        .ok_or(ShopError::NotFound)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[validate(length(min = 1, message = "cart is empty"))]
    pub items: Vec<CheckoutItem>,
    #[validate(length(max = 4), custom = "digits_only")]
    pub card_last4: String,
    #[validate(length(min = 1, max = 80))]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutItem {
    pub id: i64,
    pub qty: i64,
}

fn digits_only(value: &str) -> Result<(), ValidationError> {
    if value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("digits_only"))
    }
}

#[derive(Debug, Serialize)]
struct CheckoutResponse {
    ok: bool,
    #[serde(rename = "orderId")]
    order_id: String,
    subtotal: i64,
    tax: i64,
    total: i64,
    last4: String,
}

async fn place_order(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ShopError> {
    req.validate()
        .map_err(|e| ShopError::BadRequest(e.to_string()))?;
    let items: Vec<CartLine> = req
        .items
        .iter()
        .map(|i| CartLine {
            product_id: i.id,
            qty: i.qty,
        })
        .collect();
    let payment = Payment {
        name: req.name.trim().to_string(),
        last4: req.card_last4.clone(),
    };
    let receipt =
        checkout::place_order(&state.db, &state.schema, caller.user_id, &items, &payment).await?;
    events::order_placed(&state.nats, &receipt).await;
    Ok(Json(CheckoutResponse {
        ok: true,
        order_id: receipt.order_ref,
        subtotal: receipt.subtotal,
        tax: receipt.tax,
        total: receipt.total,
        last4: receipt.last4,
    }))
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<i64>,
}

async fn my_orders(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<orders::OrderSummary>>, ShopError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let list = orders::list_orders(&state.db, &state.schema, caller.user_id, limit).await?;
    Ok(Json(list))
}

async fn order_detail(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_ref): Path<String>,
) -> Result<Json<orders::OrderDetail>, ShopError> {
    let detail = orders::get_order(&state.db, &state.schema, caller.user_id, &order_ref).await?;
    Ok(Json(detail))
}

async fn bestsellers(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<sales::ProductSales>>, ShopError> {
    let limit = params.limit.unwrap_or(5).clamp(1, 50);
    let top = sales::bestsellers(&state.db, &state.schema, limit).await?;
    Ok(Json(top))
}

fn require_admin(caller: &Caller) -> Result<(), ShopError> {
    if caller.admin {
        Ok(())
    } else {
        Err(ShopError::Forbidden)
    }
}

async fn sales_summary(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<sales::ProductSales>>, ShopError> {
    require_admin(&caller)?;
    let totals = sales::summary(&state.db, &state.schema).await?;
    Ok(Json(totals))
}

#[derive(Debug, Deserialize)]
struct TimelineParams {
    user: Option<String>,
    product: Option<String>,
    min: Option<i64>,
    max: Option<i64>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn sales_timeline(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<TimelineParams>,
) -> Result<Json<Vec<sales::TimelineRow>>, ShopError> {
    require_admin(&caller)?;
    let filter = TimelineFilter {
        user: params.user,
        product: params.product,
        min: params.min,
        max: params.max,
        limit: params.limit.unwrap_or(50).clamp(1, 200),
        offset: params.offset.unwrap_or(0).max(0),
    };
    let rows = sales::timeline(&state.db, &state.schema, &filter).await?;
    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::db;

    async fn test_state() -> AppState {
        let db = db::test_pool().await;
        let schema = SchemaMapping::detect(&db).await.unwrap();
        AppState {
            db,
            schema: Arc::new(schema),
            auth: Arc::new(TokenAuth::new("test-secret")),
            nats: None,
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn checkout_request(token: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/checkout")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_open() {
        let state = test_state().await;
        let response = router(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn checkout_requires_identity() {
        let state = test_state().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/checkout")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({ "items": [{ "id": 1, "qty": 1 }], "cardLast4": "4242", "name": "A" })
                    .to_string(),
            ))
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn checkout_and_readback_over_http() {
        let state = test_state().await;
        sqlx::query("INSERT INTO products (id, name, price, stock) VALUES (101, 'Widget', 1000, 2)")
            .execute(&state.db)
            .await
            .unwrap();
        let token = state.auth.issue(7, "user", 3600).unwrap();

        let body = serde_json::json!({
            "items": [{ "id": 101, "qty": 2 }],
            "cardLast4": "4242",
            "name": "Taro Yamada",
        });
        let response = router(state.clone())
            .oneshot(checkout_request(&token, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let receipt = body_json(response).await;
        assert_eq!(receipt["ok"], serde_json::json!(true));
        assert_eq!(receipt["subtotal"], serde_json::json!(2000));
        assert_eq!(receipt["tax"], serde_json::json!(200));
        assert_eq!(receipt["total"], serde_json::json!(2200));
        assert_eq!(receipt["last4"], serde_json::json!("4242"));
        let order_id = receipt["orderId"].as_str().unwrap().to_string();

        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/my-orders")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["orderId"].as_str().unwrap(), order_id);

        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .uri(format!("/api/orders/{order_id}"))
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let detail = body_json(response).await;
        assert_eq!(detail["items"][0]["unitPrice"], serde_json::json!(1000));
        assert_eq!(detail["items"][0]["qty"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn oversell_maps_to_conflict() {
        let state = test_state().await;
        sqlx::query("INSERT INTO products (id, name, price, stock) VALUES (101, 'Widget', 1000, 2)")
            .execute(&state.db)
            .await
            .unwrap();
        let token = state.auth.issue(7, "user", 3600).unwrap();

        let body = serde_json::json!({
            "items": [{ "id": 101, "qty": 3 }],
            "cardLast4": "4242",
            "name": "Taro Yamada",
        });
        let response = router(state.clone())
            .oneshot(checkout_request(&token, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let error = body_json(response).await;
        assert_eq!(error["error"], serde_json::json!("out_of_stock"));
        assert_eq!(error["left"], serde_json::json!(2));
        assert_eq!(error["want"], serde_json::json!(3));
    }

    #[tokio::test]
    async fn admin_routes_are_gated() {
        let state = test_state().await;
        let user = state.auth.issue(7, "user", 3600).unwrap();
        let admin = state.auth.issue(1, "admin", 3600).unwrap();

        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/admin/sales/timeline")
                    .header(header::AUTHORIZATION, format!("Bearer {user}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/admin/sales/timeline")
                    .header(header::AUTHORIZATION, format!("Bearer {admin}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
