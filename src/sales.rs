//! Read-only sales reporting over historical order lines.
//!
//! Lower rigor than the checkout path: plain aggregation, no writes.
//! Shares the line-relation naming tolerance of the introspector, since
//! restored backups feed the same reports.

use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::error::ShopError;
use crate::schema::{LineKey, SchemaMapping};

#[derive(Debug, Clone, Serialize)]
pub struct ProductSales {
    #[serde(rename = "productId")]
    pub product_id: i64,
    pub name: String,
    pub sold: i64,
}

/// One line item joined to its order header, for the admin timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineRow {
    pub created_at: String,
    pub user: String,
    pub product: String,
    pub qty: i64,
    pub unit: i64,
    pub line: i64,
    #[serde(rename = "orderRef")]
    pub order_ref: String,
}

#[derive(Debug, Clone, Default)]
pub struct TimelineFilter {
    pub user: Option<String>,
    pub product: Option<String>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

/// Quantity sold per product across all historical lines, best first.
pub async fn summary(db: &SqlitePool, mapping: &SchemaMapping) -> Result<Vec<ProductSales>, ShopError> {
    summary_query(db, mapping, None).await
}

/// Top `limit` products by quantity sold.
pub async fn bestsellers(
    db: &SqlitePool,
    mapping: &SchemaMapping,
    limit: i64,
) -> Result<Vec<ProductSales>, ShopError> {
    summary_query(db, mapping, Some(limit)).await
}

async fn summary_query(
    db: &SqlitePool,
    mapping: &SchemaMapping,
    limit: Option<i64>,
) -> Result<Vec<ProductSales>, ShopError> {
    let table = mapping.lines_table;
    let qty_col = mapping.qty_col;
    // The name snapshot on the lines keeps reporting stable even when the
    // catalog row was renamed or removed since.
    let mut sql = format!(
        "SELECT l.product_id AS product_id, MAX(l.name) AS name, SUM(l.{qty_col}) AS sold \
         FROM {table} l GROUP BY l.product_id ORDER BY sold DESC, l.product_id"
    );
    if limit.is_some() {
        sql.push_str(" LIMIT ?1");
    }
    let mut query = sqlx::query(&sql);
    if let Some(n) = limit {
        query = query.bind(n);
    }
    let rows = query.fetch_all(db).await?;
    rows.iter()
        .map(|row| {
            Ok(ProductSales {
                product_id: row.try_get("product_id")?,
                name: row.try_get("name")?,
                sold: row.try_get("sold")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(ShopError::from)
}

enum Arg {
    Text(String),
    Int(i64),
}

/// Flat line-item feed joined to headers, newest first, with optional
/// buyer/product substring and per-line amount range filters. Every filter
/// value is a bound parameter.
pub async fn timeline(
    db: &SqlitePool,
    mapping: &SchemaMapping,
    filter: &TimelineFilter,
) -> Result<Vec<TimelineRow>, ShopError> {
    let table = mapping.lines_table;
    let key_col = mapping.line_key_col;
    let price_col = mapping.price_col;
    let qty_col = mapping.qty_col;
    let amount = mapping.line_amount_expr("l.");
    let ref_expr = mapping.header_ref_expr("o.");
    let buyer = match mapping.buyer_col {
        Some(col) => format!("COALESCE(o.{col}, '')"),
        None => "''".to_string(),
    };
    let join = match mapping.line_key {
        LineKey::Reference => format!("l.{key_col} = {ref_expr}"),
        LineKey::Surrogate => format!("l.{key_col} = o.id"),
    };

    let mut sql = format!(
        "SELECT o.created_at AS created_at, {buyer} AS user, l.name AS product, \
         l.{qty_col} AS qty, l.{price_col} AS unit, {amount} AS line, \
         {ref_expr} AS order_ref FROM {table} l JOIN orders o ON {join}"
    );
    let mut args = Vec::new();
    let mut clauses = Vec::new();
    if let Some(user) = &filter.user {
        clauses.push(format!("{buyer} LIKE '%' || ? || '%'"));
        args.push(Arg::Text(user.clone()));
    }
    if let Some(product) = &filter.product {
        clauses.push("l.name LIKE '%' || ? || '%'".to_string());
        args.push(Arg::Text(product.clone()));
    }
    if let Some(min) = filter.min {
        clauses.push(format!("{amount} >= ?"));
        args.push(Arg::Int(min));
    }
    if let Some(max) = filter.max {
        clauses.push(format!("{amount} <= ?"));
        args.push(Arg::Int(max));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY o.created_at DESC, l.rowid DESC LIMIT ? OFFSET ?");
    args.push(Arg::Int(filter.limit));
    args.push(Arg::Int(filter.offset));

    let mut query = sqlx::query(&sql);
    for arg in &args {
        query = match arg {
            Arg::Text(s) => query.bind(s),
            Arg::Int(i) => query.bind(i),
        };
    }
    let rows = query.fetch_all(db).await?;
    rows.iter()
        .map(|row| {
            Ok(TimelineRow {
                created_at: row.try_get("created_at")?,
                user: row.try_get("user")?,
                product: row.try_get("product")?,
                qty: row.try_get("qty")?,
                unit: row.try_get("unit")?,
                line: row.try_get("line")?,
                order_ref: row.try_get("order_ref")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(ShopError::from)
}
