//! Read-side order history.
//!
//! Legacy header rows may carry zero totals (written before the engine
//! stored them); those are reconstructed from the line snapshots on every
//! read, preferring the precomputed line total when the schema has one.
//! Orders are only ever visible to their owner; a foreign reference reads
//! as absent, not as forbidden.

use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::checkout::tax_for;
use crate::error::ShopError;
use crate::schema::{KeyValue, SchemaMapping};

#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    #[serde(rename = "orderId")]
    pub order_ref: String,
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
    pub last4: String,
    pub created_at: String,
    #[serde(skip)]
    header_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderLine {
    #[serde(rename = "productId")]
    pub product_id: i64,
    pub name: String,
    #[serde(rename = "unitPrice")]
    pub unit_price: i64,
    pub qty: i64,
    #[serde(skip)]
    amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub header: OrderSummary,
    pub items: Vec<OrderLine>,
}

fn header_select(mapping: &SchemaMapping) -> String {
    let ref_expr = mapping.header_ref_expr("");
    let last4_expr = match mapping.last4_col {
        Some(col) => format!("COALESCE({col}, '')"),
        None => "''".to_string(),
    };
    format!(
        "SELECT id, {ref_expr} AS order_ref, COALESCE(subtotal, 0) AS subtotal, \
         COALESCE(tax, 0) AS tax, COALESCE(total, 0) AS total, \
         {last4_expr} AS last4, created_at FROM orders"
    )
}

fn summary_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<OrderSummary, sqlx::Error> {
    Ok(OrderSummary {
        header_id: row.try_get("id")?,
        order_ref: row.try_get("order_ref")?,
        subtotal: row.try_get("subtotal")?,
        tax: row.try_get("tax")?,
        total: row.try_get("total")?,
        last4: row.try_get("last4")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Sum of line amounts for one order, for headers with unstored totals.
async fn line_subtotal(
    db: &SqlitePool,
    mapping: &SchemaMapping,
    key: &KeyValue,
) -> Result<i64, sqlx::Error> {
    let amount = mapping.line_amount_expr("");
    let table = mapping.lines_table;
    let key_col = mapping.line_key_col;
    let sql = format!("SELECT COALESCE(SUM({amount}), 0) FROM {table} WHERE {key_col} = ?1");
    let query = sqlx::query_scalar::<_, i64>(&sql);
    match key {
        KeyValue::Text(s) => query.bind(s).fetch_one(db).await,
        KeyValue::Id(id) => query.bind(id).fetch_one(db).await,
    }
}

fn apply_reconstruction(summary: &mut OrderSummary, line_sum: i64) {
    summary.subtotal = line_sum;
    summary.tax = tax_for(line_sum);
    summary.total = summary.subtotal + summary.tax;
}

/// Up to `limit` most recent orders for the caller, newest first.
pub async fn list_orders(
    db: &SqlitePool,
    mapping: &SchemaMapping,
    caller: i64,
    limit: i64,
) -> Result<Vec<OrderSummary>, ShopError> {
    let sql = format!(
        "{} WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        header_select(mapping)
    );
    let rows = sqlx::query(&sql)
        .bind(caller)
        .bind(limit)
        .fetch_all(db)
        .await?;

    let mut orders = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut summary = summary_from_row(row)?;
        if summary.subtotal == 0 && summary.total == 0 {
            let key = mapping.line_key_value(summary.header_id, &summary.order_ref);
            let sum = line_subtotal(db, mapping, &key).await?;
            apply_reconstruction(&mut summary, sum);
        }
        orders.push(summary);
    }
    Ok(orders)
}

/// One order with its lines, owner-scoped. Foreign or unknown references
/// are `NotFound`.
pub async fn get_order(
    db: &SqlitePool,
    mapping: &SchemaMapping,
    caller: i64,
    reference: &str,
) -> Result<OrderDetail, ShopError> {
    let row = match mapping.header_ref_col {
        Some(col) => {
            let sql = format!(
                "{} WHERE user_id = ?1 AND {col} = ?2",
                header_select(mapping)
            );
            sqlx::query(&sql)
                .bind(caller)
                .bind(reference)
                .fetch_optional(db)
                .await?
        }
        None => {
            let id: i64 = reference.parse().map_err(|_| ShopError::NotFound)?;
            let sql = format!("{} WHERE user_id = ?1 AND id = ?2", header_select(mapping));
            sqlx::query(&sql)
                .bind(caller)
                .bind(id)
                .fetch_optional(db)
                .await?
        }
    };
    let row = row.ok_or(ShopError::NotFound)?;
    let mut header = summary_from_row(&row)?;

    let amount = mapping.line_amount_expr("");
    let table = mapping.lines_table;
    let key_col = mapping.line_key_col;
    let price_col = mapping.price_col;
    let qty_col = mapping.qty_col;
    let sql = format!(
        "SELECT product_id, name, {price_col} AS unit_price, {qty_col} AS qty, \
         {amount} AS amount FROM {table} WHERE {key_col} = ?1 ORDER BY rowid"
    );
    let key = mapping.line_key_value(header.header_id, &header.order_ref);
    let query = sqlx::query(&sql);
    let line_rows = match &key {
        KeyValue::Text(s) => query.bind(s).fetch_all(db).await?,
        KeyValue::Id(id) => query.bind(id).fetch_all(db).await?,
    };

    let mut items = Vec::with_capacity(line_rows.len());
    for line in &line_rows {
        items.push(OrderLine {
            product_id: line.try_get("product_id")?,
            name: line.try_get("name")?,
            unit_price: line.try_get("unit_price")?,
            qty: line.try_get("qty")?,
            amount: line.try_get("amount")?,
        });
    }

    if header.subtotal == 0 && header.total == 0 {
        let sum = items.iter().map(|l| l.amount).sum();
        apply_reconstruction(&mut header, sum);
    }

    Ok(OrderDetail { header, items })
}
