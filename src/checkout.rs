//! Order placement.
//!
//! The only write path that creates orders and consumes stock. Validation
//! and totals happen before the transaction; inside it the header, the line
//! snapshots and the stock decrements either all commit or all roll back.
//! Overselling under concurrent callers is prevented by the conditional
//! decrement predicate, not by any in-process lock.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::catalog;
use crate::error::ShopError;
use crate::schema::{KeyValue, SchemaMapping};

pub const TAX_RATE_PERCENT: i64 = 10;

/// One requested cart entry. Prices never come from the client.
#[derive(Debug, Clone, Copy)]
pub struct CartLine {
    pub product_id: i64,
    pub qty: i64,
}

/// Display-only payment metadata. The card tail is not a secret and no
/// capture happens here.
#[derive(Debug, Clone)]
pub struct Payment {
    pub name: String,
    pub last4: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub order_ref: String,
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
    pub last4: String,
}

/// Round-half-up tax on a subtotal in minor currency units.
pub fn tax_for(subtotal: i64) -> i64 {
    (subtotal * TAX_RATE_PERCENT + 50) / 100
}

/// Caller-visible order reference: time-ordered, collision-resistant for
/// the lifetime of the store. Not a security token.
fn new_order_ref() -> String {
    format!(
        "ORD-{}-{:04X}",
        Utc::now().format("%Y%m%d%H%M%S"),
        rand::random::<u16>()
    )
}

/// Place an order for `caller`: validate the cart against the live catalog,
/// compute totals server-side, then atomically persist the order and
/// decrement stock. Returns the committed receipt.
pub async fn place_order(
    db: &SqlitePool,
    mapping: &SchemaMapping,
    caller: i64,
    items: &[CartLine],
    payment: &Payment,
) -> Result<Receipt, ShopError> {
    if items.is_empty() {
        return Err(ShopError::BadRequest("cart is empty".into()));
    }
    if items.iter().any(|i| i.qty <= 0) {
        return Err(ShopError::BadRequest("quantity must be positive".into()));
    }
    if payment.last4.len() > 4 || !payment.last4.chars().all(|c| c.is_ascii_digit()) {
        return Err(ShopError::BadRequest("invalid card digits".into()));
    }

    let mut ids: Vec<i64> = items.iter().map(|i| i.product_id).collect();
    ids.sort_unstable();
    ids.dedup();
    let products = catalog::load_by_ids(db, &ids).await?;

    let mut subtotal = 0i64;
    for item in items {
        let product = products
            .get(&item.product_id)
            .ok_or(ShopError::UnknownProduct {
                product_id: item.product_id,
            })?;
        subtotal += product.price * item.qty;
    }

    // Pre-check before touching anything; the conditional decrement below
    // re-validates under the transaction.
    for item in items {
        let product = &products[&item.product_id];
        if product.stock < item.qty {
            return Err(ShopError::OutOfStock {
                product_id: item.product_id,
                available: product.stock,
                requested: item.qty,
            });
        }
    }

    let tax = tax_for(subtotal);
    let total = subtotal + tax;
    let order_ref = new_order_ref();

    let mut tx = db.begin().await?;

    let mut cols: Vec<&'static str> = vec!["user_id", "subtotal", "tax", "total"];
    if let Some(c) = mapping.header_ref_col {
        cols.push(c);
    }
    if let Some(c) = mapping.last4_col {
        cols.push(c);
    }
    if let Some(c) = mapping.buyer_col {
        cols.push(c);
    }
    let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
    let header_sql = format!(
        "INSERT INTO orders ({}) VALUES ({})",
        cols.join(", "),
        placeholders.join(", ")
    );
    let mut header = sqlx::query(&header_sql)
        .bind(caller)
        .bind(subtotal)
        .bind(tax)
        .bind(total);
    if mapping.header_ref_col.is_some() {
        header = header.bind(&order_ref);
    }
    if mapping.last4_col.is_some() {
        header = header.bind(&payment.last4);
    }
    if mapping.buyer_col.is_some() {
        header = header.bind(&payment.name);
    }
    let header_id = header.execute(&mut *tx).await?.last_insert_rowid();

    // Without a reference column the row id is the reference.
    let order_ref = if mapping.header_ref_col.is_some() {
        order_ref
    } else {
        header_id.to_string()
    };
    let key = mapping.line_key_value(header_id, &order_ref);

    let table = mapping.lines_table;
    let key_col = mapping.line_key_col;
    let price_col = mapping.price_col;
    let qty_col = mapping.qty_col;
    let line_sql = match mapping.line_total_col {
        Some(lt) => format!(
            "INSERT INTO {table} ({key_col}, product_id, name, {price_col}, {qty_col}, {lt}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ),
        None => format!(
            "INSERT INTO {table} ({key_col}, product_id, name, {price_col}, {qty_col}) \
             VALUES (?1, ?2, ?3, ?4, ?5)"
        ),
    };

    for item in items {
        let product = products
            .get(&item.product_id)
            .ok_or(ShopError::UnknownProduct {
                product_id: item.product_id,
            })?;
        let mut line = match &key {
            KeyValue::Text(s) => sqlx::query(&line_sql).bind(s),
            KeyValue::Id(id) => sqlx::query(&line_sql).bind(id),
        };
        line = line
            .bind(item.product_id)
            .bind(&product.name)
            .bind(product.price)
            .bind(item.qty);
        if mapping.line_total_col.is_some() {
            line = line.bind(product.price * item.qty);
        }
        line.execute(&mut *tx).await?;
    }

    for item in items {
        let updated =
            sqlx::query("UPDATE products SET stock = stock - ?1 WHERE id = ?2 AND stock >= ?1")
                .bind(item.qty)
                .bind(item.product_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        if updated == 0 {
            tx.rollback().await?;
            tracing::warn!(product_id = item.product_id, "stock lost to concurrent order");
            return Err(ShopError::OutOfStockRace {
                product_id: item.product_id,
            });
        }
    }

    tx.commit().await?;
    tracing::info!(%order_ref, total, "order placed");

    Ok(Receipt {
        order_ref,
        subtotal,
        tax,
        total,
        last4: payment.last4.clone(),
    })
}
