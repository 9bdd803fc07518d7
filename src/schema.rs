//! Runtime discovery of the order storage shape.
//!
//! The order relations have drifted across deployments: restored backups may
//! carry an older line table name, an integer surrogate join key instead of
//! the reference string, renamed price/quantity columns, or a header without
//! the `order_ref` column. Rather than assembling SQL ad hoc per request,
//! the shape is probed once at startup into a [`SchemaMapping`] and every
//! statement is built from that closed set of static column names. Values
//! are always bound parameters.
//!
//! The probe is a pure metadata read and cheap enough to re-run, e.g. after
//! a backup restore swaps the database file.

use sqlx::{Row, SqlitePool};

use crate::error::ShopError;

/// How order lines point at their order header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKey {
    /// Text column holding the caller-visible order reference.
    Reference,
    /// Integer column holding the header's surrogate row id.
    Surrogate,
}

/// A value for the line join key, typed per the detected convention.
#[derive(Debug, Clone)]
pub enum KeyValue {
    Text(String),
    Id(i64),
}

/// Column strategy for the order header and line relations.
#[derive(Debug, Clone)]
pub struct SchemaMapping {
    pub lines_table: &'static str,
    pub line_key: LineKey,
    pub line_key_col: &'static str,
    pub price_col: &'static str,
    pub qty_col: &'static str,
    pub line_total_col: Option<&'static str>,
    /// Text identifier column on the header; when absent the integer row id
    /// doubles as the caller-visible reference.
    pub header_ref_col: Option<&'static str>,
    pub last4_col: Option<&'static str>,
    pub buyer_col: Option<&'static str>,
}

impl SchemaMapping {
    /// Probe the live database and resolve the column strategy.
    pub async fn detect(db: &SqlitePool) -> Result<Self, ShopError> {
        let header_cols = table_columns(db, "orders").await?;
        if header_cols.is_empty() {
            return Err(ShopError::Schema("orders table missing".into()));
        }

        let mut lines_table = None;
        let mut line_cols = Vec::new();
        for table in ["order_items", "order_lines"] {
            let cols = table_columns(db, table).await?;
            if !cols.is_empty() {
                lines_table = Some(table);
                line_cols = cols;
                break;
            }
        }
        let lines_table =
            lines_table.ok_or_else(|| ShopError::Schema("order line table missing".into()))?;

        // The two key conventions are mutually exclusive; when a backup
        // somehow carries both, the reference column wins. The join strategy
        // follows the declared type affinity, not the column name.
        let (line_key_col, key_decl) = pick(&line_cols, &["order_ref", "order_id"])
            .ok_or_else(|| ShopError::Schema(format!("{lines_table} has no order key column")))?;
        let line_key = if text_like(key_decl) {
            LineKey::Reference
        } else {
            LineKey::Surrogate
        };

        let (price_col, _) = pick(&line_cols, &["unit_price", "price"])
            .ok_or_else(|| ShopError::Schema(format!("{lines_table} has no price column")))?;
        let (qty_col, _) = pick(&line_cols, &["qty", "quantity"])
            .ok_or_else(|| ShopError::Schema(format!("{lines_table} has no quantity column")))?;
        let line_total_col = pick(&line_cols, &["line_total"]).map(|(c, _)| c);

        let header_ref_col = pick(&header_cols, &["order_ref"])
            .filter(|(_, decl)| text_like(decl))
            .map(|(c, _)| c);
        let last4_col = pick(&header_cols, &["card_last4", "last4"]).map(|(c, _)| c);
        let buyer_col = pick(&header_cols, &["buyer_name"]).map(|(c, _)| c);

        Ok(Self {
            lines_table,
            line_key,
            line_key_col,
            price_col,
            qty_col,
            line_total_col,
            header_ref_col,
            last4_col,
            buyer_col,
        })
    }

    /// Join key value for lines of the given committed header.
    pub fn line_key_value(&self, header_id: i64, order_ref: &str) -> KeyValue {
        match self.line_key {
            LineKey::Reference => KeyValue::Text(order_ref.to_string()),
            LineKey::Surrogate => KeyValue::Id(header_id),
        }
    }

    /// SQL expression for a line's amount, preferring the precomputed total.
    pub fn line_amount_expr(&self, prefix: &str) -> String {
        let p = self.price_col;
        let q = self.qty_col;
        match self.line_total_col {
            Some(lt) => format!("COALESCE({prefix}{lt}, {prefix}{p} * {prefix}{q})"),
            None => format!("{prefix}{p} * {prefix}{q}"),
        }
    }

    /// SQL expression yielding the caller-visible reference of a header row.
    pub fn header_ref_expr(&self, prefix: &str) -> String {
        match self.header_ref_col {
            Some(col) => format!("{prefix}{col}"),
            None => format!("CAST({prefix}id AS TEXT)"),
        }
    }
}

async fn table_columns(
    db: &SqlitePool,
    table: &'static str,
) -> Result<Vec<(String, String)>, sqlx::Error> {
    // `table` comes from the fixed candidate set above, never from input.
    let sql = format!("SELECT name, type FROM pragma_table_info('{table}')");
    let rows = sqlx::query(&sql).fetch_all(db).await?;
    rows.iter()
        .map(|row| Ok((row.try_get("name")?, row.try_get("type")?)))
        .collect()
}

/// First candidate present among the probed columns, with its declared type.
fn pick<'a>(
    cols: &'a [(String, String)],
    candidates: &[&'static str],
) -> Option<(&'static str, &'a str)> {
    candidates.iter().find_map(|cand| {
        cols.iter()
            .find(|(name, _)| name == cand)
            .map(|(_, decl)| (*cand, decl.as_str()))
    })
}

/// SQLite type-affinity rule: CHAR/TEXT/CLOB declarations hold text.
fn text_like(decl: &str) -> bool {
    let d = decl.to_ascii_uppercase();
    d.contains("CHAR") || d.contains("TEXT") || d.contains("CLOB")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn affinity_classification() {
        assert!(text_like("TEXT"));
        assert!(text_like("varchar(32)"));
        assert!(!text_like("INTEGER"));
        assert!(!text_like("BIGINT"));
    }

    #[tokio::test]
    async fn detects_canonical_shape() {
        let pool = db::test_pool().await;
        let mapping = SchemaMapping::detect(&pool).await.unwrap();
        assert_eq!(mapping.lines_table, "order_items");
        assert_eq!(mapping.line_key, LineKey::Reference);
        assert_eq!(mapping.line_key_col, "order_ref");
        assert_eq!(mapping.price_col, "unit_price");
        assert_eq!(mapping.qty_col, "qty");
        assert_eq!(mapping.line_total_col, Some("line_total"));
        assert_eq!(mapping.header_ref_col, Some("order_ref"));
        assert_eq!(mapping.last4_col, Some("card_last4"));
        assert_eq!(mapping.buyer_col, Some("buyer_name"));
    }

    #[tokio::test]
    async fn detects_legacy_shape() {
        let pool = db::bare_pool().await;
        sqlx::query(
            "CREATE TABLE orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                subtotal INTEGER NOT NULL DEFAULT 0,
                tax INTEGER NOT NULL DEFAULT 0,
                total INTEGER NOT NULL DEFAULT 0,
                last4 TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TABLE order_lines (
                order_id INTEGER NOT NULL,
                product_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                price INTEGER NOT NULL,
                quantity INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        let mapping = SchemaMapping::detect(&pool).await.unwrap();
        assert_eq!(mapping.lines_table, "order_lines");
        assert_eq!(mapping.line_key, LineKey::Surrogate);
        assert_eq!(mapping.line_key_col, "order_id");
        assert_eq!(mapping.price_col, "price");
        assert_eq!(mapping.qty_col, "quantity");
        assert_eq!(mapping.line_total_col, None);
        assert_eq!(mapping.header_ref_col, None);
        assert_eq!(mapping.last4_col, Some("last4"));
        assert_eq!(mapping.buyer_col, None);
    }

    #[tokio::test]
    async fn key_type_beats_key_name() {
        let pool = db::bare_pool().await;
        sqlx::query("CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER, subtotal INTEGER, tax INTEGER, total INTEGER, created_at DATETIME)")
            .execute(&pool)
            .await
            .unwrap();
        // A backup where the reference column was rewritten as an integer:
        // the name says reference, the type says surrogate join.
        sqlx::query("CREATE TABLE order_items (order_ref INTEGER, product_id INTEGER, name TEXT, unit_price INTEGER, qty INTEGER)")
            .execute(&pool)
            .await
            .unwrap();

        let mapping = SchemaMapping::detect(&pool).await.unwrap();
        assert_eq!(mapping.line_key_col, "order_ref");
        assert_eq!(mapping.line_key, LineKey::Surrogate);
    }

    #[tokio::test]
    async fn missing_tables_are_reported() {
        let pool = db::bare_pool().await;
        assert!(matches!(
            SchemaMapping::detect(&pool).await,
            Err(ShopError::Schema(_))
        ));

        sqlx::query("CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        assert!(matches!(
            SchemaMapping::detect(&pool).await,
            Err(ShopError::Schema(_))
        ));
    }
}
