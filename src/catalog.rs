//! Catalog reads.
//!
//! Products are written by the inventory tooling; the checkout path only
//! reads them here and decrements stock inside its own transaction.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqlitePool;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i64,
    pub image_path: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Load the distinct products referenced by a cart in one query.
pub async fn load_by_ids(
    db: &SqlitePool,
    ids: &[i64],
) -> Result<HashMap<i64, Product>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("SELECT * FROM products WHERE id IN ({placeholders})");
    let mut query = sqlx::query_as::<_, Product>(&sql);
    for id in ids {
        query = query.bind(id);
    }
    let rows = query.fetch_all(db).await?;
    Ok(rows.into_iter().map(|p| (p.id, p)).collect())
}

pub async fn list(
    db: &SqlitePool,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Product>, sqlx::Error> {
    match search {
        Some(term) => {
            sqlx::query_as::<_, Product>(
                "SELECT * FROM products WHERE name LIKE '%' || ?1 || '%' \
                 ORDER BY id LIMIT ?2 OFFSET ?3",
            )
            .bind(term)
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await
        }
        None => {
            sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY id LIMIT ?1 OFFSET ?2")
                .bind(limit)
                .bind(offset)
                .fetch_all(db)
                .await
        }
    }
}

pub async fn get(db: &SqlitePool, id: i64) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
        .bind(id)
        .fetch_optional(db)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn batch_load_keys_by_id() {
        let pool = db::test_pool().await;
        let products = load_by_ids(&pool, &[1, 3, 999]).await.unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[&1].name, "Laptop");
        assert!(!products.contains_key(&999));
    }

    #[tokio::test]
    async fn search_is_a_bound_parameter() {
        let pool = db::test_pool().await;
        let hits = list(&pool, Some("phone"), 20, 0).await.unwrap();
        assert!(hits.iter().any(|p| p.name == "Smartphone"));
        // A would-be injection term is just an unmatched literal.
        let none = list(&pool, Some("' OR '1'='1"), 20, 0).await.unwrap();
        assert!(none.is_empty());
    }
}
