use sqlx::{PgPool, Result};
use crate::db::models::*;

pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS value_area_results (
            id            UUID PRIMARY KEY,
            symbol        TEXT             NOT NULL,
            current_price DOUBLE PRECISION NOT NULL,
            vah           DOUBLE PRECISION NOT NULL,
            val           DOUBLE PRECISION NOT NULL,
            created_at    TIMESTAMPTZ      NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS value_area_results_created_idx \
         ON value_area_results (created_at DESC)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

// VALUE AREA RESULTS
pub async fn insert_value_area_results(pool: &PgPool, rows: &[ValueAreaResult]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for r in rows {
        sqlx::query(
            r#"
            INSERT INTO value_area_results
                  (id, symbol, current_price, vah, val, created_at)
            VALUES ($1, $2    , $3           , $4 , $5 , $6)
            "#,
        )
        .bind(r.id)
        .bind(&r.symbol)
        .bind(r.current_price)
        .bind(r.vah)
        .bind(r.val)
        .bind(r.created_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

/// Newest row per symbol, most recent symbols first.
pub async fn recent_value_area_results(pool: &PgPool, limit: i64) -> Result<Vec<ValueAreaResult>> {
    sqlx::query_as::<_, ValueAreaResult>(
        r#"
        SELECT id, symbol, current_price, vah, val, created_at
        FROM (
            SELECT DISTINCT ON (symbol) id, symbol, current_price, vah, val, created_at
            FROM   value_area_results
            ORDER  BY symbol, created_at DESC
        ) latest
        ORDER BY created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
