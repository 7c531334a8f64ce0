use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::query::ListQuery;
use super::MemoRepository;
use crate::models::memo::{Memo, MemoUpdate, NewMemo};

/// PostgreSQL-backed memo store.
#[derive(Clone)]
pub struct PgMemoRepository {
    pool: PgPool,
}

impl PgMemoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// SELECT for the list view. Placeholders `$1`/`$2` are the filter window
/// bounds and only appear when the filter is active.
fn list_sql(query: ListQuery, filtered: bool) -> String {
    let mut sql = String::from("SELECT * FROM memos");
    if filtered {
        sql.push_str(" WHERE deadline >= $1 AND deadline <= $2");
    }
    sql.push(' ');
    sql.push_str(query.sort.order_by_sql());
    sql
}

#[async_trait]
impl MemoRepository for PgMemoRepository {
    async fn create(&self, new: NewMemo) -> Result<Memo> {
        let memo = sqlx::query_as::<_, Memo>(
            r#"
            INSERT INTO memos (id, title, content, deadline, completed, summary, created_at)
            VALUES ($1, $2, $3, $4, FALSE, NULL, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.title)
        .bind(&new.content)
        .bind(new.deadline)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        info!("Created memo {}", memo.id);
        Ok(memo)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Memo>> {
        Ok(sqlx::query_as::<_, Memo>("SELECT * FROM memos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list(&self, query: ListQuery, now: DateTime<Utc>) -> Result<Vec<Memo>> {
        let window = query.filter.window(now);
        let sql = list_sql(query, window.is_some());

        let mut select = sqlx::query_as::<_, Memo>(&sql);
        if let Some((from, to)) = window {
            select = select.bind(from).bind(to);
        }
        Ok(select.fetch_all(&self.pool).await?)
    }

    async fn update(&self, id: Uuid, update: MemoUpdate) -> Result<Option<Memo>> {
        Ok(sqlx::query_as::<_, Memo>(
            r#"
            UPDATE memos
            SET title = $2, content = $3, deadline = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.title)
        .bind(&update.content)
        .bind(update.deadline)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM memos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            info!("Deleted memo {id}");
        }
        Ok(result.rows_affected() > 0)
    }

    async fn set_completed(&self, id: Uuid, completed: bool) -> Result<Option<Memo>> {
        Ok(sqlx::query_as::<_, Memo>(
            "UPDATE memos SET completed = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(completed)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_summary(&self, id: Uuid, summary: &str) -> Result<Option<Memo>> {
        Ok(sqlx::query_as::<_, Memo>(
            "UPDATE memos SET summary = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(summary)
        .fetch_optional(&self.pool)
        .await?)
    }
}
