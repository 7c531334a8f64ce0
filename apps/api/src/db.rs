use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS memos (
        id          UUID PRIMARY KEY,
        title       TEXT NOT NULL,
        content     TEXT NOT NULL DEFAULT '',
        deadline    TIMESTAMPTZ,
        completed   BOOLEAN NOT NULL DEFAULT FALSE,
        summary     TEXT,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS memos_deadline_idx ON memos (deadline)",
    "CREATE INDEX IF NOT EXISTS memos_created_at_idx ON memos (created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS oauth_credentials (
        account        TEXT PRIMARY KEY,
        access_token   TEXT NOT NULL,
        refresh_token  TEXT,
        expires_at     TIMESTAMPTZ NOT NULL,
        scope          TEXT NOT NULL,
        updated_at     TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Creates missing tables and indexes. Safe to run on every start.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Database schema ready");
    Ok(())
}
