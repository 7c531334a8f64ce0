// Record store: the memo table and its sort/filter projections.
// Handlers only talk to `MemoRepository`; the backend is picked at startup.

pub mod forms;
pub mod handlers;
pub mod memory;
pub mod pg;
pub mod query;
pub mod views;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::memo::{Memo, MemoUpdate, NewMemo};
use query::ListQuery;

/// Storage seam for memos. Every mutation commits on its own.
/// Lookups by id return `None` for unknown ids; handlers map that to 404.
#[async_trait]
pub trait MemoRepository: Send + Sync {
    async fn create(&self, new: NewMemo) -> Result<Memo>;

    async fn get(&self, id: Uuid) -> Result<Option<Memo>>;

    /// `now` anchors the `week` filter window.
    async fn list(&self, query: ListQuery, now: DateTime<Utc>) -> Result<Vec<Memo>>;

    async fn update(&self, id: Uuid, update: MemoUpdate) -> Result<Option<Memo>>;

    /// Hard delete. Returns `false` when nothing was removed.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn set_completed(&self, id: Uuid, completed: bool) -> Result<Option<Memo>>;

    async fn set_summary(&self, id: Uuid, summary: &str) -> Result<Option<Memo>>;
}
