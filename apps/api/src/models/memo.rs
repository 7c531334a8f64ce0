use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Memo {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub deadline: Option<DateTime<Utc>>,
    pub completed: bool,
    /// Derived from `content` on the summarize path only; may be stale.
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Validated input for creating a memo.
#[derive(Debug, Clone)]
pub struct NewMemo {
    pub title: String,
    pub content: String,
    pub deadline: Option<DateTime<Utc>>,
}

/// Editable fields. The edit form always submits all of them.
#[derive(Debug, Clone)]
pub struct MemoUpdate {
    pub title: String,
    pub content: String,
    pub deadline: Option<DateTime<Utc>>,
}
