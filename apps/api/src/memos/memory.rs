use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::query::ListQuery;
use super::MemoRepository;
use crate::models::memo::{Memo, MemoUpdate, NewMemo};

/// Process-memory memo store, used when no database is configured.
#[derive(Default)]
pub struct InMemoryMemoRepository {
    memos: RwLock<HashMap<Uuid, Memo>>,
}

impl InMemoryMemoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify(&self, id: Uuid, f: impl FnOnce(&mut Memo)) -> Option<Memo> {
        let mut memos = self.memos.write().await;
        let memo = memos.get_mut(&id)?;
        f(memo);
        Some(memo.clone())
    }
}

#[async_trait]
impl MemoRepository for InMemoryMemoRepository {
    async fn create(&self, new: NewMemo) -> Result<Memo> {
        let memo = Memo {
            id: Uuid::new_v4(),
            title: new.title,
            content: new.content,
            deadline: new.deadline,
            completed: false,
            summary: None,
            created_at: Utc::now(),
        };
        self.memos.write().await.insert(memo.id, memo.clone());
        Ok(memo)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Memo>> {
        Ok(self.memos.read().await.get(&id).cloned())
    }

    async fn list(&self, query: ListQuery, now: DateTime<Utc>) -> Result<Vec<Memo>> {
        let snapshot: Vec<Memo> = self.memos.read().await.values().cloned().collect();
        Ok(query.apply(snapshot, now))
    }

    async fn update(&self, id: Uuid, update: MemoUpdate) -> Result<Option<Memo>> {
        Ok(self
            .modify(id, |memo| {
                memo.title = update.title;
                memo.content = update.content;
                memo.deadline = update.deadline;
            })
            .await)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.memos.write().await.remove(&id).is_some())
    }

    async fn set_completed(&self, id: Uuid, completed: bool) -> Result<Option<Memo>> {
        Ok(self.modify(id, |memo| memo.completed = completed).await)
    }

    async fn set_summary(&self, id: Uuid, summary: &str) -> Result<Option<Memo>> {
        Ok(self
            .modify(id, |memo| memo.summary = Some(summary.to_string()))
            .await)
    }
}
