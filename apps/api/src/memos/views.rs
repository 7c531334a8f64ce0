use axum::response::Html;
use chrono::{DateTime, Utc};
use minijinja::{context, Environment};
use serde::Serialize;
use uuid::Uuid;

use super::forms::format_deadline_input;
use super::query::ListQuery;
use crate::errors::AppError;
use crate::models::memo::Memo;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../templates/base.html")),
    ("index.html", include_str!("../../templates/index.html")),
    ("view_memo.html", include_str!("../../templates/view_memo.html")),
    ("create_memo.html", include_str!("../../templates/create_memo.html")),
    ("edit_memo.html", include_str!("../../templates/edit_memo.html")),
    ("message.html", include_str!("../../templates/message.html")),
];

/// Template data for one memo, with timestamps preformatted for display.
#[derive(Debug, Serialize)]
struct MemoView<'a> {
    id: Uuid,
    title: &'a str,
    content: &'a str,
    deadline: Option<String>,
    deadline_input: String,
    completed: bool,
    summary: Option<&'a str>,
    created_at: String,
}

impl<'a> From<&'a Memo> for MemoView<'a> {
    fn from(memo: &'a Memo) -> Self {
        Self {
            id: memo.id,
            title: &memo.title,
            content: &memo.content,
            deadline: memo.deadline.map(display_time),
            deadline_input: format_deadline_input(memo.deadline),
            completed: memo.completed,
            summary: memo.summary.as_deref(),
            created_at: display_time(memo.created_at),
        }
    }
}

fn display_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M").to_string()
}

/// HTML renderer. Templates are compiled into the binary and autoescaped.
pub struct Views {
    env: Environment<'static>,
}

impl Views {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<Html<String>, AppError> {
        let html = self
            .env
            .get_template(name)
            .and_then(|t| t.render(ctx))
            .map_err(|e| AppError::Internal(e.into()))?;
        Ok(Html(html))
    }

    pub fn index(&self, memos: &[Memo], query: ListQuery) -> Result<Html<String>, AppError> {
        let memos: Vec<MemoView> = memos.iter().map(MemoView::from).collect();
        self.render(
            "index.html",
            context! {
                memos => memos,
                sort => query.sort.as_str(),
                filter => query.filter.as_str(),
            },
        )
    }

    pub fn memo(&self, memo: &Memo) -> Result<Html<String>, AppError> {
        self.render("view_memo.html", context! { memo => MemoView::from(memo) })
    }

    pub fn create_form(&self) -> Result<Html<String>, AppError> {
        self.render("create_memo.html", context! {})
    }

    pub fn edit_form(&self, memo: &Memo) -> Result<Html<String>, AppError> {
        self.render("edit_memo.html", context! { memo => MemoView::from(memo) })
    }

    /// Plain notice page for mail/OAuth outcomes.
    pub fn message(&self, heading: &str, body: &str) -> Result<Html<String>, AppError> {
        self.render("message.html", context! { heading => heading, body => body })
    }
}
