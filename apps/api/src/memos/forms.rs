use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::memo::{MemoUpdate, NewMemo};

/// Longest title derived from a speech transcript.
const SPEECH_TITLE_MAX_CHARS: usize = 40;

/// Fields posted by the create and edit forms. Everything is optional at the
/// extractor level so a missing title surfaces as a 400 instead of a 422.
#[derive(Debug, Default, Deserialize)]
pub struct MemoForm {
    pub title: Option<String>,
    pub content: Option<String>,
    pub deadline: Option<String>,
}

impl MemoForm {
    fn validated(self) -> Result<(String, String, Option<DateTime<Utc>>), AppError> {
        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Validation("title is required".to_string()))?;
        let content = self.content.unwrap_or_default();
        let deadline = parse_deadline(self.deadline.as_deref())?;
        Ok((title, content, deadline))
    }

    pub fn into_new_memo(self) -> Result<NewMemo, AppError> {
        let (title, content, deadline) = self.validated()?;
        Ok(NewMemo {
            title,
            content,
            deadline,
        })
    }

    pub fn into_update(self) -> Result<MemoUpdate, AppError> {
        let (title, content, deadline) = self.validated()?;
        Ok(MemoUpdate {
            title,
            content,
            deadline,
        })
    }
}

/// Checkbox form on the list view. The checkbox posts `completed=True` when
/// ticked and nothing when cleared; `sort`/`filter` are echoed back so the
/// redirect keeps the current view.
#[derive(Debug, Default, Deserialize)]
pub struct ToggleForm {
    pub completed: Option<String>,
    pub sort: Option<String>,
    pub filter: Option<String>,
}

impl ToggleForm {
    pub fn completed(&self) -> bool {
        self.completed.as_deref() == Some("True")
    }
}

/// Transcript posted by the voice-input button.
#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
}

impl SpeechRequest {
    /// The first line (shortened) becomes the title; the whole transcript is the content.
    pub fn into_new_memo(self) -> Result<NewMemo, AppError> {
        let text = self.text.trim().to_string();
        let first_line = text.lines().next().unwrap_or_default().trim();
        if first_line.is_empty() {
            return Err(AppError::Validation("transcript is empty".to_string()));
        }
        let mut title: String = first_line.chars().take(SPEECH_TITLE_MAX_CHARS).collect();
        if first_line.chars().count() > SPEECH_TITLE_MAX_CHARS {
            title.push('…');
        }
        Ok(NewMemo {
            title,
            content: text,
            deadline: None,
        })
    }
}

/// Accepts what `<input type="datetime-local">` and `<input type="date">`
/// submit, plus RFC 3339. Naive values are taken as UTC. Blank means no deadline.
pub fn parse_deadline(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, AppError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(raw) => raw,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Some(naive.and_utc()));
        }
    }
    if let Some(naive) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Some(naive.and_utc()));
    }

    Err(AppError::Validation(format!("invalid deadline: {raw}")))
}

/// Value for a `datetime-local` input, so the edit form round-trips.
pub fn format_deadline_input(deadline: Option<DateTime<Utc>>) -> String {
    deadline
        .map(|d| d.format("%Y-%m-%dT%H:%M").to_string())
        .unwrap_or_default()
}
