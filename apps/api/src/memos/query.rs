use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::models::memo::Memo;

/// Length of the "due soon" window used by the `week` filter.
pub const WEEK_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    CreatedAtDesc,
    DeadlineAsc,
    DeadlineDesc,
}

impl SortOrder {
    /// Unknown values fall back to the default ordering.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("deadline_asc") => SortOrder::DeadlineAsc,
            Some("deadline_desc") => SortOrder::DeadlineDesc,
            _ => SortOrder::CreatedAtDesc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::CreatedAtDesc => "created_at_desc",
            SortOrder::DeadlineAsc => "deadline_asc",
            SortOrder::DeadlineDesc => "deadline_desc",
        }
    }

    /// ORDER BY clause. Null deadlines keep PostgreSQL's defaults:
    /// last when ascending, first when descending.
    pub fn order_by_sql(self) -> &'static str {
        match self {
            SortOrder::CreatedAtDesc => "ORDER BY created_at DESC",
            SortOrder::DeadlineAsc => "ORDER BY deadline ASC, created_at DESC",
            SortOrder::DeadlineDesc => "ORDER BY deadline DESC, created_at DESC",
        }
    }

    /// In-process equivalent of [`SortOrder::order_by_sql`].
    pub fn compare(self, a: &Memo, b: &Memo) -> Ordering {
        let by_created = b.created_at.cmp(&a.created_at);
        match self {
            SortOrder::CreatedAtDesc => by_created,
            SortOrder::DeadlineAsc => nulls_last(a.deadline, b.deadline).then(by_created),
            SortOrder::DeadlineDesc => nulls_last(b.deadline, a.deadline).then(by_created),
        }
    }
}

/// Ascending with `None` after every `Some`. For the descending order the
/// caller swaps the arguments, which moves `None` to the front.
fn nulls_last(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListFilter {
    #[default]
    All,
    /// Deadline within `[now, now + 7 days]`.
    DueThisWeek,
}

impl ListFilter {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("week") => ListFilter::DueThisWeek,
            _ => ListFilter::All,
        }
    }

    pub fn as_str(self) -> Option<&'static str> {
        match self {
            ListFilter::All => None,
            ListFilter::DueThisWeek => Some("week"),
        }
    }

    /// Inclusive deadline bounds, or `None` when the filter keeps everything.
    pub fn window(self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            ListFilter::All => None,
            ListFilter::DueThisWeek => Some((now, now + Duration::days(WEEK_WINDOW_DAYS))),
        }
    }
}

/// Raw `?sort=&filter=` parameters as they arrive on the list view.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub sort: Option<String>,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListQuery {
    pub sort: SortOrder,
    pub filter: ListFilter,
}

impl From<&ListParams> for ListQuery {
    fn from(params: &ListParams) -> Self {
        Self {
            sort: SortOrder::parse(params.sort.as_deref()),
            filter: ListFilter::parse(params.filter.as_deref()),
        }
    }
}

impl ListQuery {
    /// Applies filter and ordering to an in-memory snapshot.
    pub fn apply(self, mut memos: Vec<Memo>, now: DateTime<Utc>) -> Vec<Memo> {
        if let Some((from, to)) = self.filter.window(now) {
            memos.retain(|m| matches!(m.deadline, Some(d) if d >= from && d <= to));
        }
        memos.sort_by(|a, b| self.sort.compare(a, b));
        memos
    }
}
