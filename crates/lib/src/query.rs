//! Query engine: sort, filter, and search over beans already fetched by `list`.
//! Everything here is pure; no I/O.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bean::{Bean, BeanFilter};

/// Weight given to status, priority, and type values the tables do not know.
const UNKNOWN_WEIGHT: u8 = 99;

/// Named orderings. Each one is total; ties fall back to input order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortMode {
    #[default]
    #[serde(rename = "status-priority-type-title")]
    StatusPriorityTypeTitle,
    #[serde(rename = "updated")]
    Updated,
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "id")]
    Id,
}

impl SortMode {
    pub const ALL: [SortMode; 4] = [
        SortMode::StatusPriorityTypeTitle,
        SortMode::Updated,
        SortMode::Created,
        SortMode::Id,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::StatusPriorityTypeTitle => "status-priority-type-title",
            SortMode::Updated => "updated",
            SortMode::Created => "created",
            SortMode::Id => "id",
        }
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortMode::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| format!("unknown sort mode: {}", s))
    }
}

fn status_weight(status: &str) -> u8 {
    match status {
        "in-progress" => 0,
        "todo" => 1,
        "draft" => 2,
        "completed" => 3,
        "scrapped" => 4,
        _ => UNKNOWN_WEIGHT,
    }
}

/// Absent priority counts as normal.
fn priority_weight(priority: Option<&str>) -> u8 {
    match priority.unwrap_or("normal") {
        "critical" => 0,
        "high" => 1,
        "normal" | "" => 2,
        "low" => 3,
        "deferred" => 4,
        _ => UNKNOWN_WEIGHT,
    }
}

fn type_weight(bean_type: &str) -> u8 {
    match bean_type {
        "milestone" => 0,
        "epic" => 1,
        "bug" => 2,
        "feature" => 3,
        "task" => 4,
        _ => UNKNOWN_WEIGHT,
    }
}

/// ISO-8601 instant. Values without an offset are read as UTC; a bare date is its midnight.
fn timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let v = value?.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(v) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(v, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(t.and_utc());
    }
    NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// Newest first; beans without a (parseable) timestamp go last.
fn newest_first(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (timestamp(a), timestamp(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare(a: &Bean, b: &Bean, mode: SortMode) -> Ordering {
    match mode {
        SortMode::StatusPriorityTypeTitle => status_weight(&a.status)
            .cmp(&status_weight(&b.status))
            .then_with(|| {
                priority_weight(a.priority.as_deref()).cmp(&priority_weight(b.priority.as_deref()))
            })
            .then_with(|| type_weight(&a.bean_type).cmp(&type_weight(&b.bean_type)))
            .then_with(|| a.title.cmp(&b.title)),
        SortMode::Updated => newest_first(a.updated_at.as_deref(), b.updated_at.as_deref()),
        SortMode::Created => newest_first(a.created_at.as_deref(), b.created_at.as_deref()),
        SortMode::Id => a.id.cmp(&b.id),
    }
}

/// Stable sort by `mode`.
pub fn sort_beans(beans: &mut [Bean], mode: SortMode) {
    beans.sort_by(|a, b| compare(a, b, mode));
}

/// Case-insensitive match of `text` against title, id, and tags. Blank text matches all.
pub fn matches_search(bean: &Bean, text: &str) -> bool {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    bean.title.to_lowercase().contains(&needle)
        || bean.id.to_lowercase().contains(&needle)
        || bean.tags.iter().any(|t| t.to_lowercase().contains(&needle))
}

/// True if the bean carries at least one of `tags`. An empty tag list matches all.
pub fn matches_tags(bean: &Bean, tags: &[String]) -> bool {
    tags.is_empty() || bean.tags.iter().any(|t| tags.contains(t))
}

/// Everything a list request can ask for beyond the upstream filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub statuses: Vec<String>,
    pub types: Vec<String>,
    pub tags: Vec<String>,
    pub search: Option<String>,
    pub include_closed: bool,
    pub sort: SortMode,
    pub limit: Option<usize>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            statuses: Vec::new(),
            types: Vec::new(),
            tags: Vec::new(),
            search: None,
            include_closed: true,
            sort: SortMode::default(),
            limit: None,
        }
    }
}

impl Query {
    /// The part of the query the backend evaluates.
    pub fn upstream_filter(&self) -> BeanFilter {
        BeanFilter {
            status: self.statuses.clone(),
            bean_type: self.types.clone(),
            search: None,
        }
    }

    /// Apply the post-fetch filters, sort, and limit.
    pub fn apply(&self, beans: Vec<Bean>) -> Vec<Bean> {
        let mut out: Vec<Bean> = beans
            .into_iter()
            .filter(|b| self.include_closed || !b.is_closed())
            .filter(|b| matches_tags(b, &self.tags))
            .filter(|b| self.search.as_deref().map_or(true, |s| matches_search(b, s)))
            .collect();
        sort_beans(&mut out, self.sort);
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}
