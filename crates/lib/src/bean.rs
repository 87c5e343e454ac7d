//! Bean records and the inputs used to create, update, and filter them.
//!
//! Field names follow the camelCase JSON the beans CLI emits. Status, type, and
//! priority stay plain strings: the CLI may grow new values and those must pass
//! through untouched.

use serde::{Deserialize, Serialize};

pub const STATUS_DRAFT: &str = "draft";
pub const STATUS_TODO: &str = "todo";
pub const STATUS_IN_PROGRESS: &str = "in-progress";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_SCRAPPED: &str = "scrapped";

/// Statuses a bean can be deleted from without `force`.
pub const DELETABLE_STATUSES: [&str; 2] = [STATUS_DRAFT, STATUS_SCRAPPED];

/// Terminal statuses, hidden by `includeClosed: false` and the only ones `reopen` accepts.
pub const CLOSED_STATUSES: [&str; 2] = [STATUS_COMPLETED, STATUS_SCRAPPED];

/// A single trackable work item as reported by the beans CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bean {
    pub id: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "type")]
    pub bean_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub blocking_ids: Vec<String>,
    #[serde(default)]
    pub blocked_by_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl Bean {
    pub fn is_closed(&self) -> bool {
        CLOSED_STATUSES.contains(&self.status.as_str())
    }

    pub fn is_deletable(&self) -> bool {
        DELETABLE_STATUSES.contains(&self.status.as_str())
    }
}

/// Upstream filter for `list`. Empty fields mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeanFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Vec::is_empty")]
    pub bean_type: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl BeanFilter {
    pub fn is_empty(&self) -> bool {
        self.status.is_empty()
            && self.bean_type.is_empty()
            && self.search.as_deref().map_or(true, |s| s.trim().is_empty())
    }

    /// True if the bean satisfies every non-empty field of the filter.
    pub fn matches(&self, bean: &Bean) -> bool {
        if !self.status.is_empty() && !self.status.iter().any(|s| s == &bean.status) {
            return false;
        }
        if !self.bean_type.is_empty() && !self.bean_type.iter().any(|t| t == &bean.bean_type) {
            return false;
        }
        match self.search.as_deref() {
            Some(text) => crate::query::matches_search(bean, text),
            None => true,
        }
    }
}

/// Input for `create`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBean {
    pub title: String,
    #[serde(rename = "type")]
    pub bean_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "body")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Input for `update`. `blocking` / `blocked_by` are additions to the existing sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeanUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub bean_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub clear_parent: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocking: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
}

/// What happens to the parent link when an update is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentChange<'a> {
    Keep,
    Set(&'a str),
    Clear,
}

impl BeanUpdate {
    /// `parent` wins over `clear_parent` when both are supplied.
    pub fn parent_change(&self) -> ParentChange<'_> {
        match (self.parent.as_deref(), self.clear_parent) {
            (Some(p), _) => ParentChange::Set(p),
            (None, true) => ParentChange::Clear,
            (None, false) => ParentChange::Keep,
        }
    }
}
