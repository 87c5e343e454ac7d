//! Typed parameters for each operation, with bounded lengths.
//!
//! Unknown fields are rejected at deserialization; lengths and ranges are checked by
//! [`Validate`] before any backend call.

use serde::Deserialize;

use crate::backend::MAX_LOG_LINES;
use crate::bean::{BeanUpdate, NewBean, CLOSED_STATUSES, STATUS_TODO};
use crate::error::BeansError;
use crate::query::{Query, SortMode};

pub const MAX_ID_LEN: usize = 128;
pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_TEXT_LEN: usize = 65_536;
pub const MAX_PATH_LEN: usize = 1_024;
pub const MAX_META_LEN: usize = 64;
pub const MAX_SEARCH_LEN: usize = 256;
pub const MAX_LIST_ENTRIES: usize = 64;
pub const MAX_LIMIT: usize = 1_000;

pub trait Validate {
    fn validate(&self) -> Result<(), BeansError>;
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), BeansError> {
    let len = value.chars().count();
    if len > max {
        return Err(BeansError::Validation(format!(
            "{} is {} characters; the limit is {}",
            field, len, max
        )));
    }
    Ok(())
}

fn check_required(field: &str, value: &str, max: usize) -> Result<(), BeansError> {
    if value.trim().is_empty() {
        return Err(BeansError::Validation(format!("{} must not be empty", field)));
    }
    check_len(field, value, max)
}

fn check_opt(field: &str, value: Option<&str>, max: usize) -> Result<(), BeansError> {
    value.map_or(Ok(()), |v| check_len(field, v, max))
}

fn check_list(field: &str, items: &[String], max_item: usize) -> Result<(), BeansError> {
    if items.len() > MAX_LIST_ENTRIES {
        return Err(BeansError::Validation(format!(
            "{} has {} entries; the limit is {}",
            field,
            items.len(),
            MAX_LIST_ENTRIES
        )));
    }
    items.iter().try_for_each(|item| check_required(field, item, max_item))
}

fn check_range(field: &str, value: Option<usize>, max: usize) -> Result<(), BeansError> {
    match value {
        Some(v) if v == 0 || v > max => Err(BeansError::Validation(format!(
            "{} must be between 1 and {}",
            field, max
        ))),
        _ => Ok(()),
    }
}

/// For operations that take no arguments.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoParams {}

impl Validate for NoParams {
    fn validate(&self) -> Result<(), BeansError> {
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InitParams {
    #[serde(default)]
    pub prefix: Option<String>,
}

impl Validate for InitParams {
    fn validate(&self) -> Result<(), BeansError> {
        check_opt("prefix", self.prefix.as_deref(), MAX_META_LEN)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListParams {
    #[serde(default)]
    pub status: Vec<String>,
    #[serde(default, rename = "type")]
    pub types: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub include_closed: Option<bool>,
    #[serde(default)]
    pub sort: Option<SortMode>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Validate for ListParams {
    fn validate(&self) -> Result<(), BeansError> {
        check_list("status", &self.status, MAX_META_LEN)?;
        check_list("type", &self.types, MAX_META_LEN)?;
        check_list("tags", &self.tags, MAX_META_LEN)?;
        check_opt("search", self.search.as_deref(), MAX_SEARCH_LEN)?;
        check_range("limit", self.limit, MAX_LIMIT)
    }
}

impl ListParams {
    pub fn into_query(self) -> Query {
        Query {
            statuses: self.status,
            types: self.types,
            tags: self.tags,
            search: self.search.filter(|s| !s.trim().is_empty()),
            include_closed: self.include_closed.unwrap_or(true),
            sort: self.sort.unwrap_or_default(),
            limit: self.limit,
        }
    }
}

/// `beans_get` and other single-id lookups.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IdParams {
    pub id: String,
}

impl Validate for IdParams {
    fn validate(&self) -> Result<(), BeansError> {
        check_required("id", &self.id, MAX_ID_LEN)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateParams {
    pub title: String,
    #[serde(rename = "type")]
    pub bean_type: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
}

impl Validate for CreateParams {
    fn validate(&self) -> Result<(), BeansError> {
        check_required("title", &self.title, MAX_TITLE_LEN)?;
        check_required("type", &self.bean_type, MAX_META_LEN)?;
        check_opt("status", self.status.as_deref(), MAX_META_LEN)?;
        check_opt("priority", self.priority.as_deref(), MAX_META_LEN)?;
        check_opt("description", self.description.as_deref(), MAX_TEXT_LEN)?;
        check_opt("parent", self.parent.as_deref(), MAX_ID_LEN)
    }
}

impl From<CreateParams> for NewBean {
    fn from(p: CreateParams) -> Self {
        NewBean {
            title: p.title,
            bean_type: p.bean_type,
            status: p.status,
            priority: p.priority,
            description: p.description,
            parent: p.parent,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateParams {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "type")]
    pub bean_type: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub clear_parent: bool,
    #[serde(default)]
    pub blocking: Vec<String>,
    #[serde(default)]
    pub blocked_by: Vec<String>,
}

impl Validate for UpdateParams {
    fn validate(&self) -> Result<(), BeansError> {
        check_required("id", &self.id, MAX_ID_LEN)?;
        check_opt("status", self.status.as_deref(), MAX_META_LEN)?;
        check_opt("type", self.bean_type.as_deref(), MAX_META_LEN)?;
        check_opt("priority", self.priority.as_deref(), MAX_META_LEN)?;
        check_opt("parent", self.parent.as_deref(), MAX_ID_LEN)?;
        check_list("blocking", &self.blocking, MAX_ID_LEN)?;
        check_list("blockedBy", &self.blocked_by, MAX_ID_LEN)?;
        let nothing = self.status.is_none()
            && self.bean_type.is_none()
            && self.priority.is_none()
            && self.parent.is_none()
            && !self.clear_parent
            && self.blocking.is_empty()
            && self.blocked_by.is_empty();
        if nothing {
            return Err(BeansError::Validation("update names no changes".to_string()));
        }
        Ok(())
    }
}

impl UpdateParams {
    pub fn into_parts(self) -> (String, BeanUpdate) {
        let update = BeanUpdate {
            status: self.status,
            bean_type: self.bean_type,
            priority: self.priority,
            parent: self.parent,
            clear_parent: self.clear_parent,
            blocking: self.blocking,
            blocked_by: self.blocked_by,
        };
        (self.id, update)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReopenParams {
    pub id: String,
    /// The caller's belief about the current status; must be a closed status.
    pub required_current_status: String,
    #[serde(default)]
    pub target_status: Option<String>,
}

impl Validate for ReopenParams {
    fn validate(&self) -> Result<(), BeansError> {
        check_required("id", &self.id, MAX_ID_LEN)?;
        check_required("requiredCurrentStatus", &self.required_current_status, MAX_META_LEN)?;
        check_opt("targetStatus", self.target_status.as_deref(), MAX_META_LEN)?;
        if !CLOSED_STATUSES.contains(&self.required_current_status.as_str()) {
            return Err(BeansError::Validation(format!(
                "requiredCurrentStatus must be one of {}",
                CLOSED_STATUSES.join(", ")
            )));
        }
        if CLOSED_STATUSES.contains(&self.target()) {
            return Err(BeansError::Validation(
                "targetStatus must be an open status".to_string(),
            ));
        }
        Ok(())
    }
}

impl ReopenParams {
    pub fn target(&self) -> &str {
        self.target_status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(STATUS_TODO)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeleteParams {
    pub id: String,
    #[serde(default)]
    pub force: bool,
}

impl Validate for DeleteParams {
    fn validate(&self) -> Result<(), BeansError> {
        check_required("id", &self.id, MAX_ID_LEN)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReadLogParams {
    #[serde(default)]
    pub max_lines: Option<usize>,
}

impl Validate for ReadLogParams {
    fn validate(&self) -> Result<(), BeansError> {
        check_range("maxLines", self.max_lines, MAX_LOG_LINES)
    }
}

/// `beans_read_file` and `beans_delete_file`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PathParams {
    pub path: String,
}

impl Validate for PathParams {
    fn validate(&self) -> Result<(), BeansError> {
        check_required("path", &self.path, MAX_PATH_LEN)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WriteFileParams {
    pub path: String,
    pub content: String,
}

impl Validate for WriteFileParams {
    fn validate(&self) -> Result<(), BeansError> {
        check_required("path", &self.path, MAX_PATH_LEN)?;
        check_len("content", &self.content, MAX_TEXT_LEN)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateFileParams {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub overwrite: bool,
}

impl Validate for CreateFileParams {
    fn validate(&self) -> Result<(), BeansError> {
        check_required("path", &self.path, MAX_PATH_LEN)?;
        check_len("content", &self.content, MAX_TEXT_LEN)
    }
}
