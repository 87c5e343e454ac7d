//! Operation registry: the definitions clients discover through `tools.list`, and
//! dispatch of a named call to its handler over a [`Backend`].
//!
//! Handlers hold no state. Query operations call `list` and pipe the snapshot
//! through [`crate::query`]; the delete and reopen rules are enforced here, above
//! the backend.

mod params;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::backend::Backend;
use crate::bean::{Bean, BeanFilter, BeanUpdate, NewBean, DELETABLE_STATUSES};
use crate::error::BeansError;
use crate::query::SortMode;

pub use params::{
    MAX_ID_LEN, MAX_LIMIT, MAX_LIST_ENTRIES, MAX_META_LEN, MAX_PATH_LEN, MAX_SEARCH_LEN,
    MAX_TEXT_LEN, MAX_TITLE_LEN,
};
use params::{
    CreateFileParams, CreateParams, DeleteParams, IdParams, InitParams, ListParams, NoParams,
    PathParams, ReadLogParams, ReopenParams, UpdateParams, Validate, WriteFileParams,
};

#[derive(Debug, thiserror::Error)]
pub enum OpError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Arguments did not match the operation's shape (missing or unknown fields, wrong types).
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Failed(#[from] BeansError),
}

impl OpError {
    pub fn kind(&self) -> &'static str {
        match self {
            OpError::UnknownOperation(_) | OpError::InvalidParams(_) => "protocol",
            OpError::Failed(e) => e.kind(),
        }
    }
}

/// One entry of `tools.list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

fn def(name: &'static str, description: &'static str, input_schema: Value) -> OperationDefinition {
    OperationDefinition {
        name,
        description,
        input_schema,
    }
}

fn string(max: usize, description: &str) -> Value {
    json!({ "type": "string", "maxLength": max, "description": description })
}

fn string_list(max_item: usize, description: &str) -> Value {
    json!({
        "type": "array",
        "items": { "type": "string", "maxLength": max_item },
        "maxItems": MAX_LIST_ENTRIES,
        "description": description
    })
}

fn object(required: &[&str], properties: Value) -> Value {
    json!({
        "type": "object",
        "required": required,
        "properties": properties,
        "additionalProperties": false
    })
}

/// Every operation, in a stable order.
pub fn definitions() -> Vec<OperationDefinition> {
    let sort_modes: Vec<&str> = SortMode::ALL.iter().map(SortMode::as_str).collect();
    vec![
        def(
            "beans_init",
            "Initialize the beans workspace. Safe to call on an initialized workspace.",
            object(&[], json!({ "prefix": string(MAX_META_LEN, "Id prefix for new beans") })),
        ),
        def(
            "beans_list",
            "List beans with optional filters, search, sort, and limit.",
            object(
                &[],
                json!({
                    "status": string_list(MAX_META_LEN, "Only these statuses"),
                    "type": string_list(MAX_META_LEN, "Only these types"),
                    "tags": string_list(MAX_META_LEN, "Beans carrying any of these tags"),
                    "search": string(MAX_SEARCH_LEN, "Case-insensitive match on title, id, and tags"),
                    "includeClosed": { "type": "boolean", "default": true },
                    "sort": { "type": "string", "enum": sort_modes, "default": SortMode::default().as_str() },
                    "limit": { "type": "integer", "minimum": 1, "maximum": MAX_LIMIT }
                }),
            ),
        ),
        def(
            "beans_get",
            "Fetch one bean by id.",
            object(&["id"], json!({ "id": string(MAX_ID_LEN, "Bean id") })),
        ),
        def(
            "beans_create",
            "Create a bean.",
            object(
                &["title", "type"],
                json!({
                    "title": string(MAX_TITLE_LEN, "Title"),
                    "type": string(MAX_META_LEN, "milestone, epic, bug, feature, task, ..."),
                    "status": string(MAX_META_LEN, "Initial status"),
                    "priority": string(MAX_META_LEN, "critical, high, normal, low, deferred"),
                    "description": string(MAX_TEXT_LEN, "Markdown body"),
                    "parent": string(MAX_ID_LEN, "Parent bean id")
                }),
            ),
        ),
        def(
            "beans_update",
            "Update a bean. blocking and blockedBy add to the existing relationships.",
            object(
                &["id"],
                json!({
                    "id": string(MAX_ID_LEN, "Bean id"),
                    "status": string(MAX_META_LEN, "New status"),
                    "type": string(MAX_META_LEN, "New type"),
                    "priority": string(MAX_META_LEN, "New priority"),
                    "parent": string(MAX_ID_LEN, "New parent id; wins over clearParent"),
                    "clearParent": { "type": "boolean", "default": false },
                    "blocking": string_list(MAX_ID_LEN, "Ids this bean blocks (added)"),
                    "blockedBy": string_list(MAX_ID_LEN, "Ids blocking this bean (added)")
                }),
            ),
        ),
        def(
            "beans_reopen",
            "Move a completed or scrapped bean back to an open status.",
            object(
                &["id", "requiredCurrentStatus"],
                json!({
                    "id": string(MAX_ID_LEN, "Bean id"),
                    "requiredCurrentStatus": { "type": "string", "enum": crate::bean::CLOSED_STATUSES },
                    "targetStatus": string(MAX_META_LEN, "Open status to move to (default todo)")
                }),
            ),
        ),
        def(
            "beans_delete",
            "Delete a bean. Only draft or scrapped beans unless force is set.",
            object(
                &["id"],
                json!({
                    "id": string(MAX_ID_LEN, "Bean id"),
                    "force": { "type": "boolean", "default": false }
                }),
            ),
        ),
        def(
            "beans_config",
            "Return the workspace configuration file path and content.",
            object(&[], json!({})),
        ),
        def(
            "beans_schema",
            "Return the beans CLI's query schema.",
            object(&[], json!({})),
        ),
        def(
            "beans_read_log",
            "Return the most recent lines of the beans log.",
            object(
                &[],
                json!({
                    "maxLines": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": crate::backend::MAX_LOG_LINES,
                        "default": crate::backend::DEFAULT_LOG_LINES
                    }
                }),
            ),
        ),
        def(
            "beans_read_file",
            "Read a file under the beans data directory.",
            object(&["path"], json!({ "path": string(MAX_PATH_LEN, "Relative path") })),
        ),
        def(
            "beans_write_file",
            "Write a file under the beans data directory, replacing it if present.",
            object(
                &["path", "content"],
                json!({
                    "path": string(MAX_PATH_LEN, "Relative path"),
                    "content": string(MAX_TEXT_LEN, "File content")
                }),
            ),
        ),
        def(
            "beans_create_file",
            "Create a file under the beans data directory; fails if it exists unless overwrite is set.",
            object(
                &["path", "content"],
                json!({
                    "path": string(MAX_PATH_LEN, "Relative path"),
                    "content": string(MAX_TEXT_LEN, "File content"),
                    "overwrite": { "type": "boolean", "default": false }
                }),
            ),
        ),
        def(
            "beans_delete_file",
            "Delete a file under the beans data directory.",
            object(&["path"], json!({ "path": string(MAX_PATH_LEN, "Relative path") })),
        ),
    ]
}

/// Deserialize and validate arguments. A missing or null argument object means `{}`.
fn parse<T: DeserializeOwned + Validate>(args: Value) -> Result<T, OpError> {
    let args = if args.is_null() { json!({}) } else { args };
    let params: T =
        serde_json::from_value(args).map_err(|e| OpError::InvalidParams(e.to_string()))?;
    params.validate()?;
    Ok(params)
}

fn payload<T: Serialize>(value: T) -> Result<Value, OpError> {
    serde_json::to_value(value).map_err(|e| OpError::InvalidParams(e.to_string()))
}

async fn find_bean(backend: &dyn Backend, id: &str) -> Result<Bean, BeansError> {
    backend
        .list(&BeanFilter::default())
        .await?
        .into_iter()
        .find(|b| b.id == id)
        .ok_or_else(|| BeansError::NotFound(format!("bean {}", id)))
}

/// Run operation `name` with JSON `args` against `backend`.
pub async fn execute(backend: &dyn Backend, name: &str, args: Value) -> Result<Value, OpError> {
    log::debug!("op {} on {}", name, backend.workspace().display());
    match name {
        "beans_init" => {
            let p: InitParams = parse(args)?;
            payload(backend.init(p.prefix.as_deref()).await?)
        }
        "beans_list" => {
            let p: ListParams = parse(args)?;
            let query = p.into_query();
            let beans = query.apply(backend.list(&query.upstream_filter()).await?);
            payload(json!({ "count": beans.len(), "beans": beans }))
        }
        "beans_get" => {
            let p: IdParams = parse(args)?;
            payload(find_bean(backend, &p.id).await?)
        }
        "beans_create" => {
            let p: CreateParams = parse(args)?;
            payload(backend.create(&NewBean::from(p)).await?)
        }
        "beans_update" => {
            let p: UpdateParams = parse(args)?;
            let (id, update) = p.into_parts();
            payload(backend.update(&id, &update).await?)
        }
        "beans_reopen" => {
            let p: ReopenParams = parse(args)?;
            let current = find_bean(backend, &p.id).await?;
            if current.status != p.required_current_status {
                return Err(BeansError::Refused(format!(
                    "bean {} is {}, not {}",
                    p.id, current.status, p.required_current_status
                ))
                .into());
            }
            let update = BeanUpdate {
                status: Some(p.target().to_string()),
                ..Default::default()
            };
            payload(backend.update(&p.id, &update).await?)
        }
        "beans_delete" => {
            let p: DeleteParams = parse(args)?;
            let current = find_bean(backend, &p.id).await?;
            if !p.force && !current.is_deletable() {
                return Err(BeansError::Refused(format!(
                    "bean {} is {}; only {} beans can be deleted without force",
                    p.id,
                    current.status,
                    DELETABLE_STATUSES.join(" or ")
                ))
                .into());
            }
            payload(backend.delete(&p.id).await?)
        }
        "beans_config" => {
            parse::<NoParams>(args)?;
            payload(backend.open_config().await?)
        }
        "beans_schema" => {
            parse::<NoParams>(args)?;
            payload(json!({ "schema": backend.schema().await? }))
        }
        "beans_read_log" => {
            let p: ReadLogParams = parse(args)?;
            payload(backend.read_log(p.max_lines).await?)
        }
        "beans_read_file" => {
            let p: PathParams = parse(args)?;
            payload(backend.read_file(&p.path).await?)
        }
        "beans_write_file" => {
            let p: WriteFileParams = parse(args)?;
            payload(backend.write_file(&p.path, &p.content).await?)
        }
        "beans_create_file" => {
            let p: CreateFileParams = parse(args)?;
            payload(backend.create_file(&p.path, &p.content, p.overwrite).await?)
        }
        "beans_delete_file" => {
            let p: PathParams = parse(args)?;
            payload(backend.delete_file(&p.path).await?)
        }
        other => Err(OpError::UnknownOperation(other.to_string())),
    }
}
