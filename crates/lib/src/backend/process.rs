//! Backend that fulfils every operation by invoking the beans CLI.
//!
//! Record operations are GraphQL documents sent as
//! `beans query --json <document> [--variables <json>]` from the workspace root.
//! File operations never touch the CLI: they are resolved under the workspace's
//! data directory and checked by [`crate::guard`] before any filesystem access.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{
    display_relative, log_line_count, log_path_permitted, Backend, ConfigFile, Deleted, FileAck,
    FileContent, InitOutcome, LineRing, LogTail,
};
use crate::bean::{Bean, BeanFilter, BeanUpdate, NewBean, ParentChange};
use crate::config::{resolve_log_dir, resolve_log_path, Config};
use crate::error::BeansError;
use crate::exec::{EnvPolicy, Runner};
use crate::guard;

/// Workspace configuration file written by `beans init`.
pub const WORKSPACE_CONFIG: &str = ".beans.yml";

/// Data directory used when `.beans.yml` does not name one.
pub const DEFAULT_DATA_DIR: &str = ".beans";

const BEAN_FIELDS: &str = "id slug path title body status type priority tags parentId \
                           blockingIds blockedByIds createdAt updatedAt etag";

fn list_document() -> String {
    format!("query ListBeans($filter: BeanFilter) {{ beans(filter: $filter) {{ {BEAN_FIELDS} }} }}")
}

fn create_document() -> String {
    format!(
        "mutation CreateBean($input: CreateBeanInput!) {{ createBean(input: $input) {{ {BEAN_FIELDS} }} }}"
    )
}

fn update_document() -> String {
    format!(
        "mutation UpdateBean($id: ID!, $input: UpdateBeanInput!) {{ updateBean(id: $id, input: $input) {{ {BEAN_FIELDS} }} }}"
    )
}

const DELETE_DOCUMENT: &str = "mutation DeleteBean($id: ID!) { deleteBean(id: $id) }";

/// Everything needed to build a [`ProcessBackend`] for one workspace.
#[derive(Debug, Clone)]
pub struct ProcessSettings {
    pub binary: PathBuf,
    pub workspace: PathBuf,
    pub env: EnvPolicy,
    pub timeout: Duration,
    pub max_output: usize,
    /// Log file read by `read_log`; relative paths resolve against the workspace.
    pub log_path: PathBuf,
    /// Second root a log file may live under.
    pub log_dir: PathBuf,
}

impl ProcessSettings {
    pub fn from_config(config: &Config, workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        Self {
            binary: config.beans.binary.clone(),
            env: config.beans.env_policy(),
            timeout: config.beans.timeout(),
            max_output: config.beans.max_output_bytes,
            log_path: resolve_log_path(config, &workspace),
            log_dir: resolve_log_dir(config),
            workspace,
        }
    }
}

pub struct ProcessBackend {
    runner: Runner,
    settings: ProcessSettings,
}

#[derive(Debug, Default, Deserialize)]
struct WorkspaceYaml {
    #[serde(default)]
    beans: Option<DataSection>,
}

#[derive(Debug, Default, Deserialize)]
struct DataSection {
    #[serde(default)]
    path: Option<String>,
}

impl ProcessBackend {
    pub fn new(settings: ProcessSettings) -> Self {
        let runner = Runner::new(
            settings.binary.clone(),
            settings.workspace.clone(),
            settings.env.clone(),
            settings.timeout,
            settings.max_output,
        );
        Self { runner, settings }
    }

    pub fn settings(&self) -> &ProcessSettings {
        &self.settings
    }

    fn config_path(&self) -> PathBuf {
        self.settings.workspace.join(WORKSPACE_CONFIG)
    }

    /// Data directory of the workspace, read from `.beans.yml` on every call so a
    /// later `init` is picked up. Falls back to `.beans` when the file is missing,
    /// unreadable, or names a directory outside the workspace.
    async fn sandbox_root(&self) -> PathBuf {
        let workspace = &self.settings.workspace;
        let fallback = workspace.join(DEFAULT_DATA_DIR);
        let text = match tokio::fs::read_to_string(self.config_path()).await {
            Ok(text) => text,
            Err(_) => return fallback,
        };
        let parsed: WorkspaceYaml = match serde_yaml::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("ignoring unreadable {}: {}", WORKSPACE_CONFIG, e);
                return fallback;
            }
        };
        let Some(dir) = parsed.beans.and_then(|b| b.path).filter(|p| !p.trim().is_empty()) else {
            return fallback;
        };
        match guard::resolve_within(workspace, &dir) {
            Ok(root) if !Path::new(&dir).is_absolute() => root,
            _ => {
                log::warn!("data directory {:?} is outside the workspace; using {}", dir, DEFAULT_DATA_DIR);
                fallback
            }
        }
    }

    async fn resolve(&self, path: &str) -> Result<PathBuf, BeansError> {
        guard::resolve_within(&self.sandbox_root().await, path)
    }

    /// Run one GraphQL document and decode the value under `key`.
    async fn query<T: DeserializeOwned>(
        &self,
        document: &str,
        variables: Option<Value>,
        key: &str,
    ) -> Result<T, BeansError> {
        let mut args = vec!["query".to_string(), "--json".to_string(), document.to_string()];
        if let Some(vars) = variables {
            args.push("--variables".to_string());
            args.push(vars.to_string());
        }
        let raw = self.runner.run(&args).await?;
        let reply: Value = serde_json::from_str(raw.trim())
            .map_err(|e| BeansError::parse(e.to_string(), &raw))?;
        serde_json::from_value(extract(reply, key))
            .map_err(|e| BeansError::parse(format!("unexpected {} reply: {}", key, e), &raw))
    }
}

/// The value under `key`, looking through a GraphQL `data` envelope; the whole reply
/// when the key is absent.
fn extract(reply: Value, key: &str) -> Value {
    let reply = match reply {
        Value::Object(mut map) if map.contains_key("data") && !map.contains_key(key) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    match reply {
        Value::Object(mut map) if map.contains_key(key) => map.remove(key).unwrap_or(Value::Null),
        other => other,
    }
}

fn update_input(update: &BeanUpdate) -> Value {
    let mut input = serde_json::Map::new();
    if let Some(s) = &update.status {
        input.insert("status".into(), json!(s));
    }
    if let Some(t) = &update.bean_type {
        input.insert("type".into(), json!(t));
    }
    if let Some(p) = &update.priority {
        input.insert("priority".into(), json!(p));
    }
    match update.parent_change() {
        ParentChange::Set(p) => {
            input.insert("parent".into(), json!(p));
        }
        // The CLI treats an empty parent as "remove the link".
        ParentChange::Clear => {
            input.insert("parent".into(), json!(""));
        }
        ParentChange::Keep => {}
    }
    if !update.blocking.is_empty() {
        input.insert("addBlocking".into(), json!(update.blocking));
    }
    if !update.blocked_by.is_empty() {
        input.insert("addBlockedBy".into(), json!(update.blocked_by));
    }
    Value::Object(input)
}

fn not_found_or_io(e: std::io::Error, what: impl Into<String>) -> BeansError {
    if e.kind() == ErrorKind::NotFound {
        BeansError::NotFound(what.into())
    } else {
        BeansError::Io(e)
    }
}

/// Write `content` to a temporary sibling of `target`, then move it into place.
/// With `overwrite` the move is a rename; without it a hard link, which fails if
/// the target already exists. The temporary file never outlives the call.
async fn write_atomic(target: &Path, content: &str, overwrite: bool) -> Result<(), BeansError> {
    let (Some(parent), Some(name)) = (target.parent(), target.file_name()) else {
        return Err(BeansError::Validation(format!("{} is not a file path", target.display())));
    };
    tokio::fs::create_dir_all(parent).await?;
    let tmp = parent.join(format!(
        ".{}.{}.tmp",
        name.to_string_lossy(),
        uuid::Uuid::new_v4()
    ));
    tokio::fs::write(&tmp, content).await?;
    let placed = if overwrite {
        tokio::fs::rename(&tmp, target).await
    } else {
        tokio::fs::hard_link(&tmp, target).await
    };
    if !overwrite || placed.is_err() {
        if let Err(e) = tokio::fs::remove_file(&tmp).await {
            log::warn!("could not remove {}: {}", tmp.display(), e);
        }
    }
    match placed {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(BeansError::Refused(format!(
            "{} already exists",
            target.display()
        ))),
        Err(e) => Err(BeansError::Io(e)),
    }
}

#[async_trait]
impl Backend for ProcessBackend {
    fn workspace(&self) -> PathBuf {
        self.settings.workspace.clone()
    }

    async fn init(&self, prefix: Option<&str>) -> Result<InitOutcome, BeansError> {
        let mut args = vec!["init".to_string()];
        if let Some(p) = prefix.filter(|p| !p.is_empty()) {
            args.push("--prefix".to_string());
            args.push(p.to_string());
        }
        let out = self.runner.run(&args).await?;
        let message = match out.trim() {
            "" => format!("initialized {}", self.settings.workspace.display()),
            text => text.to_string(),
        };
        Ok(InitOutcome {
            initialized: true,
            message,
        })
    }

    async fn list(&self, filter: &BeanFilter) -> Result<Vec<Bean>, BeansError> {
        let vars = (!filter.is_empty()).then(|| json!({ "filter": filter }));
        self.query(&list_document(), vars, "beans").await
    }

    async fn create(&self, bean: &NewBean) -> Result<Bean, BeansError> {
        if bean.title.trim().is_empty() || bean.bean_type.trim().is_empty() {
            return Err(BeansError::Validation("title and type are required".to_string()));
        }
        self.query(&create_document(), Some(json!({ "input": bean })), "createBean")
            .await
    }

    async fn update(&self, id: &str, update: &BeanUpdate) -> Result<Bean, BeansError> {
        let vars = json!({ "id": id, "input": update_input(update) });
        self.query(&update_document(), Some(vars), "updateBean").await
    }

    async fn delete(&self, id: &str) -> Result<Deleted, BeansError> {
        let deleted: bool = self
            .query(DELETE_DOCUMENT, Some(json!({ "id": id })), "deleteBean")
            .await?;
        Ok(Deleted {
            id: id.to_string(),
            deleted,
        })
    }

    async fn open_config(&self) -> Result<ConfigFile, BeansError> {
        let path = self.config_path();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| not_found_or_io(e, path.display().to_string()))?;
        Ok(ConfigFile { path, content })
    }

    async fn schema(&self) -> Result<String, BeansError> {
        self.runner
            .run(&["query".to_string(), "--schema".to_string()])
            .await
    }

    async fn read_log(&self, max_lines: Option<usize>) -> Result<LogTail, BeansError> {
        let max = log_line_count(max_lines);
        let path = self.settings.log_path.clone();
        if !log_path_permitted(&self.settings.workspace, &self.settings.log_dir, &path) {
            return Err(BeansError::Sandbox(path.display().to_string()));
        }
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| not_found_or_io(e, path.display().to_string()))?;

        let mut reader = BufReader::new(file);
        let mut ring = LineRing::new(max);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            ring.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        let lines = ring.into_vec();
        Ok(LogTail {
            path,
            lines_returned: lines.len(),
            lines,
        })
    }

    async fn read_file(&self, path: &str) -> Result<FileContent, BeansError> {
        let target = self.resolve(path).await?;
        let content = tokio::fs::read_to_string(&target)
            .await
            .map_err(|e| not_found_or_io(e, display_relative(path)))?;
        Ok(FileContent {
            path: display_relative(path),
            content,
        })
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<FileAck, BeansError> {
        let target = self.resolve(path).await?;
        write_atomic(&target, content, true).await?;
        log::debug!("wrote {} ({} bytes)", target.display(), content.len());
        Ok(FileAck {
            path: display_relative(path),
            bytes: content.len(),
        })
    }

    async fn create_file(
        &self,
        path: &str,
        content: &str,
        overwrite: bool,
    ) -> Result<FileAck, BeansError> {
        let target = self.resolve(path).await?;
        write_atomic(&target, content, overwrite).await?;
        Ok(FileAck {
            path: display_relative(path),
            bytes: content.len(),
        })
    }

    async fn delete_file(&self, path: &str) -> Result<FileAck, BeansError> {
        let target = self.resolve(path).await?;
        let meta = tokio::fs::metadata(&target)
            .await
            .map_err(|e| not_found_or_io(e, display_relative(path)))?;
        if !meta.is_file() {
            return Err(BeansError::Refused(format!("{} is not a file", display_relative(path))));
        }
        tokio::fs::remove_file(&target)
            .await
            .map_err(|e| not_found_or_io(e, display_relative(path)))?;
        Ok(FileAck {
            path: display_relative(path),
            bytes: meta.len() as usize,
        })
    }
}

impl std::fmt::Debug for ProcessBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessBackend")
            .field("binary", &self.settings.binary)
            .field("workspace", &self.settings.workspace)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_workspace() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("beans-mcp-process-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn settings(workspace: &Path, binary: PathBuf) -> ProcessSettings {
        ProcessSettings {
            binary,
            workspace: workspace.to_path_buf(),
            env: EnvPolicy::default(),
            timeout: Duration::from_secs(10),
            max_output: 64 * 1024,
            log_path: workspace.join(".beans").join("beans.log"),
            log_dir: workspace.join("logs"),
        }
    }

    /// Executable shell script standing in for the beans CLI.
    #[cfg(unix)]
    fn fake_beans(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-beans.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn extract_accepts_bare_keyed_and_enveloped_replies() {
        assert_eq!(extract(json!({"beans": [1]}), "beans"), json!([1]));
        assert_eq!(extract(json!({"data": {"beans": [2]}}), "beans"), json!([2]));
        assert_eq!(extract(json!([3]), "beans"), json!([3]));
    }

    #[test]
    fn update_input_uses_additive_fields_and_empty_parent_to_clear() {
        let input = update_input(&BeanUpdate {
            status: Some("todo".into()),
            clear_parent: true,
            blocking: vec!["r2".into()],
            ..Default::default()
        });
        assert_eq!(
            input,
            json!({"status": "todo", "parent": "", "addBlocking": ["r2"]})
        );
        assert_eq!(update_input(&BeanUpdate::default()), json!({}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn list_parses_beans_reply() {
        let ws = temp_workspace();
        let bin = fake_beans(
            &ws,
            r#"printf '%s' '{"beans":[{"id":"b-1","title":"One","status":"todo","type":"task"},{"id":"b-2","status":"weird"}]}'"#,
        );
        let backend = ProcessBackend::new(settings(&ws, bin));
        let beans = backend.list(&BeanFilter::default()).await.unwrap();
        assert_eq!(beans.len(), 2);
        assert_eq!(beans[0].title, "One");
        assert_eq!(beans[1].status, "weird");
        std::fs::remove_dir_all(&ws).ok();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unparsable_reply_carries_an_excerpt() {
        let ws = temp_workspace();
        let bin = fake_beans(&ws, "echo 'not json at all'");
        let backend = ProcessBackend::new(settings(&ws, bin));
        match backend.list(&BeanFilter::default()).await.unwrap_err() {
            BeansError::Parse { excerpt, .. } => assert_eq!(excerpt, "not json at all"),
            other => panic!("expected parse error, got {other:?}"),
        }
        std::fs::remove_dir_all(&ws).ok();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn child_sees_only_permitted_environment() {
        std::env::set_var("SECRET_PROBE_TOKEN", "leak");
        std::env::set_var("BEANS_PROBE", "ok");
        let ws = temp_workspace();
        let out = ws.join("env.txt");
        let bin = fake_beans(
            &ws,
            &format!("env > '{}'\nprintf '%s' '{{\"beans\":[]}}'", out.display()),
        );
        let backend = ProcessBackend::new(settings(&ws, bin));
        backend.list(&BeanFilter::default()).await.unwrap();
        let env = std::fs::read_to_string(&out).unwrap();
        assert!(env.contains("BEANS_PROBE=ok"));
        assert!(!env.contains("SECRET_PROBE_TOKEN"));
        std::fs::remove_dir_all(&ws).ok();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn update_sends_add_blocking_and_runs_in_workspace() {
        let ws = temp_workspace();
        let args = ws.join("args.txt");
        let cwd = ws.join("cwd.txt");
        let bin = fake_beans(
            &ws,
            &format!(
                "printf '%s\\n' \"$@\" > '{}'\npwd > '{}'\nprintf '%s' '{{\"updateBean\":{{\"id\":\"r1\",\"blockingIds\":[\"r2\"]}}}}'",
                args.display(),
                cwd.display()
            ),
        );
        let backend = ProcessBackend::new(settings(&ws, bin));
        let bean = backend
            .update(
                "r1",
                &BeanUpdate {
                    blocking: vec!["r2".into()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(bean.blocking_ids, vec!["r2"]);
        let sent = std::fs::read_to_string(&args).unwrap();
        assert!(sent.starts_with("query\n--json\n"));
        assert!(sent.contains("--variables"));
        assert!(sent.contains(r#""addBlocking":["r2"]"#));
        let ran_in = std::fs::read_to_string(&cwd).unwrap();
        assert_eq!(
            Path::new(ran_in.trim()).canonicalize().unwrap(),
            ws.canonicalize().unwrap()
        );
        std::fs::remove_dir_all(&ws).ok();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let ws = temp_workspace();
        let bin = fake_beans(&ws, "echo 'no such bean' >&2\nexit 3");
        let backend = ProcessBackend::new(settings(&ws, bin));
        match backend.delete("b-9").await.unwrap_err() {
            BeansError::Exit { stderr, .. } => assert_eq!(stderr, "no such bean"),
            other => panic!("expected exit error, got {other:?}"),
        }
        std::fs::remove_dir_all(&ws).ok();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_tool_times_out() {
        let ws = temp_workspace();
        let bin = fake_beans(&ws, "exec sleep 5");
        let mut s = settings(&ws, bin);
        s.timeout = Duration::from_millis(200);
        let backend = ProcessBackend::new(s);
        let err = backend.schema().await.unwrap_err();
        assert!(matches!(err, BeansError::Timeout(_)));
        std::fs::remove_dir_all(&ws).ok();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn oversized_output_fails() {
        let ws = temp_workspace();
        let bin = fake_beans(&ws, "head -c 5000 /dev/zero");
        let mut s = settings(&ws, bin);
        s.max_output = 1024;
        let backend = ProcessBackend::new(s);
        let err = backend.schema().await.unwrap_err();
        assert!(matches!(err, BeansError::OutputTooLarge(1024)));
        std::fs::remove_dir_all(&ws).ok();
    }

    #[tokio::test]
    async fn escaping_path_is_rejected_without_touching_disk() {
        let ws = temp_workspace();
        let backend = ProcessBackend::new(settings(&ws, PathBuf::from("beans")));
        let err = backend.read_file("../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, BeansError::Sandbox(_)));
        let err = backend.write_file("../escape/x.md", "x").await.unwrap_err();
        assert!(matches!(err, BeansError::Sandbox(_)));
        assert!(!ws.join("escape").exists());
        assert!(!ws.join(".beans").exists());
        std::fs::remove_dir_all(&ws).ok();
    }

    #[tokio::test]
    async fn data_directory_comes_from_workspace_config() {
        let ws = temp_workspace();
        std::fs::write(ws.join(WORKSPACE_CONFIG), "beans:\n  path: data\n  prefix: p\n").unwrap();
        let backend = ProcessBackend::new(settings(&ws, PathBuf::from("beans")));
        backend.write_file("/notes/a.md", "hello").await.unwrap();
        assert_eq!(std::fs::read_to_string(ws.join("data/notes/a.md")).unwrap(), "hello");

        std::fs::write(ws.join(WORKSPACE_CONFIG), "beans:\n  path: ../outside\n").unwrap();
        backend.write_file("b.md", "fallback").await.unwrap();
        assert!(ws.join(".beans/b.md").exists());
        assert!(!ws.parent().unwrap().join("outside").exists());

        let cfg = backend.open_config().await.unwrap();
        assert!(cfg.content.contains("../outside"));
        std::fs::remove_dir_all(&ws).ok();
    }

    #[tokio::test]
    async fn create_file_is_exclusive_and_leaves_no_temp_files() {
        let ws = temp_workspace();
        let backend = ProcessBackend::new(settings(&ws, PathBuf::from("beans")));
        let ack = backend.create_file("a.md", "one", false).await.unwrap();
        assert_eq!(ack.bytes, 3);
        let err = backend.create_file("a.md", "two", false).await.unwrap_err();
        assert!(matches!(err, BeansError::Refused(_)));
        assert_eq!(backend.read_file("a.md").await.unwrap().content, "one");
        backend.create_file("a.md", "three", true).await.unwrap();
        assert_eq!(backend.read_file("a.md").await.unwrap().content, "three");

        let names: Vec<String> = std::fs::read_dir(ws.join(".beans"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.md"]);
        std::fs::remove_dir_all(&ws).ok();
    }

    #[tokio::test]
    async fn failed_overwrite_leaves_target_and_no_temp_file() {
        let ws = temp_workspace();
        let blocker = ws.join(".beans").join("notes.md");
        std::fs::create_dir_all(&blocker).unwrap();
        std::fs::write(blocker.join("keep.txt"), "kept").unwrap();
        let backend = ProcessBackend::new(settings(&ws, PathBuf::from("beans")));

        let err = backend.write_file("notes.md", "replacement").await.unwrap_err();
        assert!(matches!(err, BeansError::Io(_)), "{err}");
        assert!(blocker.is_dir());
        assert_eq!(std::fs::read_to_string(blocker.join("keep.txt")).unwrap(), "kept");

        let names: Vec<String> = std::fs::read_dir(ws.join(".beans"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["notes.md"]);
        std::fs::remove_dir_all(&ws).ok();
    }

    #[tokio::test]
    async fn deleting_a_missing_file_fails() {
        let ws = temp_workspace();
        let backend = ProcessBackend::new(settings(&ws, PathBuf::from("beans")));
        let err = backend.delete_file("nope.md").await.unwrap_err();
        assert!(matches!(err, BeansError::NotFound(_)));
        backend.write_file("yes.md", "12345").await.unwrap();
        assert_eq!(backend.delete_file("yes.md").await.unwrap().bytes, 5);
        assert!(!ws.join(".beans/yes.md").exists());
        std::fs::remove_dir_all(&ws).ok();
    }

    #[tokio::test]
    async fn read_log_returns_the_last_lines_in_order() {
        let ws = temp_workspace();
        std::fs::create_dir_all(ws.join(".beans")).unwrap();
        std::fs::write(ws.join(".beans/beans.log"), "l1\nl2\nl3\nl4\nl5\n").unwrap();
        let backend = ProcessBackend::new(settings(&ws, PathBuf::from("beans")));
        let tail = backend.read_log(Some(2)).await.unwrap();
        assert_eq!(tail.lines, vec!["l4", "l5"]);
        assert_eq!(tail.lines_returned, 2);
        std::fs::remove_dir_all(&ws).ok();
    }

    #[tokio::test]
    async fn read_log_outside_both_roots_is_rejected() {
        let ws = temp_workspace();
        let mut s = settings(&ws, PathBuf::from("beans"));
        s.log_path = PathBuf::from("/etc/passwd");
        let backend = ProcessBackend::new(s);
        let err = backend.read_log(None).await.unwrap_err();
        assert!(matches!(err, BeansError::Sandbox(_)));

        let mut s = settings(&ws, PathBuf::from("beans"));
        s.log_path = ws.join("missing.log");
        let err = ProcessBackend::new(s).read_log(None).await.unwrap_err();
        assert!(matches!(err, BeansError::NotFound(_)));
        std::fs::remove_dir_all(&ws).ok();
    }
}
