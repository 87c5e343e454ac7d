//! In-process backend. Keeps beans, files, and log lines in memory; used by tests and
//! for exercising the gateway without the beans CLI installed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    display_relative, log_line_count, tail_lines, Backend, ConfigFile, Deleted, FileAck,
    FileContent, InitOutcome, LogTail,
};
use crate::bean::{Bean, BeanFilter, BeanUpdate, NewBean, ParentChange, STATUS_TODO};
use crate::error::BeansError;
use crate::guard;

#[derive(Default)]
struct State {
    initialized: bool,
    next_id: u64,
    beans: Vec<Bean>,
    files: BTreeMap<PathBuf, String>,
    log: Vec<String>,
}

pub struct MemoryBackend {
    workspace: PathBuf,
    prefix: String,
    latency: Option<Duration>,
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            prefix: "bean".to_string(),
            latency: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Delay every async call, to make in-flight behavior observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seed beans as if the CLI already had them.
    pub fn with_beans(self, beans: Vec<Bean>) -> Self {
        self.lock().beans = beans;
        self
    }

    /// Seed the log read by `read_log`.
    pub fn with_log(self, text: &str) -> Self {
        self.lock().log = text.lines().map(str::to_string).collect();
        self
    }

    fn sandbox_root(&self) -> PathBuf {
        self.workspace.join(".beans")
    }

    fn config_path(&self) -> PathBuf {
        self.workspace.join(".beans.yml")
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn pause(&self) {
        if let Some(d) = self.latency {
            tokio::time::sleep(d).await;
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BeansError> {
        guard::resolve_within(&self.sandbox_root(), path)
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn add_missing(target: &mut Vec<String>, additions: &[String]) {
    for id in additions {
        if !target.contains(id) {
            target.push(id.clone());
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn workspace(&self) -> PathBuf {
        self.workspace.clone()
    }

    async fn init(&self, prefix: Option<&str>) -> Result<InitOutcome, BeansError> {
        self.pause().await;
        let mut state = self.lock();
        let message = if state.initialized {
            "workspace already initialized".to_string()
        } else {
            state.initialized = true;
            let prefix = prefix.unwrap_or(&self.prefix);
            state.files.insert(
                self.config_path(),
                format!("beans:\n  path: .beans\n  prefix: {}\n", prefix),
            );
            format!("initialized workspace at {}", self.workspace.display())
        };
        Ok(InitOutcome {
            initialized: true,
            message,
        })
    }

    async fn list(&self, filter: &BeanFilter) -> Result<Vec<Bean>, BeansError> {
        self.pause().await;
        let state = self.lock();
        Ok(state
            .beans
            .iter()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect())
    }

    async fn create(&self, new: &NewBean) -> Result<Bean, BeansError> {
        self.pause().await;
        if new.title.trim().is_empty() || new.bean_type.trim().is_empty() {
            return Err(BeansError::Validation("title and type are required".to_string()));
        }
        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("{}-{}", self.prefix, state.next_id);
        let stamp = now();
        let bean = Bean {
            slug: new.title.to_lowercase().replace(' ', "-"),
            path: format!("{}.md", id),
            title: new.title.clone(),
            body: new.description.clone().unwrap_or_default(),
            status: new.status.clone().unwrap_or_else(|| STATUS_TODO.to_string()),
            bean_type: new.bean_type.clone(),
            priority: new.priority.clone(),
            parent_id: new.parent.clone(),
            created_at: Some(stamp.clone()),
            updated_at: Some(stamp),
            id,
            ..Default::default()
        };
        state.beans.push(bean.clone());
        Ok(bean)
    }

    async fn update(&self, id: &str, update: &BeanUpdate) -> Result<Bean, BeansError> {
        self.pause().await;
        let mut state = self.lock();
        let bean = state
            .beans
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| BeansError::NotFound(format!("bean {}", id)))?;
        if let Some(s) = &update.status {
            bean.status = s.clone();
        }
        if let Some(t) = &update.bean_type {
            bean.bean_type = t.clone();
        }
        if let Some(p) = &update.priority {
            bean.priority = Some(p.clone());
        }
        match update.parent_change() {
            ParentChange::Set(p) => bean.parent_id = Some(p.to_string()),
            ParentChange::Clear => bean.parent_id = None,
            ParentChange::Keep => {}
        }
        add_missing(&mut bean.blocking_ids, &update.blocking);
        add_missing(&mut bean.blocked_by_ids, &update.blocked_by);
        bean.updated_at = Some(now());
        Ok(bean.clone())
    }

    async fn delete(&self, id: &str) -> Result<Deleted, BeansError> {
        self.pause().await;
        let mut state = self.lock();
        let before = state.beans.len();
        state.beans.retain(|b| b.id != id);
        if state.beans.len() == before {
            return Err(BeansError::NotFound(format!("bean {}", id)));
        }
        Ok(Deleted {
            id: id.to_string(),
            deleted: true,
        })
    }

    async fn open_config(&self) -> Result<ConfigFile, BeansError> {
        self.pause().await;
        let path = self.config_path();
        let state = self.lock();
        let content = state
            .files
            .get(&path)
            .cloned()
            .ok_or_else(|| BeansError::NotFound(path.display().to_string()))?;
        Ok(ConfigFile { path, content })
    }

    async fn schema(&self) -> Result<String, BeansError> {
        self.pause().await;
        Ok("type Query { beans(filter: BeanFilter): [Bean!]! }".to_string())
    }

    async fn read_log(&self, max_lines: Option<usize>) -> Result<LogTail, BeansError> {
        self.pause().await;
        let max = log_line_count(max_lines);
        let state = self.lock();
        let lines = tail_lines(state.log.iter().map(String::as_str), max);
        Ok(LogTail {
            path: self.sandbox_root().join("beans.log"),
            lines_returned: lines.len(),
            lines,
        })
    }

    async fn read_file(&self, path: &str) -> Result<FileContent, BeansError> {
        let target = self.resolve(path)?;
        self.pause().await;
        let state = self.lock();
        let content = state
            .files
            .get(&target)
            .cloned()
            .ok_or_else(|| BeansError::NotFound(display_relative(path)))?;
        Ok(FileContent {
            path: display_relative(path),
            content,
        })
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<FileAck, BeansError> {
        let target = self.resolve(path)?;
        self.pause().await;
        self.lock().files.insert(target, content.to_string());
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
        let target = self.resolve(path)?;
        self.pause().await;
        let mut state = self.lock();
        if !overwrite && state.files.contains_key(&target) {
            return Err(BeansError::Refused(format!(
                "{} already exists",
                display_relative(path)
            )));
        }
        state.files.insert(target, content.to_string());
        Ok(FileAck {
            path: display_relative(path),
            bytes: content.len(),
        })
    }

    async fn delete_file(&self, path: &str) -> Result<FileAck, BeansError> {
        let target = self.resolve(path)?;
        self.pause().await;
        let removed = self
            .lock()
            .files
            .remove(&target)
            .ok_or_else(|| BeansError::NotFound(display_relative(path)))?;
        Ok(FileAck {
            path: display_relative(path),
            bytes: removed.len(),
        })
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("workspace", &self.workspace)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(title: &str) -> NewBean {
        NewBean {
            title: title.to_string(),
            bean_type: "task".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn blocking_updates_are_additive() {
        let backend = MemoryBackend::new("/ws");
        let r1 = backend.create(&task("one")).await.unwrap();
        let first = backend
            .update(
                &r1.id,
                &BeanUpdate {
                    blocking: vec!["r2".into()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(first.blocking_ids, vec!["r2"]);
        let second = backend
            .update(
                &r1.id,
                &BeanUpdate {
                    blocking: vec!["r3".into(), "r2".into()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(second.blocking_ids, vec!["r2", "r3"]);
    }

    #[tokio::test]
    async fn create_file_is_exclusive_unless_overwrite() {
        let backend = MemoryBackend::new("/ws");
        backend.create_file("a.md", "one", false).await.unwrap();
        let err = backend.create_file("a.md", "two", false).await.unwrap_err();
        assert!(matches!(err, BeansError::Refused(_)));
        assert_eq!(backend.read_file("a.md").await.unwrap().content, "one");
        backend.create_file("/a.md", "three", true).await.unwrap();
        assert_eq!(backend.read_file("a.md").await.unwrap().content, "three");
    }

    #[tokio::test]
    async fn delete_missing_file_fails() {
        let backend = MemoryBackend::new("/ws");
        let err = backend.delete_file("nope.md").await.unwrap_err();
        assert!(matches!(err, BeansError::NotFound(_)));
    }

    #[tokio::test]
    async fn init_is_idempotent_and_writes_config() {
        let backend = MemoryBackend::new("/ws");
        assert!(backend.open_config().await.is_err());
        let first = backend.init(Some("proj")).await.unwrap();
        let second = backend.init(None).await.unwrap();
        assert!(first.initialized && second.initialized);
        assert!(second.message.contains("already"));
        let cfg = backend.open_config().await.unwrap();
        assert!(cfg.content.contains("prefix: proj"));
    }
}
