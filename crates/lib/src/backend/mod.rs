//! Backend contract: every workspace operation, independent of how it is carried out.
//!
//! Variants: [`ProcessBackend`] (the beans CLI), [`MemoryBackend`] (in-process, for tests),
//! and [`MutableDelegate`] (forwards to whichever backend is currently installed).
//! Callers hold an `Arc<dyn Backend>` and never name a concrete variant.

mod delegate;
mod memory;
mod process;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bean::{Bean, BeanFilter, BeanUpdate, NewBean};
use crate::error::BeansError;

pub use delegate::MutableDelegate;
pub use memory::MemoryBackend;
pub use process::{ProcessBackend, ProcessSettings};

/// Default and ceiling for `read_log`'s line count.
pub const DEFAULT_LOG_LINES: usize = 200;
pub const MAX_LOG_LINES: usize = 5000;

/// Returned by `init`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitOutcome {
    pub initialized: bool,
    pub message: String,
}

/// Returned by `delete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deleted {
    pub id: String,
    pub deleted: bool,
}

/// Workspace configuration file, verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub path: PathBuf,
    pub content: String,
}

/// The last lines of a log file, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogTail {
    pub path: PathBuf,
    pub lines: Vec<String>,
    pub lines_returned: usize,
}

/// A sandboxed file and its content (read) or the content just written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub path: String,
    pub content: String,
}

/// Acknowledgment for file writes and deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAck {
    pub path: String,
    pub bytes: usize,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Root this backend operates against.
    fn workspace(&self) -> PathBuf;

    /// Idempotent workspace initialization.
    async fn init(&self, prefix: Option<&str>) -> Result<InitOutcome, BeansError>;

    /// Beans matching `filter`, in no particular order.
    async fn list(&self, filter: &BeanFilter) -> Result<Vec<Bean>, BeansError>;

    async fn create(&self, bean: &NewBean) -> Result<Bean, BeansError>;

    /// Apply `update` and return the post-update snapshot.
    async fn update(&self, id: &str, update: &BeanUpdate) -> Result<Bean, BeansError>;

    /// Delete unconditionally; status rules are the caller's job.
    async fn delete(&self, id: &str) -> Result<Deleted, BeansError>;

    async fn open_config(&self) -> Result<ConfigFile, BeansError>;

    /// The CLI's introspectable schema, as opaque text.
    async fn schema(&self) -> Result<String, BeansError>;

    /// Most recent `max_lines` lines of the log (default [`DEFAULT_LOG_LINES`]).
    async fn read_log(&self, max_lines: Option<usize>) -> Result<LogTail, BeansError>;

    async fn read_file(&self, path: &str) -> Result<FileContent, BeansError>;

    async fn write_file(&self, path: &str, content: &str) -> Result<FileAck, BeansError>;

    /// Without `overwrite`, fails if the target already exists.
    async fn create_file(
        &self,
        path: &str,
        content: &str,
        overwrite: bool,
    ) -> Result<FileAck, BeansError>;

    /// Fails if the target does not exist.
    async fn delete_file(&self, path: &str) -> Result<FileAck, BeansError>;
}

/// Fixed-size line buffer: once full, each push drops the oldest line.
pub(crate) struct LineRing {
    max: usize,
    lines: std::collections::VecDeque<String>,
}

impl LineRing {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            max,
            lines: std::collections::VecDeque::with_capacity(max.min(MAX_LOG_LINES)),
        }
    }

    pub(crate) fn push(&mut self, line: String) {
        if self.max == 0 {
            return;
        }
        if self.lines.len() == self.max {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub(crate) fn into_vec(self) -> Vec<String> {
        self.lines.into_iter().collect()
    }
}

/// Keep the most recent `max` lines, oldest first.
pub(crate) fn tail_lines<'a, I>(lines: I, max: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut ring = LineRing::new(max);
    for line in lines {
        ring.push(line.to_string());
    }
    ring.into_vec()
}

/// Clamp a requested line count to `1..=MAX_LOG_LINES`.
pub(crate) fn log_line_count(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_LOG_LINES)
        .clamp(1, MAX_LOG_LINES)
}

/// Display form of a sandbox-relative path, with leading separators removed.
pub(crate) fn display_relative(path: &str) -> String {
    path.trim_start_matches(['/', '\\']).to_string()
}

/// Whether a log path is permitted: inside the workspace or inside the log directory.
pub(crate) fn log_path_permitted(workspace: &Path, log_dir: &Path, log_path: &Path) -> bool {
    crate::guard::is_path_within_root(workspace, log_path)
        || crate::guard::is_path_within_root(log_dir, log_path)
}
