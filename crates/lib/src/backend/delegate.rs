//! A backend that forwards every call to a swappable inner backend.
//!
//! The inner handle is read fresh at the start of each call and the lock is released
//! before awaiting, so a call already in flight when [`MutableDelegate::set_inner`] runs
//! finishes against the backend it started with. Swaps are not linearized with in-flight
//! calls; concurrent calls may complete against different backends.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{Backend, ConfigFile, Deleted, FileAck, FileContent, InitOutcome, LogTail};
use crate::bean::{Bean, BeanFilter, BeanUpdate, NewBean};
use crate::error::BeansError;

pub struct MutableDelegate {
    inner: RwLock<Arc<dyn Backend>>,
}

impl MutableDelegate {
    pub fn new(inner: Arc<dyn Backend>) -> Self {
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Handle to the backend currently installed.
    pub fn current(&self) -> Arc<dyn Backend> {
        // A poisoned lock still holds a valid Arc; keep serving with it.
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Install `next` for all subsequent calls; returns the backend it replaced.
    pub fn set_inner(&self, next: Arc<dyn Backend>) -> Arc<dyn Backend> {
        let to = next.workspace();
        let previous = {
            let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *guard, next)
        };
        log::info!(
            "backend swapped: {} -> {}",
            previous.workspace().display(),
            to.display()
        );
        previous
    }
}

#[async_trait]
impl Backend for MutableDelegate {
    fn workspace(&self) -> PathBuf {
        self.current().workspace()
    }

    async fn init(&self, prefix: Option<&str>) -> Result<InitOutcome, BeansError> {
        self.current().init(prefix).await
    }

    async fn list(&self, filter: &BeanFilter) -> Result<Vec<Bean>, BeansError> {
        self.current().list(filter).await
    }

    async fn create(&self, bean: &NewBean) -> Result<Bean, BeansError> {
        self.current().create(bean).await
    }

    async fn update(&self, id: &str, update: &BeanUpdate) -> Result<Bean, BeansError> {
        self.current().update(id, update).await
    }

    async fn delete(&self, id: &str) -> Result<Deleted, BeansError> {
        self.current().delete(id).await
    }

    async fn open_config(&self) -> Result<ConfigFile, BeansError> {
        self.current().open_config().await
    }

    async fn schema(&self) -> Result<String, BeansError> {
        self.current().schema().await
    }

    async fn read_log(&self, max_lines: Option<usize>) -> Result<LogTail, BeansError> {
        self.current().read_log(max_lines).await
    }

    async fn read_file(&self, path: &str) -> Result<FileContent, BeansError> {
        self.current().read_file(path).await
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<FileAck, BeansError> {
        self.current().write_file(path, content).await
    }

    async fn create_file(
        &self,
        path: &str,
        content: &str,
        overwrite: bool,
    ) -> Result<FileAck, BeansError> {
        self.current().create_file(path, content, overwrite).await
    }

    async fn delete_file(&self, path: &str) -> Result<FileAck, BeansError> {
        self.current().delete_file(path).await
    }
}
