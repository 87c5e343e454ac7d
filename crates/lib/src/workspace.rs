//! Workspace selection: an explicit root wins, then the first local root the client
//! declares, then the process's current directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One root declared by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// What the client said when asked for its roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootsOutcome {
    /// The client did not declare the roots capability.
    Unsupported,
    /// The client answered; the list may be empty.
    Roots(Vec<Root>),
}

/// Source of client-declared roots (the connected client, or a fixed list in tests).
#[async_trait]
pub trait RootsProvider: Send + Sync {
    async fn list_roots(&self) -> anyhow::Result<RootsOutcome>;
}

/// Local filesystem path named by a root: a `file://` URI or an absolute path.
pub fn root_to_path(uri: &str) -> Option<PathBuf> {
    let uri = uri.trim();
    if uri.starts_with("file:") {
        return url::Url::parse(uri).ok()?.to_file_path().ok();
    }
    let path = Path::new(uri);
    path.is_absolute().then(|| path.to_path_buf())
}

/// Ask the client for its roots and return the first local one.
///
/// `None` is not an error: it means the caller keeps its own default. Unsupported,
/// empty, non-local, and failed round trips are each logged differently.
pub async fn resolve_workspace(provider: &dyn RootsProvider) -> Option<PathBuf> {
    match provider.list_roots().await {
        Ok(RootsOutcome::Unsupported) => {
            log::debug!("client does not support roots; keeping default workspace");
            None
        }
        Ok(RootsOutcome::Roots(roots)) if roots.is_empty() => {
            log::info!("client declared no roots; keeping default workspace");
            None
        }
        Ok(RootsOutcome::Roots(roots)) => {
            let found = roots.iter().find_map(|r| root_to_path(&r.uri));
            match &found {
                Some(path) => log::info!("workspace discovered from client roots: {}", path.display()),
                None => log::info!("client declared {} root(s), none local", roots.len()),
            }
            found
        }
        Err(e) => {
            log::warn!("roots discovery failed: {:#}", e);
            None
        }
    }
}

/// Pick the workspace by priority: explicit, then discovered, then `cwd`.
pub fn select_workspace(
    explicit: Option<&Path>,
    discovered: Option<&Path>,
    cwd: &Path,
) -> PathBuf {
    explicit
        .or(discovered)
        .unwrap_or(cwd)
        .to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(anyhow::Result<RootsOutcome>);

    #[async_trait]
    impl RootsProvider for Fixed {
        async fn list_roots(&self) -> anyhow::Result<RootsOutcome> {
            match &self.0 {
                Ok(outcome) => Ok(outcome.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    fn roots(uris: &[&str]) -> Fixed {
        Fixed(Ok(RootsOutcome::Roots(
            uris.iter()
                .map(|u| Root {
                    uri: u.to_string(),
                    name: None,
                })
                .collect(),
        )))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn first_declared_root_wins() {
        let found = resolve_workspace(&roots(&["/a", "/b"])).await;
        assert_eq!(found, Some(PathBuf::from("/a")));
        let found = resolve_workspace(&roots(&["file:///srv/proj", "/b"])).await;
        assert_eq!(found, Some(PathBuf::from("/srv/proj")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_local_roots_are_skipped() {
        let found = resolve_workspace(&roots(&["https://example.com/repo", "relative/dir", "/c"])).await;
        assert_eq!(found, Some(PathBuf::from("/c")));
        assert_eq!(resolve_workspace(&roots(&["https://example.com"])).await, None);
    }

    #[tokio::test]
    async fn no_roots_unsupported_and_failure_resolve_to_none() {
        assert_eq!(resolve_workspace(&roots(&[])).await, None);
        assert_eq!(resolve_workspace(&Fixed(Ok(RootsOutcome::Unsupported))).await, None);
        assert_eq!(
            resolve_workspace(&Fixed(Err(anyhow::anyhow!("timed out")))).await,
            None
        );
    }

    #[test]
    fn selection_priority() {
        let cwd = Path::new("/cwd");
        assert_eq!(
            select_workspace(Some(Path::new("/x")), Some(Path::new("/d")), cwd),
            PathBuf::from("/x")
        );
        assert_eq!(select_workspace(None, Some(Path::new("/d")), cwd), PathBuf::from("/d"));
        assert_eq!(select_workspace(None, None, cwd), PathBuf::from("/cwd"));
    }

    #[cfg(unix)]
    #[test]
    fn file_uri_decodes_escapes() {
        assert_eq!(
            root_to_path("file:///home/u/my%20proj"),
            Some(PathBuf::from("/home/u/my proj"))
        );
        assert_eq!(root_to_path("file://remote-host/x"), None);
    }
}
