//! Path containment checks. Purely lexical: nothing here touches the filesystem,
//! so a rejected path is rejected before any I/O happens.

use std::path::{Component, Path, PathBuf};

use crate::error::BeansError;

/// Resolve `.` and `..` segments without consulting the filesystem.
/// `..` never climbs above the root (or prefix) of an absolute path.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// True if `candidate` lies strictly inside `root` after normalization.
/// A path is not within itself.
pub fn is_path_within_root(root: &Path, candidate: &Path) -> bool {
    let root = normalize(root);
    let candidate = normalize(candidate);
    candidate != root && candidate.starts_with(&root)
}

/// Join a client-supplied relative path onto `root` and verify it stays inside.
///
/// Leading separators are stripped so `/notes.md` means `<root>/notes.md`.
/// Containment is lexical, so a symlink under `root` that points elsewhere is not caught.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, BeansError> {
    let trimmed = relative.trim_start_matches(['/', '\\']);
    if trimmed.is_empty() {
        return Err(BeansError::Validation("path must not be empty".to_string()));
    }
    if trimmed.contains('\0') {
        return Err(BeansError::Validation("path must not contain NUL".to_string()));
    }
    let joined = normalize(&root.join(trimmed));
    if !is_path_within_root(root, &joined) {
        return Err(BeansError::Sandbox(format!(
            "{} resolves outside {}",
            relative,
            root.display()
        )));
    }
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_not_within_itself() {
        assert!(!is_path_within_root(Path::new("/ws"), Path::new("/ws")));
        assert!(!is_path_within_root(Path::new("/ws"), Path::new("/ws/")));
        assert!(!is_path_within_root(Path::new("/ws"), Path::new("/ws/.")));
    }

    #[test]
    fn child_is_within_root() {
        assert!(is_path_within_root(Path::new("/ws"), Path::new("/ws/x")));
        assert!(is_path_within_root(Path::new("/ws"), Path::new("/ws/a/../b")));
    }

    #[test]
    fn dot_dot_escape_is_rejected() {
        assert!(!is_path_within_root(Path::new("/ws"), Path::new("/ws/../etc")));
        assert!(!is_path_within_root(Path::new("/ws"), Path::new("/ws/a/../../etc/passwd")));
        assert!(!is_path_within_root(Path::new("/ws"), Path::new("/wsx/file")));
    }

    #[test]
    fn normalize_does_not_climb_above_root() {
        assert_eq!(normalize(Path::new("/../../etc")), PathBuf::from("/etc"));
        assert_eq!(normalize(Path::new("a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(normalize(Path::new("../a")), PathBuf::from("../a"));
    }

    #[test]
    fn resolve_within_strips_leading_separators() {
        let p = resolve_within(Path::new("/ws/.beans"), "/notes/a.md").unwrap();
        assert_eq!(p, PathBuf::from("/ws/.beans/notes/a.md"));
    }

    #[test]
    fn resolve_within_rejects_escapes() {
        let err = resolve_within(Path::new("/ws/.beans"), "../../etc/passwd").unwrap_err();
        assert!(matches!(err, BeansError::Sandbox(_)));
        let err = resolve_within(Path::new("/ws/.beans"), "a/../..").unwrap_err();
        assert!(matches!(err, BeansError::Sandbox(_)));
        let err = resolve_within(Path::new("/ws/.beans"), "///").unwrap_err();
        assert!(matches!(err, BeansError::Validation(_)));
    }

    #[cfg(unix)]
    #[test]
    fn resolve_within_is_lexical_and_ignores_symlinks() {
        let root = std::env::temp_dir().join(format!("beans-mcp-guard-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink("/etc", root.join("out")).unwrap();
        let p = resolve_within(&root, "out/passwd").unwrap();
        assert_eq!(p, root.join("out").join("passwd"));
        std::fs::remove_dir_all(&root).ok();
    }
}
