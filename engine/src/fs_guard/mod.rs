use sdk::errors::EngineError;
use std::path::{Component, Path, PathBuf};

/// FileSystemGuard keeps tool file access inside the workspace.
///
/// It maintains a deny list of sensitive names and checks containment both
/// lexically and after canonicalization, so neither `..` segments nor
/// symlinks can escape the workspace.
///
/// # Security Model
///
/// `resolve` runs four gates on a model-supplied path:
/// 1. Check deny list on the raw path
/// 2. Normalize `.` and `..` lexically and verify the result is inside the workspace
/// 3. Canonicalize the deepest existing ancestor (resolving symlinks)
/// 4. Re-check the deny list and workspace containment on the canonical form
#[derive(Debug)]
pub struct FileSystemGuard {
    workspace: PathBuf,
    deny_list: Vec<PathBuf>,
}

impl FileSystemGuard {
    /// Creates a new FileSystemGuard for the specified workspace directory.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::PathCanonicalization` if the workspace does not
    /// exist or is inaccessible.
    pub fn new(workspace: impl AsRef<Path>) -> Result<Self, EngineError> {
        let workspace = workspace.as_ref();
        // Canonicalize workspace to handle symlinks (e.g., /var -> /private/var on macOS)
        let workspace = workspace
            .canonicalize()
            .map_err(|e| EngineError::PathCanonicalization(workspace.to_path_buf(), e.to_string()))?;

        let deny_list = vec![
            PathBuf::from(".ssh"),
            PathBuf::from(".env"),
            PathBuf::from(".aws/credentials"),
            PathBuf::from(".config/gcloud"),
            PathBuf::from("id_rsa"),
            PathBuf::from("id_ed25519"),
            PathBuf::from(".gnupg"),
            PathBuf::from(".git"),
            PathBuf::from("credentials"),
            PathBuf::from("private_key"),
        ];

        Ok(Self {
            workspace,
            deny_list,
        })
    }

    /// Resolve a workspace-relative path supplied by the model.
    ///
    /// The target does not need to exist. On success the returned path is
    /// absolute and lies inside the workspace.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::PathDenied` if the path matches the deny list.
    /// Returns `EngineError::PathOutsideWorkspace` if the path escapes the workspace.
    /// Returns `EngineError::PathCanonicalization` if an existing ancestor cannot be resolved.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, EngineError> {
        let raw = Path::new(relative.trim());

        // Gate 1: deny list on the raw input
        self.check_denied(raw)?;

        // Gate 2: lexical containment
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.workspace.join(raw)
        };
        let normalized = normalize(&joined);
        if !normalized.starts_with(&self.workspace) || normalized == self.workspace {
            return Err(EngineError::PathOutsideWorkspace(normalized));
        }

        // Gate 3: canonicalize whatever part already exists
        let (existing, remainder) = split_existing(&normalized);
        let canonical_base = existing
            .canonicalize()
            .map_err(|e| EngineError::PathCanonicalization(existing.clone(), e.to_string()))?;
        let canonical = canonical_base.join(remainder);

        // Gate 4: deny list and containment after symlink resolution
        if self.is_denied(&canonical) {
            return Err(EngineError::PathDenied(canonical));
        }
        if !canonical.starts_with(&self.workspace) {
            return Err(EngineError::PathOutsideWorkspace(canonical));
        }

        Ok(canonical)
    }

    /// Validates an existing path.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::PathDenied` if the path matches the deny list.
    /// Returns `EngineError::PathCanonicalization` if canonicalization fails.
    /// Returns `EngineError::PathOutsideWorkspace` if the path is outside workspace.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, EngineError> {
        self.check_denied(path)?;

        let canonical = path
            .canonicalize()
            .map_err(|e| EngineError::PathCanonicalization(path.to_path_buf(), e.to_string()))?;

        if self.is_denied(&canonical) {
            return Err(EngineError::PathDenied(canonical));
        }

        if !canonical.starts_with(&self.workspace) {
            return Err(EngineError::PathOutsideWorkspace(canonical));
        }

        Ok(canonical)
    }

    /// Checks if any component of a path matches an entry in the deny list.
    ///
    /// This catches patterns like:
    /// - `/home/user/.ssh/id_rsa` (contains denied component)
    /// - `notes/.env` (ends with denied path)
    fn is_denied(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.workspace).unwrap_or(path);
        self.deny_list.iter().any(|denied| {
            relative.ends_with(denied)
                || relative.components().any(|c| {
                    c.as_os_str()
                        .to_str()
                        .is_some_and(|s| denied.as_os_str().to_str() == Some(s))
                })
        })
    }

    /// Check if a path is denied without requiring it to exist on disk.
    pub fn check_denied(&self, path: &Path) -> Result<(), EngineError> {
        if self.is_denied(path) {
            return Err(EngineError::PathDenied(path.to_path_buf()));
        }
        Ok(())
    }

    /// Returns a reference to the workspace path.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Workspace-relative form of `path` using `/` separators
    pub fn display_relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.workspace).unwrap_or(path);
        relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Resolve `.` and `..` without touching the file system
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Split a path into its deepest existing ancestor and the remaining suffix
fn split_existing(path: &Path) -> (PathBuf, PathBuf) {
    let mut existing = path.to_path_buf();
    let mut missing = Vec::new();

    while !existing.exists() {
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name);
                existing = parent.to_path_buf();
            }
            _ => break,
        }
    }

    let remainder = missing.iter().rev().collect::<PathBuf>();
    (existing, remainder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn guard(temp: &TempDir) -> FileSystemGuard {
        FileSystemGuard::new(temp.path()).unwrap()
    }

    #[test]
    fn test_new_fails_for_missing_workspace() {
        let temp = TempDir::new().unwrap();
        let result = FileSystemGuard::new(temp.path().join("missing"));
        assert!(matches!(result, Err(EngineError::PathCanonicalization(_, _))));
    }

    #[test]
    fn test_resolve_new_nested_file() {
        let temp = TempDir::new().unwrap();
        let guard = guard(&temp);

        let resolved = guard.resolve("ideas/widget/plan.md").unwrap();
        assert!(resolved.starts_with(guard.workspace()));
        assert_eq!(guard.display_relative(&resolved), "ideas/widget/plan.md");
    }

    #[test]
    fn test_resolve_rejects_parent_escape() {
        let temp = TempDir::new().unwrap();
        let guard = guard(&temp);

        let result = guard.resolve("../outside.md");
        assert!(matches!(result, Err(EngineError::PathOutsideWorkspace(_))));
    }

    #[test]
    fn test_resolve_allows_inner_parent_segments() {
        let temp = TempDir::new().unwrap();
        let guard = guard(&temp);

        let resolved = guard.resolve("ideas/../research/notes.md").unwrap();
        assert_eq!(guard.display_relative(&resolved), "research/notes.md");
    }

    #[test]
    fn test_resolve_rejects_workspace_root() {
        let temp = TempDir::new().unwrap();
        let guard = guard(&temp);

        assert!(guard.resolve(".").is_err());
        assert!(guard.resolve("").is_err());
    }

    #[test]
    fn test_resolve_rejects_denied_component() {
        let temp = TempDir::new().unwrap();
        let guard = guard(&temp);

        let result = guard.resolve("project/.env");
        assert!(matches!(result, Err(EngineError::PathDenied(_))));
    }

    #[test]
    fn test_resolve_rejects_absolute_outside() {
        let temp = TempDir::new().unwrap();
        let guard = guard(&temp);

        let result = guard.resolve("/etc/hosts");
        assert!(matches!(result, Err(EngineError::PathOutsideWorkspace(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_escape() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("workspace");
        let outside = temp.path().join("outside");
        fs::create_dir(&workspace).unwrap();
        fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, workspace.join("link")).unwrap();

        let guard = FileSystemGuard::new(&workspace).unwrap();
        let result = guard.resolve("link/file.md");
        assert!(matches!(result, Err(EngineError::PathOutsideWorkspace(_))));
    }

    #[test]
    fn test_validate_existing_path() {
        let temp = TempDir::new().unwrap();
        let guard = guard(&temp);

        let valid_path = temp.path().join("file.txt");
        fs::write(&valid_path, "test").unwrap();

        let result = guard.validate_path(&valid_path).unwrap();
        assert_eq!(result, valid_path.canonicalize().unwrap());
    }
}
