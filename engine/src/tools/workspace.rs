//! Workspace document access
//!
//! The tool executor only sees the `Workspace` trait. `FsWorkspace` backs it
//! with a directory on disk; every path goes through `FileSystemGuard` first.

use async_trait::async_trait;
use sdk::errors::EngineError;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::fs_guard::FileSystemGuard;

/// Text shown instead of a tree when the workspace holds nothing visible
pub const EMPTY_WORKSPACE: &str = "(empty workspace)";

/// Document storage the tools operate on
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Read a document. `Ok(None)` means it does not exist.
    async fn read(&self, path: &str) -> Result<Option<String>, EngineError>;

    /// Create or overwrite a document, returning its normalized relative path
    async fn write(&self, path: &str, content: &str) -> Result<String, EngineError>;

    /// Indented listing of every visible entry
    async fn render_tree(&self) -> Result<String, EngineError>;
}

/// Workspace stored in a local directory
#[derive(Debug)]
pub struct FsWorkspace {
    guard: FileSystemGuard,
    category_order: Vec<String>,
}

impl FsWorkspace {
    /// # Errors
    ///
    /// Fails if `root` does not exist or cannot be canonicalized.
    pub fn new(root: impl AsRef<Path>, category_order: Vec<String>) -> Result<Self, EngineError> {
        Ok(Self {
            guard: FileSystemGuard::new(root)?,
            category_order: category_order
                .into_iter()
                .map(|c| c.trim().to_lowercase())
                .collect(),
        })
    }

    pub fn root(&self) -> &Path {
        self.guard.workspace()
    }
}

#[async_trait]
impl Workspace for FsWorkspace {
    async fn read(&self, path: &str) -> Result<Option<String>, EngineError> {
        let target = self.guard.resolve(path)?;
        if !target.is_file() {
            debug!("No document at {}", target.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&target).await?;
        debug!("Read {} bytes from {}", content.len(), target.display());
        Ok(Some(content))
    }

    async fn write(&self, path: &str, content: &str) -> Result<String, EngineError> {
        let target = self.guard.resolve(path)?;
        if target.is_dir() {
            return Err(EngineError::Validation(format!(
                "{} is a directory",
                self.guard.display_relative(&target)
            )));
        }

        let parent = target
            .parent()
            .ok_or_else(|| EngineError::PathOutsideWorkspace(target.clone()))?;
        fs::create_dir_all(parent).await?;

        // Readers never observe a half-written document
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = parent.join(format!(
            ".{}.{}.tmp",
            file_name,
            uuid::Uuid::new_v4().simple()
        ));
        fs::write(&temp, content).await?;
        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        let relative = self.guard.display_relative(&target);
        info!("Wrote {} bytes to {}", content.len(), relative);
        Ok(relative)
    }

    async fn render_tree(&self) -> Result<String, EngineError> {
        let root = self.guard.workspace().to_path_buf();
        let category_order = self.category_order.clone();

        tokio::task::spawn_blocking(move || {
            let mut lines = Vec::new();
            render_dir(&root, 0, &category_order, &mut lines)?;
            if lines.is_empty() {
                Ok(EMPTY_WORKSPACE.to_string())
            } else {
                Ok(lines.join("\n"))
            }
        })
        .await
        .map_err(|e| EngineError::Io(std::io::Error::other(e)))?
    }
}

struct TreeEntry {
    name: String,
    path: PathBuf,
    is_dir: bool,
}

fn render_dir(
    dir: &Path,
    depth: usize,
    category_order: &[String],
    lines: &mut Vec<String>,
) -> Result<(), EngineError> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        // Symlinks are listed but never followed
        let file_type = entry.file_type()?;
        entries.push(TreeEntry {
            name,
            path: entry.path(),
            is_dir: file_type.is_dir(),
        });
    }

    let order = if depth == 0 { category_order } else { &[] };
    entries.sort_by(|a, b| compare_entries(a, b, order));

    let indent = "  ".repeat(depth);
    for entry in entries {
        if entry.is_dir {
            lines.push(format!("{}{}/", indent, entry.name));
            render_dir(&entry.path, depth + 1, category_order, lines)?;
        } else {
            lines.push(format!("{}{}", indent, entry.name));
        }
    }

    Ok(())
}

/// Directories before files; known categories first, in configured order
fn compare_entries(a: &TreeEntry, b: &TreeEntry, category_order: &[String]) -> Ordering {
    let rank = |entry: &TreeEntry| {
        if !entry.is_dir {
            return None;
        }
        let name = entry.name.to_lowercase();
        category_order.iter().position(|c| *c == name)
    };

    b.is_dir
        .cmp(&a.is_dir)
        .then_with(|| match (rank(a), rank(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace(temp: &TempDir) -> FsWorkspace {
        FsWorkspace::new(
            temp.path(),
            vec!["inbox".to_string(), "ideas".to_string()],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let ws = workspace(&temp);

        let path = ws.write("ideas/alpha/notes.md", "# Alpha").await.unwrap();
        assert_eq!(path, "ideas/alpha/notes.md");
        assert_eq!(
            ws.read("ideas/alpha/notes.md").await.unwrap().as_deref(),
            Some("# Alpha")
        );

        ws.write("./ideas/alpha/notes.md", "# Beta").await.unwrap();
        assert_eq!(
            ws.read("ideas/alpha/notes.md").await.unwrap().as_deref(),
            Some("# Beta")
        );
    }

    #[tokio::test]
    async fn test_read_missing() {
        let temp = TempDir::new().unwrap();
        let ws = workspace(&temp);

        assert!(ws.read("nothing/here.md").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_outside_workspace() {
        let temp = TempDir::new().unwrap();
        let ws = workspace(&temp);

        let result = ws.write("../escape.md", "x").await;
        assert!(matches!(result, Err(EngineError::PathOutsideWorkspace(_))));
        let result = ws.write(".env", "KEY=1").await;
        assert!(matches!(result, Err(EngineError::PathDenied(_))));
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let ws = workspace(&temp);

        ws.write("notes.md", "content").await.unwrap();
        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["notes.md"]);
    }

    #[tokio::test]
    async fn test_empty_tree() {
        let temp = TempDir::new().unwrap();
        let ws = workspace(&temp);

        assert_eq!(ws.render_tree().await.unwrap(), EMPTY_WORKSPACE);

        std::fs::write(temp.path().join(".hidden"), "x").unwrap();
        assert_eq!(ws.render_tree().await.unwrap(), EMPTY_WORKSPACE);
    }

    #[tokio::test]
    async fn test_tree_ordering() {
        let temp = TempDir::new().unwrap();
        let ws = workspace(&temp);

        ws.write("readme.md", "r").await.unwrap();
        ws.write("archive/old.md", "o").await.unwrap();
        ws.write("Ideas/zeta/b.md", "b").await.unwrap();
        ws.write("Ideas/zeta/a.md", "a").await.unwrap();
        ws.write("Ideas/alpha.md", "a").await.unwrap();
        ws.write("inbox/todo.md", "t").await.unwrap();

        let tree = ws.render_tree().await.unwrap();
        let expected = [
            "inbox/",
            "  todo.md",
            "Ideas/",
            "  zeta/",
            "    a.md",
            "    b.md",
            "  alpha.md",
            "archive/",
            "  old.md",
            "readme.md",
        ]
        .join("\n");
        assert_eq!(tree, expected);
    }
}
