//! Read-only filesystem tools confined to the workspace directory.

use super::registry::{parse_arguments, Tool, ToolParameters};
use crate::error::{GhostError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

const MAX_READ_BYTES: usize = 64 * 1024;
const DEFAULT_MAX_ENTRIES: usize = 200;
const MAX_ENTRIES_LIMIT: usize = 2000;

/// Path guard shared by the filesystem tools.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    canonical_root: PathBuf,
}

impl Workspace {
    pub fn new(root: PathBuf) -> Self {
        let canonical_root = fs::canonicalize(&root).unwrap_or_else(|_| root.clone());
        Self {
            root,
            canonical_root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a model-supplied relative path, refusing anything that would
    /// land outside the workspace (absolute paths, `..`, symlink escapes).
    pub fn resolve(&self, tool: &str, path: &str) -> Result<PathBuf> {
        let denied = |reason: String| GhostError::tool_execution(tool, reason);

        if path.starts_with('/') || path.contains('\\') {
            return Err(denied(format!("absolute paths are not allowed: {path}")));
        }
        let relative = Path::new(path);
        if relative
            .components()
            .any(|component| matches!(component, Component::ParentDir | Component::RootDir))
        {
            return Err(denied(format!("path traversal is not allowed: {path}")));
        }

        let requested = self.root.join(relative);
        let guard = nearest_existing_ancestor(&requested)
            .ok_or_else(|| denied(format!("no existing parent for {path}")))?;
        let canonical = fs::canonicalize(guard)
            .map_err(|e| denied(format!("cannot resolve {path}: {e}")))?;
        if !canonical.starts_with(&self.canonical_root) {
            return Err(denied(format!("path escapes the workspace: {path}")));
        }
        Ok(requested)
    }

    fn resolve_optional(&self, tool: &str, path: Option<&str>) -> Result<PathBuf> {
        match path.map(str::trim).filter(|p| !p.is_empty() && *p != ".") {
            None => Ok(self.root.clone()),
            Some(path) => self.resolve(tool, path),
        }
    }

    fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .map(|relative| relative.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_string_lossy().into_owned())
    }

    pub fn read_file(&self, path: &str) -> Result<String> {
        let resolved = self.resolve(ReadFileTool::NAME, path)?;
        let bytes = fs::read(&resolved)
            .map_err(|e| GhostError::tool_execution(ReadFileTool::NAME, format!("{path}: {e}")))?;
        if bytes.len() <= MAX_READ_BYTES {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        let mut text = String::from_utf8_lossy(&bytes[..MAX_READ_BYTES]).into_owned();
        text.push_str(&format!(
            "\n[truncated: showing {MAX_READ_BYTES} of {} bytes]",
            bytes.len()
        ));
        Ok(text)
    }

    pub fn list_files(&self, path: Option<&str>, max_entries: usize) -> Result<String> {
        let tool = ListFilesTool::NAME;
        let root = self.resolve_optional(tool, path)?;
        let limit = max_entries.clamp(1, MAX_ENTRIES_LIMIT);

        if root.is_file() {
            return Ok(self.display(&root));
        }

        let mut children = fs::read_dir(&root)
            .and_then(|entries| entries.collect::<std::io::Result<Vec<_>>>())
            .map_err(|e| GhostError::tool_execution(tool, format!("{}: {e}", root.display())))?;
        children.sort_by_key(|entry| entry.path());

        let mut entries = Vec::new();
        for child in children {
            let name = child.file_name();
            if should_skip_entry(&root == self.root(), &name.to_string_lossy()) {
                continue;
            }
            let mut display = self.display(&child.path());
            if child.file_type().map(|kind| kind.is_dir()).unwrap_or(false) {
                display.push('/');
            }
            entries.push(display);
            if entries.len() >= limit {
                break;
            }
        }

        if entries.is_empty() {
            Ok("(no files found)".to_string())
        } else {
            Ok(entries.join("\n"))
        }
    }
}

fn nearest_existing_ancestor(path: &Path) -> Option<&Path> {
    let mut current = path;
    while !current.exists() {
        current = current.parent()?;
    }
    Some(current)
}

fn should_skip_entry(at_root: bool, name: &str) -> bool {
    if name.starts_with('.') {
        return true;
    }
    at_root
        && matches!(
            name,
            "target" | "node_modules" | "__pycache__" | "venv" | "build" | "dist"
        )
}

pub struct ReadFileTool {
    workspace: Arc<Workspace>,
}

impl ReadFileTool {
    pub const NAME: &'static str = "read_file";

    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
struct ReadFileArgs {
    path: String,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Read a text file from the current workspace. Paths are relative to the workspace root."
    }

    fn parameters(&self) -> ToolParameters {
        ToolParameters::new().required("path", "string", "Workspace-relative file path")
    }

    async fn execute(&self, arguments: Value) -> Result<String> {
        let args: ReadFileArgs = parse_arguments(Self::NAME, arguments)?;
        let workspace = Arc::clone(&self.workspace);
        tokio::task::spawn_blocking(move || workspace.read_file(&args.path))
            .await
            .map_err(|e| GhostError::tool_execution(Self::NAME, e))?
    }
}

pub struct ListFilesTool {
    workspace: Arc<Workspace>,
}

impl ListFilesTool {
    pub const NAME: &'static str = "list_files";

    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
struct ListFilesArgs {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    max_entries: Option<usize>,
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "List the entries of a workspace directory. Directories end with '/'."
    }

    fn parameters(&self) -> ToolParameters {
        ToolParameters::new()
            .optional(
                "path",
                "string",
                "Workspace-relative directory (defaults to the root)",
            )
            .optional("max_entries", "integer", "Maximum entries to return")
    }

    async fn execute(&self, arguments: Value) -> Result<String> {
        let args: ListFilesArgs = parse_arguments(Self::NAME, arguments)?;
        let workspace = Arc::clone(&self.workspace);
        tokio::task::spawn_blocking(move || {
            workspace.list_files(
                args.path.as_deref(),
                args.max_entries.unwrap_or(DEFAULT_MAX_ENTRIES),
            )
        })
        .await
        .map_err(|e| GhostError::tool_execution(Self::NAME, e))?
    }
}
