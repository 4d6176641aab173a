//! 沙箱文件系统工具
//!
//! SafeFs 绑定 root_dir，所有路径经 resolve 校验必须在 root 下（禁止 ../ 逃逸）；
//! ListFilesTool / CopyFileTool 基于 SafeFs 提供目录列举与文件复制。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::tools::registry::{Completion, TypedTool};
use crate::tools::signature::{ReturnAnnotation, TypeAnnotation};

#[derive(Error, Debug)]
pub enum FsError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Path escapes workspace root: {0}")]
    PathEscape(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 解析已存在的路径，并检查其在沙箱内
    pub fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        let trimmed = path.trim_start_matches("./");
        let full = if trimmed.is_empty() || trimmed == "." {
            self.root_dir.clone()
        } else {
            self.root_dir.join(trimmed)
        };
        let canonical = full
            .canonicalize()
            .map_err(|_| FsError::NotFound(path.to_string()))?;
        self.contain(canonical, path)
    }

    /// 解析待创建的目标路径：父目录必须已存在且在沙箱内
    pub fn resolve_target(&self, path: &str) -> Result<PathBuf, FsError> {
        let full = self.root_dir.join(path.trim_start_matches("./"));
        let file_name = full
            .file_name()
            .ok_or_else(|| FsError::NotFound(path.to_string()))?
            .to_os_string();
        let parent = full
            .parent()
            .ok_or_else(|| FsError::NotFound(path.to_string()))?
            .canonicalize()
            .map_err(|_| FsError::NotFound(path.to_string()))?;
        let parent = self.contain(parent, path)?;
        Ok(parent.join(file_name))
    }

    fn contain(&self, canonical: PathBuf, original: &str) -> Result<PathBuf, FsError> {
        if canonical.starts_with(&self.root_dir) {
            Ok(canonical)
        } else {
            Err(FsError::PathEscape(original.to_string())) // 如 ../../etc/passwd
        }
    }

    /// 列出目录项（跳过隐藏文件），按名称排序；目录名带 `/` 后缀
    pub fn list_dir(&self, path: &str, include_dirs: bool) -> Result<Vec<String>, FsError> {
        let base = self.resolve(path)?;
        if !base.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&base)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir && include_dirs {
                entries.push(format!("{name}/"));
            } else if !is_dir {
                entries.push(name);
            }
        }
        entries.sort();
        Ok(entries)
    }

    pub fn copy_file(&self, from: &str, to: &str) -> Result<u64, FsError> {
        let source = self.resolve(from)?;
        let target = self.resolve_target(to)?;
        Ok(std::fs::copy(source, target)?)
    }
}

/// List all the files in a directory.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListFilesArgs {
    /// Directory location, relative to the workspace root or absolute inside it
    pub folder: String,
    /// Also list sub-directories (with a trailing slash)
    #[serde(default)]
    pub include_dirs: bool,
}

/// 目录列举工具：返回 `{"folder": .., "files": [..]}`
pub struct ListFilesTool {
    fs: SafeFs,
}

impl ListFilesTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl TypedTool for ListFilesTool {
    type Args = ListFilesArgs;

    fn tool_name(&self) -> &str {
        "list_files"
    }

    fn return_doc(&self) -> Option<&str> {
        Some("The folder and the names of the files it contains")
    }

    async fn run(&self, args: ListFilesArgs) -> Result<Value, String> {
        tracing::info!(folder = %args.folder, "list_files tool execute");
        let files = self
            .fs
            .list_dir(&args.folder, args.include_dirs)
            .map_err(|e| e.to_string())?;
        Ok(json!({ "folder": args.folder, "files": files }))
    }
}

/// Make a copy of a file.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CopyFileArgs {
    /// Path to the file to be copied
    pub file_path: String,
    /// Path of the new file; its directory must already exist
    pub new_file_path: String,
}

/// 文件复制工具：返回布尔值，`false` 视为未完成
pub struct CopyFileTool {
    fs: SafeFs,
}

impl CopyFileTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl TypedTool for CopyFileTool {
    type Args = CopyFileArgs;

    fn tool_name(&self) -> &str {
        "copy_file"
    }

    fn return_annotation(&self) -> ReturnAnnotation {
        ReturnAnnotation::Primitive(TypeAnnotation::Boolean)
    }

    fn return_doc(&self) -> Option<&str> {
        Some("True if the file is copied successfully, False otherwise")
    }

    fn completion_rule(&self) -> Completion {
        Completion::Flag
    }

    async fn run(&self, args: CopyFileArgs) -> Result<Value, String> {
        tracing::info!(from = %args.file_path, to = %args.new_file_path, "copy_file tool execute");
        match self.fs.copy_file(&args.file_path, &args.new_file_path) {
            Ok(_) => Ok(Value::Bool(true)),
            Err(e) => {
                tracing::warn!(error = %e, "copy_file failed");
                Ok(Value::Bool(false))
            }
        }
    }
}
