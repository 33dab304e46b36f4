//! Confined file access below the cache root.
//!
//! Every path handed to [`CacheRoot`] is relative to the root. Absolute
//! paths, `..` components and symlinks leading outside the root are
//! rejected with [`CacheError::PathEscape`].

pub mod cleanup;

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Path '{path}' escapes the cache root")]
    PathEscape { path: String },

    #[error("Cache I/O failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to clear '{path}': {reason}")]
    ClearRefused { path: PathBuf, reason: &'static str },

    #[error("Failed to walk cache directory: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Cache directory that all asset files are confined to.
#[derive(Debug, Clone)]
pub struct CacheRoot {
    root: PathBuf,
}

impl CacheRoot {
    /// Opens the cache root, creating the directory when missing.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(io_error(path))?;
        let root = path.canonicalize().map_err(io_error(path))?;
        Ok(Self { root })
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a root-relative path to an absolute one inside the root.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let relative = relative.as_ref();
        let escape = || CacheError::PathEscape {
            path: relative.display().to_string(),
        };

        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(escape())
                }
            }
        }

        // Symlinks below the root must not lead outside of it.
        let mut existing = resolved.as_path();
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }
        let real = existing.canonicalize().map_err(io_error(existing))?;
        if !real.starts_with(&self.root) {
            return Err(escape());
        }

        Ok(resolved)
    }

    /// Root-relative, `/` separated form of a path inside the root.
    pub fn relative(&self, absolute: &Path) -> Option<String> {
        let rel = absolute.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Whether a root-relative path lies within a root-relative prefix.
    pub fn is_within(relative: &str, prefix: &str) -> bool {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return !Path::new(relative)
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::RootDir));
        }
        Path::new(relative).starts_with(prefix)
            && !Path::new(relative)
                .components()
                .any(|c| matches!(c, Component::ParentDir))
    }

    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.resolve(relative).map(|p| p.exists()).unwrap_or(false)
    }

    /// Writes a file, creating parent directories.
    pub fn write(&self, relative: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        std::fs::write(&path, contents).map_err(io_error(&path))?;
        Ok(path)
    }

    pub fn read(&self, relative: impl AsRef<Path>) -> Result<Vec<u8>> {
        let path = self.resolve(relative)?;
        std::fs::read(&path).map_err(io_error(&path))
    }

    pub fn read_to_string(&self, relative: impl AsRef<Path>) -> Result<String> {
        let path = self.resolve(relative)?;
        std::fs::read_to_string(&path).map_err(io_error(&path))
    }

    pub fn remove_file(&self, relative: impl AsRef<Path>) -> Result<()> {
        let path = self.resolve(relative)?;
        std::fs::remove_file(&path).map_err(io_error(&path))
    }

    pub fn create_dir_all(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let path = self.resolve(relative)?;
        std::fs::create_dir_all(&path).map_err(io_error(&path))?;
        Ok(path)
    }

    /// Lists files below a root-relative directory as root-relative paths.
    ///
    /// The `.git` directory is never listed. A missing directory yields an
    /// empty list.
    pub fn list_files(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(prefix)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let walker = walkdir::WalkDir::new(&dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_file() {
                if let Some(rel) = self.relative(entry.path()) {
                    files.push(rel);
                }
            }
        }
        Ok(files)
    }
}
