//! Removal of cache content ahead of an export.

use std::path::Path;

use super::{io_error, CacheError, CacheRoot, Result};

impl CacheRoot {
    /// Removes files below `prefix` for which `owned` returns true.
    ///
    /// Returns the number of removed files. Directories left empty are
    /// removed as well.
    pub fn remove_matching<F>(&self, prefix: &str, mut owned: F) -> Result<usize>
    where
        F: FnMut(&str) -> bool,
    {
        let mut removed = 0;
        for file in self.list_files(prefix)? {
            if owned(&file) {
                self.remove_file(&file)?;
                removed += 1;
            }
        }
        self.prune_empty_dirs(prefix)?;
        Ok(removed)
    }

    /// Removes empty directories below `prefix`, keeping `prefix` itself.
    pub fn prune_empty_dirs(&self, prefix: &str) -> Result<()> {
        let dir = self.resolve(prefix)?;
        if !dir.is_dir() {
            return Ok(());
        }

        let walker = walkdir::WalkDir::new(&dir)
            .min_depth(1)
            .contents_first(true)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_dir() {
                let path = entry.path();
                let empty = std::fs::read_dir(path)
                    .map_err(io_error(path))?
                    .next()
                    .is_none();
                if empty {
                    std::fs::remove_dir(path).map_err(io_error(path))?;
                }
            }
        }
        Ok(())
    }
}

/// Deletes the entire cache directory, including its git metadata.
///
/// The directory must be a cache working tree (or empty), and must neither
/// be the home directory nor contain the current directory. Returns false
/// when there was nothing to delete.
pub fn clear_all(cache_path: &Path) -> Result<bool> {
    if !cache_path.exists() {
        return Ok(false);
    }
    let cache = CacheRoot::new(cache_path)?;
    let cwd = std::env::current_dir().ok();
    let home = dirs::home_dir();
    check_clearable(cache.root(), cwd.as_deref(), home.as_deref())?;

    std::fs::remove_dir_all(cache.root()).map_err(io_error(cache.root()))?;
    Ok(true)
}

/// Checks that the canonical `root` is safe to delete recursively.
pub(crate) fn check_clearable(root: &Path, cwd: Option<&Path>, home: Option<&Path>) -> Result<()> {
    let refuse = |reason| CacheError::ClearRefused {
        path: root.to_path_buf(),
        reason,
    };

    if root.parent().is_none() {
        return Err(refuse("it is a filesystem root"));
    }
    if home.and_then(|h| h.canonicalize().ok()).as_deref() == Some(root) {
        return Err(refuse("it is the home directory"));
    }
    if cwd.is_some_and(|cwd| cwd.starts_with(root)) {
        return Err(refuse("it contains the current directory"));
    }

    let has_git = root.join(".git").is_dir();
    let empty = std::fs::read_dir(root)
        .map_err(io_error(root))?
        .next()
        .is_none();
    if !has_git && !empty {
        return Err(refuse("it is not a git working tree"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remove_matching_only_touches_owned_files() {
        let dir = TempDir::new().unwrap();
        let cache = CacheRoot::new(dir.path()).unwrap();
        cache.write("templates/Linux/a.yaml", "a").unwrap();
        cache.write("templates/Linux/keep.yaml", "k").unwrap();
        cache.write("templates/Apps/b.yaml", "b").unwrap();
        cache.write("images/icons/x.png", "x").unwrap();

        let removed = cache
            .remove_matching("templates", |f| !f.ends_with("keep.yaml"))
            .unwrap();

        assert_eq!(removed, 2);
        assert!(cache.exists("templates/Linux/keep.yaml"));
        assert!(!cache.exists("templates/Apps"));
        assert!(cache.exists("images/icons/x.png"));
    }

    #[test]
    fn test_clear_all() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache");
        let cache = CacheRoot::new(&path).unwrap();
        cache.write(".git/HEAD", "ref: refs/heads/main\n").unwrap();
        cache.write("templates/a.yaml", "a").unwrap();

        assert!(clear_all(&path).unwrap());
        assert!(!path.exists());
        assert!(!clear_all(&path).unwrap());
    }

    #[test]
    fn test_clear_all_refuses_directory_without_git() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        let err = clear_all(dir.path()).unwrap_err();
        assert!(matches!(err, CacheError::ClearRefused { .. }), "{}", err);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_clear_all_removes_empty_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache");
        std::fs::create_dir(&path).unwrap();
        assert!(clear_all(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_check_clearable_refuses_home_root_and_cwd() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir(root.join(".git")).unwrap();
        let inside = root.join("templates");
        std::fs::create_dir(&inside).unwrap();

        assert!(check_clearable(&root, None, None).is_ok());
        assert!(check_clearable(&root, Some(Path::new("/elsewhere")), None).is_ok());

        for (cwd, home) in [
            (Some(root.as_path()), None),
            (Some(inside.as_path()), None),
            (None, Some(root.as_path())),
        ] {
            assert!(matches!(
                check_clearable(&root, cwd, home),
                Err(CacheError::ClearRefused { .. })
            ));
        }
        assert!(matches!(
            check_clearable(Path::new("/"), None, None),
            Err(CacheError::ClearRefused { .. })
        ));
    }
}
