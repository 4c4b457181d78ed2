use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{Error, Result, write_err};

/// Sibling path used while `path` is being written: `.<name>.<uuid>.<suffix>`.
pub(crate) fn sibling_tmp(path: &Path, suffix: &str) -> PathBuf {
    let parent = path.parent().unwrap_or(Path::new(""));
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    parent.join(format!(".{}.{}.{}", file_name, Uuid::new_v4().simple(), suffix))
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            fs::create_dir_all(parent).map_err(|source| Error::CreateDir {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Write `content` to a temporary sibling, then rename it over `path`.
/// Readers never observe a half-written file.
pub fn atomic_write(path: impl AsRef<Path>, content: &[u8]) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let tmp_path = sibling_tmp(path, "tmp");
    fs::write(&tmp_path, content).map_err(write_err(&tmp_path))?;

    if let Err(source) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(Error::Rename {
            from: tmp_path,
            to: path.to_path_buf(),
            source,
        });
    }
    tracing::trace!(path = %path.display(), bytes = content.len(), "atomic write");
    Ok(())
}

/// Returns whether a file was removed.
pub fn remove_file_if_exists(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(Error::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_parents() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data/nested/file.txt");
        atomic_write(&path, b"data")?;
        assert_eq!(fs::read(&path).unwrap(), b"data");
        Ok(())
    }

    #[test]
    fn test_atomic_write_leaves_no_tmp() -> Result<()> {
        let dir = tempdir().unwrap();
        atomic_write(dir.path().join("a.txt"), b"one")?;
        atomic_write(dir.path().join("a.txt"), b"two")?;
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt".to_string()]);
        Ok(())
    }

    #[test]
    fn test_remove_file_if_exists() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        fs::write(&path, "x").unwrap();
        assert!(remove_file_if_exists(&path)?);
        assert!(!remove_file_if_exists(&path)?);
        Ok(())
    }

    #[test]
    fn test_sibling_tmp_is_hidden_and_unique() {
        let a = sibling_tmp(Path::new("dir/file.txt"), "part");
        let b = sibling_tmp(Path::new("dir/file.txt"), "part");
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(Path::new("dir")));
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".file.txt."));
        assert!(name.ends_with(".part"));
    }
}
