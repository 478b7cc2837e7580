//! Filesystem helpers shared by the blob store, key store and settings.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{CacheError, CacheResult};

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    // Unique per writer: overlapping refreshes may write the same blob.
    path.with_file_name(format!(".{}.{:08x}.tmp", file_name, rand::random::<u32>()))
}

/// Write via temp file + rename so readers never see a partial file.
pub(crate) async fn write_atomic_impl(path: &Path, content: &[u8]) -> CacheResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| CacheError::storage(format!("failed to create directory: {}", e)))?;
    }

    let temp_path = temp_path(path);
    fs::write(&temp_path, content)
        .await
        .map_err(|e| CacheError::storage(format!("failed to write temp file: {}", e)))?;
    restrict_permissions_impl(&temp_path).await?;

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(CacheError::storage(format!(
            "failed to rename temp file: {}",
            e
        )));
    }

    Ok(())
}

/// Read a file; a missing file is `Ok(None)`.
pub(crate) async fn read_optional_impl(path: &Path) -> CacheResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheError::storage(format!(
            "failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Remove a file; a missing file is not an error.
pub(crate) async fn remove_if_exists_impl(path: &Path) -> CacheResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CacheError::storage(format!(
            "failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Owner read/write only.
#[cfg(unix)]
async fn restrict_permissions_impl(path: &Path) -> CacheResult<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| CacheError::storage(format!("failed to set permissions: {}", e)))
}

#[cfg(not(unix))]
async fn restrict_permissions_impl(_path: &Path) -> CacheResult<()> {
    Ok(())
}

/// File-name safe form of a logical name.
pub(crate) fn file_name_impl(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_creates_parents_and_replaces() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a").join("b").join("blob");

        write_atomic_impl(&path, b"one").await.unwrap();
        write_atomic_impl(&path, b"two").await.unwrap();

        assert_eq!(read_optional_impl(&path).await.unwrap(), Some(b"two".to_vec()));
        let leftovers = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".tmp")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_written_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blob");
        write_atomic_impl(&path, b"x").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing");

        assert_eq!(read_optional_impl(&path).await.unwrap(), None);
        assert!(!remove_if_exists_impl(&path).await.unwrap());
    }

    #[test]
    fn test_file_name_sanitized() {
        assert_eq!(file_name_impl("trustlist_key"), "trustlist_key");
        assert_eq!(file_name_impl("../etc/passwd"), ".._etc_passwd");
    }
}
