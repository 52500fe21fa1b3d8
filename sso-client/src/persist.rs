//! Locked, atomic JSON file persistence shared by the config and the file-backed session store.

use fs2::FileExt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Create the parent directory of `path` (0700 on Unix).
pub(crate) fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
        }
    }
    Ok(())
}

fn lock_path(path: &Path) -> PathBuf {
    // Sibling lock file, so the data file itself can be replaced by rename.
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

/// Run `f` while holding an exclusive lock on `path`'s sibling lock file.
pub(crate) fn with_exclusive_lock<T>(
    path: &Path,
    f: impl FnOnce() -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    ensure_parent(path)?;
    let lock_file = fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path(path))?;

    lock_file.lock_exclusive()?;
    let out = f();
    let _ = lock_file.unlock();
    out
}

/// Write `contents` to a temp file next to `path` (0600 on Unix), then rename over `path`.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    ensure_parent(path)?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600));
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read `path` to a string, `None` if it does not exist.
pub(crate) fn read_optional(path: &Path) -> anyhow::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");
        assert_eq!(read_optional(&path).unwrap(), None);

        with_exclusive_lock(&path, || write_atomic(&path, b"{\"a\":1}")).unwrap();
        assert_eq!(read_optional(&path).unwrap().as_deref(), Some("{\"a\":1}"));
        assert!(!dir.path().join("nested").join("data.json.tmp").exists());
        assert!(dir.path().join("nested").join("data.json.lock").exists());
    }
}
