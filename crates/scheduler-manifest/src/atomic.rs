//! Write-then-rename helpers.
//!
//! The kubelet re-reads static pod manifests whenever they change, so a
//! reader must never observe a half-written file. Content is staged in a
//! dot-prefixed sibling (the kubelet skips hidden files in its manifest
//! directory) and renamed over the destination.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// File mode for manifests and manifest backups
pub const MANIFEST_MODE: u32 = 0o600;

/// Content written next to its destination, not yet renamed over it.
///
/// Dropping a `StagedFile` without committing removes the staged copy.
#[derive(Debug)]
pub struct StagedFile {
    staged: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Destination the staged content will replace
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Renames the staged content over the destination.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the rename; the staged copy is removed.
    pub fn commit(mut self) -> io::Result<()> {
        fs::rename(&self.staged, &self.target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.staged);
        }
    }
}

/// Writes `contents` into a hidden sibling of `path`, creating parent
/// directories. `path` itself is not touched until [`StagedFile::commit`].
///
/// `mode` is applied on Unix; `None` keeps the process umask default.
///
/// # Errors
///
/// Returns any I/O error from creating or writing the staged file.
pub fn stage(path: &Path, contents: &[u8], mode: Option<u32>) -> io::Result<StagedFile> {
    let staged = staged_path(path)?;
    let result = (|| {
        let mut file = File::create(&staged)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);
        apply_mode(&staged, mode)
    })();
    if let Err(e) = result {
        // a directory squatting on the staged name is not ours to remove
        if staged.is_file() {
            let _ = fs::remove_file(&staged);
        }
        return Err(e);
    }
    Ok(StagedFile {
        staged,
        target: path.to_path_buf(),
        committed: false,
    })
}

/// Writes `contents` to `path` atomically, creating parent directories.
///
/// # Errors
///
/// Returns any I/O error from staging or renaming.
pub fn write_atomic(path: &Path, contents: &[u8], mode: Option<u32>) -> io::Result<()> {
    stage(path, contents, mode)?.commit()
}

/// Copies `source` over `target` atomically, creating parent directories.
///
/// Permissions are carried over from `source`.
///
/// # Errors
///
/// Returns any I/O error from copying or renaming the staged file.
pub fn copy_atomic(source: &Path, target: &Path) -> io::Result<()> {
    let staged = staged_path(target)?;
    let result = fs::copy(source, &staged).and_then(|_| fs::rename(&staged, target));
    if result.is_err() {
        let _ = fs::remove_file(&staged);
    }
    result
}

/// Stages next to `path` so the rename never crosses filesystems.
fn staged_path(path: &Path) -> io::Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )
    })?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)?;
    }
    let mut staged_name = std::ffi::OsString::from(".");
    staged_name.push(file_name);
    staged_name.push(".tmp");
    Ok(parent.join(staged_name))
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode {
        Some(mode) => fs::set_permissions(path, fs::Permissions::from_mode(mode)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/manifest.yaml");

        write_atomic(&path, b"kind: Pod\n", Some(MANIFEST_MODE)).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"kind: Pod\n");
        assert!(!dir.path().join("nested/dir/.manifest.yaml.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_applies_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.yaml");

        write_atomic(&path, b"a", Some(MANIFEST_MODE)).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, MANIFEST_MODE);
    }

    #[test]
    fn test_uncommitted_stage_leaves_target_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.yaml");
        fs::write(&path, "live").unwrap();

        let staged = stage(&path, b"next", Some(MANIFEST_MODE)).unwrap();
        assert!(dir.path().join(".manifest.yaml.tmp").exists());
        assert_eq!(staged.target(), path.as_path());
        drop(staged);

        assert_eq!(fs::read_to_string(&path).unwrap(), "live");
        assert!(!dir.path().join(".manifest.yaml.tmp").exists());
    }

    #[test]
    fn test_stage_fails_when_staged_name_is_taken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.yaml");
        fs::write(&path, "live").unwrap();
        fs::create_dir(dir.path().join(".manifest.yaml.tmp")).unwrap();

        stage(&path, b"next", None).unwrap_err();
        write_atomic(&path, b"next", None).unwrap_err();

        assert_eq!(fs::read_to_string(&path).unwrap(), "live");
        assert!(dir.path().join(".manifest.yaml.tmp").is_dir());
    }

    #[test]
    fn test_copy_atomic_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.yaml");
        let target = dir.path().join("out/target.yaml");
        fs::write(&source, "new").unwrap();
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, "old").unwrap();

        copy_atomic(&source, &target).unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
    }

    #[test]
    fn test_copy_atomic_missing_source_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.yaml");

        let err = copy_atomic(&dir.path().join("absent"), &target).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!dir.path().join(".target.yaml.tmp").exists());
        assert!(!target.exists());
    }
}
