use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

const ARTIFACT_PREFIX: &str = "labelbridge-";

/// Scratch file owned by exactly one print request.
/// 僅屬於單一列印請求的暫存檔案。
///
/// The file is removed when the guard is released or dropped, on every exit
/// path of the owning call. A failed removal is logged and otherwise ignored.
/// 守衛物件釋放或被丟棄時即刪除檔案；刪除失敗僅記錄，不會往外傳遞。
#[derive(Debug)]
pub struct TemporaryArtifact {
    path: PathBuf,
    released: bool,
}

impl TemporaryArtifact {
    /// Reserves a uniquely named empty file in the platform temp directory.
    pub fn create(suffix: &str) -> io::Result<Self> {
        Self::create_in(std::env::temp_dir(), suffix)
    }

    /// Reserves a uniquely named empty file inside `dir`.
    pub fn create_in(dir: impl AsRef<Path>, suffix: &str) -> io::Result<Self> {
        let reserved = tempfile::Builder::new()
            .prefix(ARTIFACT_PREFIX)
            .suffix(suffix)
            .tempfile_in(dir)?;
        // The guard takes over deletion; tempfile must not remove it on its own.
        let path = reserved
            .into_temp_path()
            .keep()
            .map_err(|err| err.error)?;
        debug!(path = %path.display(), "reserved temporary artifact");
        Ok(Self {
            path,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file now instead of at drop.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed temporary artifact"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove temporary artifact"
            ),
        }
    }
}

impl Drop for TemporaryArtifact {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn drop_removes_file() {
        let dir = tempdir().expect("tempdir");
        let artifact = TemporaryArtifact::create_in(dir.path(), ".png").expect("create");
        let path = artifact.path().to_path_buf();
        assert!(path.exists());
        assert!(path.extension().is_some_and(|ext| ext == "png"));

        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn release_tolerates_missing_file() {
        let dir = tempdir().expect("tempdir");
        let artifact = TemporaryArtifact::create_in(dir.path(), ".png").expect("create");
        fs::remove_file(artifact.path()).expect("remove early");
        artifact.release();
    }

    #[test]
    fn names_are_unique() {
        let dir = tempdir().expect("tempdir");
        let first = TemporaryArtifact::create_in(dir.path(), ".png").expect("first");
        let second = TemporaryArtifact::create_in(dir.path(), ".png").expect("second");
        assert_ne!(first.path(), second.path());
    }
}
