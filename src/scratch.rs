//! Intermediate storage area lifecycle.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log;

/// Scratch directory holding the chunk stores of a single sort operation.
///
/// A caller-supplied location is created idempotently and removed recursively
/// when the operation finishes. Without a supplied location a unique directory
/// inside the OS temporary directory is used. Removal runs on every exit path:
/// explicitly via [`ScratchDir::close`] so the caller can observe a removal
/// failure, or on drop otherwise, where a failure is only logged.
pub struct ScratchDir {
    inner: Inner,
}

enum Inner {
    Temp(tempfile::TempDir),
    External(ExternalDir),
}

struct ExternalDir {
    path: PathBuf,
    removed: bool,
}

impl ExternalDir {
    fn close(mut self) -> io::Result<()> {
        self.removed = true;
        fs::remove_dir_all(&self.path)
    }
}

impl Drop for ExternalDir {
    fn drop(&mut self) {
        if !self.removed {
            if let Err(err) = fs::remove_dir_all(&self.path) {
                log::warn!("scratch directory {} removal failed: {}", self.path.display(), err);
            }
        }
    }
}

impl ScratchDir {
    /// Creates the scratch area.
    ///
    /// With `path` the directory is created at that location; an already
    /// existing directory is fine, any other creation failure propagates.
    /// Without `path` a unique OS temporary directory is created.
    pub fn create(path: Option<&Path>) -> io::Result<Self> {
        let inner = if let Some(path) = path {
            fs::create_dir_all(path)?;
            Inner::External(ExternalDir {
                path: path.to_path_buf(),
                removed: false,
            })
        } else {
            Inner::Temp(tempfile::tempdir()?)
        };

        let scratch = ScratchDir { inner };
        log::info!("using {} as a scratch directory", scratch.path().display());

        return Ok(scratch);
    }

    /// Returns the scratch area path.
    pub fn path(&self) -> &Path {
        match &self.inner {
            Inner::Temp(dir) => dir.path(),
            Inner::External(dir) => &dir.path,
        }
    }

    /// Returns the path of the store backing chunk `chunk`.
    pub fn chunk_path(&self, chunk: usize) -> PathBuf {
        self.path().join(format!("chunk-{}", chunk))
    }

    /// Removes the scratch area and everything in it, surfacing the removal
    /// error to the caller.
    pub fn close(self) -> io::Result<()> {
        match self.inner {
            Inner::Temp(dir) => dir.close(),
            Inner::External(dir) => dir.close(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::ScratchDir;

    #[test]
    fn test_scratch_dir_create_is_idempotent() {
        let parent = tempfile::tempdir().unwrap();
        let location = parent.path().join("scratch");

        let first = ScratchDir::create(Some(&location)).unwrap();
        assert!(location.is_dir());
        assert_eq!(first.chunk_path(3), location.join("chunk-3"));
        drop(first);

        std::fs::create_dir_all(&location).unwrap();
        let second = ScratchDir::create(Some(&location)).unwrap();
        assert!(location.is_dir());
        second.close().unwrap();
        assert!(!location.exists());
    }

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let location = parent.path().join("scratch");

        {
            let scratch = ScratchDir::create(Some(&location)).unwrap();
            std::fs::write(scratch.chunk_path(0), b"payload").unwrap();
        }

        assert!(!location.exists());
    }

    #[test]
    fn test_scratch_dir_defaults_to_os_tmp() {
        let scratch = ScratchDir::create(None).unwrap();
        let location = scratch.path().to_path_buf();
        assert!(location.is_dir());

        scratch.close().unwrap();
        assert!(!location.exists());
    }
}
