//! On-disk copies of uploads that must be opened by path.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};
use tracing::{debug, warn};

/// A uniquely named temporary copy of an upload, removed when dropped.
///
/// Every request gets its own file, so concurrent requests never share a
/// path. Failure to delete the file is logged and otherwise ignored.
#[derive(Debug)]
pub struct ScopedUpload {
    file: Option<NamedTempFile>,
}

impl ScopedUpload {
    /// Write `bytes` to a fresh file in `dir` (the system temp dir if `None`).
    pub fn write(bytes: &[u8], dir: Option<&Path>, suffix: &str) -> std::io::Result<Self> {
        let mut builder = Builder::new();
        builder.prefix("upload-").suffix(suffix);
        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        file.write_all(bytes)?;
        file.flush()?;
        debug!(path = %file.path().display(), size = bytes.len(), "Wrote scratch copy");

        Ok(Self { file: Some(file) })
    }

    pub fn path(&self) -> &Path {
        match &self.file {
            Some(file) => file.path(),
            None => Path::new(""),
        }
    }

    fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let path: PathBuf = file.path().to_path_buf();
            if let Err(e) = file.close() {
                warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
            }
        }
    }
}

impl Drop for ScopedUpload {
    fn drop(&mut self) {
        self.release();
    }
}
