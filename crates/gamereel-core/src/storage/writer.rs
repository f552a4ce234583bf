use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

use super::partial_path;

/// Writer over `<dest>.part`. Cloneable so chunk writes can move to the blocking pool.
#[derive(Clone, Debug)]
pub struct PartialWriter {
    file: Arc<File>,
    path: PathBuf,
}

impl PartialWriter {
    /// Start a fresh partial for `final_path`, truncating any previous one.
    pub fn create(final_path: &Path) -> Result<Self> {
        let path = partial_path(final_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("failed to create partial file: {}", path.display()))?;
        Ok(Self {
            file: Arc::new(file),
            path,
        })
    }

    /// Reopen an existing partial without truncating it.
    pub fn open_existing(final_path: &Path) -> Result<Self> {
        let path = partial_path(final_path);
        let file = File::options()
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open partial file: {}", path.display()))?;
        Ok(Self {
            file: Arc::new(file),
            path,
        })
    }

    /// Reserve disk blocks for `total` bytes without changing the file length.
    /// Best effort: unsupported filesystems are ignored.
    pub fn reserve(&self, total: u64) {
        #[cfg(target_os = "linux")]
        {
            use std::os::unix::io::AsRawFd;
            let fd = self.file.as_raw_fd();
            let r = unsafe {
                libc::fallocate(fd, libc::FALLOC_FL_KEEP_SIZE, 0, total as libc::off_t)
            };
            if r != 0 {
                tracing::debug!(
                    errno = std::io::Error::last_os_error().raw_os_error(),
                    "fallocate(KEEP_SIZE) not available"
                );
            }
        }
        #[cfg(not(target_os = "linux"))]
        let _ = total;
    }

    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.file
            .write_all_at(data, offset)
            .with_context(|| format!("write at {} in {}", offset, self.path.display()))
    }

    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = (*self.file).try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)?;
        Ok(())
    }

    /// Current on-disk length.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Flush data to disk. A checkpoint may only be recorded after this returns.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data().context("partial file sync failed")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the partial onto `final_path`, closing it first.
    pub fn finalize(self, final_path: &Path) -> Result<()> {
        let path = self.path.clone();
        drop(self.file);
        std::fs::rename(&path, final_path).with_context(|| {
            format!("failed to rename {} to {}", path.display(), final_path.display())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_writes_track_length() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/out.mp4");
        let w = PartialWriter::create(&dest).unwrap();
        w.reserve(1024);
        assert_eq!(w.len().unwrap(), 0);
        w.write_at(0, b"hello").unwrap();
        w.write_at(5, b" world").unwrap();
        w.sync().unwrap();
        assert_eq!(w.len().unwrap(), 11);
        w.finalize(&dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
        assert!(!partial_path(&dest).exists());
    }

    #[test]
    fn reopen_keeps_content_and_appends_after_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        {
            let w = PartialWriter::create(&dest).unwrap();
            w.write_at(0, b"abcdefgh").unwrap();
            w.sync().unwrap();
        }
        let w = PartialWriter::open_existing(&dest).unwrap();
        assert_eq!(w.len().unwrap(), 8);
        w.write_at(8, b"XY").unwrap();
        w.finalize(&dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"abcdefghXY");
    }

    #[test]
    fn open_existing_without_partial_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PartialWriter::open_existing(&dir.path().join("missing")).is_err());
    }
}
