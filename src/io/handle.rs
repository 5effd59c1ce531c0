//! Exclusively-owned file handles with contextual error mapping

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::error::{Error, Phase, Result};

/// How a handle is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    /// Read + write in place; never creates or truncates
    ReadWrite,
}

/// An open, exclusively-owned reference to a regular file.
///
/// The handle is closed when dropped, which covers every exit path
/// including errors and cancellation.
#[derive(Debug)]
pub struct FileHandle {
    path: PathBuf,
    declared_size: u64,
    mode: AccessMode,
    file: File,
}

impl FileHandle {
    pub fn open_read(path: &Path) -> Result<Self> {
        Self::open(path, AccessMode::ReadOnly)
    }

    pub fn open_write(path: &Path) -> Result<Self> {
        Self::open(path, AccessMode::ReadWrite)
    }

    fn open(path: &Path, mode: AccessMode) -> Result<Self> {
        // Writers act on the directory entry itself, so links are not followed
        let meta = match mode {
            AccessMode::ReadOnly => std::fs::metadata(path),
            AccessMode::ReadWrite => std::fs::symlink_metadata(path),
        }
        .map_err(|e| Error::from_io(path, Phase::Open, 0, e))?;
        if !meta.is_file() {
            return Err(Error::NotRegularFile {
                path: path.to_path_buf(),
            });
        }

        let file = match mode {
            AccessMode::ReadOnly => File::open(path),
            AccessMode::ReadWrite => OpenOptions::new().read(true).write(true).open(path),
        }
        .map_err(|e| Error::from_io(path, Phase::Open, 0, e))?;

        // Size is taken from the open descriptor, not the earlier stat
        let declared_size = file
            .metadata()
            .map_err(|e| Error::from_io(path, Phase::Open, 0, e))?
            .len();

        debug!(path = %path.display(), size = declared_size, ?mode, "opened file");

        Ok(Self {
            path: path.to_path_buf(),
            declared_size,
            mode,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size observed when the handle was opened
    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Current on-disk length
    pub fn current_size(&self) -> Result<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| Error::from_io(&self.path, Phase::Read, 0, e))
    }

    /// Forces written data and metadata to stable storage
    pub fn sync(&self, offset: u64) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|e| Error::from_io(&self.path, Phase::Flush, offset, e))
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_open_reports_declared_size() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"forensic").unwrap();
        temp.flush().unwrap();

        let handle = FileHandle::open_read(temp.path()).unwrap();
        assert_eq!(handle.declared_size(), 8);
        assert_eq!(handle.mode(), AccessMode::ReadOnly);
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let err = FileHandle::open_read(&dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_open_rejects_symlink() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target.bin");
        std::fs::write(&target, b"data").unwrap();
        let link = dir.path().join("link.bin");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(matches!(
            FileHandle::open_write(&link),
            Err(Error::NotRegularFile { .. })
        ));
        assert_eq!(FileHandle::open_read(&link).unwrap().declared_size(), 4);
    }

    #[test]
    fn test_open_directory_is_rejected() {
        let dir = tempdir().unwrap();
        let err = FileHandle::open_write(dir.path()).unwrap_err();
        assert!(matches!(err, Error::NotRegularFile { .. }));
    }
}
