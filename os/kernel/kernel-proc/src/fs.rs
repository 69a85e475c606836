//! File-system seam used by the loader.

/// What `stat` reports about a file.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FileStat {
    /// Size in bytes.
    pub size: u32,
    /// File-system specific handle passed back to [`FileSystem::read_file`].
    pub inode: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FsError {
    #[error("i/o error")]
    Io,
    #[error("corrupt file system")]
    Corrupt,
}

/// Read-only access to named files.
pub trait FileSystem {
    /// Look up `name`; `None` if it does not exist.
    fn stat(&mut self, name: &str) -> Option<FileStat>;

    /// Read up to `dest.len()` bytes of the file into `dest` and return how
    /// many were read.
    ///
    /// # Errors
    /// Implementation-specific read failures.
    fn read_file(&mut self, stat: &FileStat, dest: &mut [u8]) -> Result<usize, FsError>;
}

impl<T: FileSystem + ?Sized> FileSystem for &mut T {
    fn stat(&mut self, name: &str) -> Option<FileStat> {
        (**self).stat(name)
    }

    fn read_file(&mut self, stat: &FileStat, dest: &mut [u8]) -> Result<usize, FsError> {
        (**self).read_file(stat, dest)
    }
}
