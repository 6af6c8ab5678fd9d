use std::{
    cell::{Cell, RefCell},
    fs, io,
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
    result,
};

use thiserror::Error;

pub(crate) type Result<T> = result::Result<T, Error>;

#[derive(Error, Debug)]
pub(crate) enum Error {
    #[error("short read at offset {offset}: {read} of {expected} bytes")]
    ShortRead {
        offset: u64,
        read: usize,
        expected: usize,
    },
    #[error("short write at offset {offset}: {written} of {expected} bytes")]
    ShortWrite {
        offset: u64,
        written: usize,
        expected: usize,
    },
    #[error(transparent)]
    IO(#[from] io::Error),
}

/// A handle to the backing file of a tree.
///
/// The underlying descriptor is only open while at least one [`Handle`] is alive.
/// Acquiring is reentrant: nested acquisitions share the descriptor opened by the
/// outermost one, and the descriptor is closed when the last handle is dropped.
pub(crate) struct File {
    path: PathBuf,
    inner: RefCell<Option<fs::File>>,
    depth: Cell<usize>,
}

impl File {
    /// Binds to the file at `path`, creating it and its parent directories if needed.
    pub(crate) fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create all necessary intermediate directories.
        if let Some(parent_dir) = path.parent() {
            fs::create_dir_all(parent_dir)?;
        }

        let file = Self {
            path: path.to_path_buf(),
            inner: RefCell::new(None),
            depth: Cell::new(0),
        };
        // Make sure the file exists and is accessible.
        drop(file.acquire()?);
        Ok(file)
    }

    #[inline]
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Acquires a scoped handle, opening the descriptor if no handle is alive.
    pub(crate) fn acquire(&self) -> Result<Handle<'_>> {
        if self.depth.get() == 0 {
            let inner = fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)?;
            *self.inner.borrow_mut() = Some(inner);
        }
        self.depth.set(self.depth.get() + 1);
        Ok(Handle { file: self })
    }

    /// The number of handles currently alive.
    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.depth.get()
    }

    #[cfg(test)]
    fn is_open(&self) -> bool {
        self.inner.borrow().is_some()
    }

    #[inline]
    fn release(&self) {
        let depth = self.depth.get() - 1;
        self.depth.set(depth);
        if depth == 0 {
            drop(self.inner.borrow_mut().take());
        }
    }

    fn with<T>(&self, f: impl FnOnce(&fs::File) -> io::Result<T>) -> Result<T> {
        let inner = self.inner.borrow();
        let file = inner
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "the file is not acquired"))?;
        f(file).map_err(Into::into)
    }
}

/// A scoped acquisition of a [`File`]; dropping it releases one level of nesting.
pub(crate) struct Handle<'a> {
    file: &'a File,
}

impl<'a> Handle<'a> {
    /// The current length of the file in bytes.
    #[inline]
    pub(crate) fn len(&self) -> Result<u64> {
        self.file.with(|f| f.metadata().map(|m| m.len()))
    }

    /// Fills `buf` from `offset`, failing if the file ends before `buf` is full.
    pub(crate) fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let expected = buf.len();
        let read = self.file.with(|f| {
            let mut read = 0;
            while read < expected {
                match f.read_at(&mut buf[read..], offset + read as u64) {
                    Ok(0) => break,
                    Ok(n) => read += n,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(err),
                }
            }
            Ok(read)
        })?;

        if read == expected {
            Ok(())
        } else {
            Err(Error::ShortRead {
                offset,
                read,
                expected,
            })
        }
    }

    /// Writes all of `buf` at `offset`.
    pub(crate) fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        let expected = buf.len();
        let written = self.file.with(|f| {
            let mut written = 0;
            while written < expected {
                match f.write_at(&buf[written..], offset + written as u64) {
                    Ok(0) => break,
                    Ok(n) => written += n,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(err),
                }
            }
            Ok(written)
        })?;

        if written == expected {
            Ok(())
        } else {
            Err(Error::ShortWrite {
                offset,
                written,
                expected,
            })
        }
    }

    /// Discards the content of the file.
    #[inline]
    pub(crate) fn truncate(&self) -> Result<()> {
        self.file.with(|f| f.set_len(0))
    }

    #[inline]
    pub(crate) fn sync(&self) -> Result<()> {
        self.file.with(|f| f.sync_data())
    }
}

impl Drop for Handle<'_> {
    #[inline]
    fn drop(&mut self) {
        self.file.release();
    }
}
