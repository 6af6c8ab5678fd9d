use std::result;

use thiserror::Error;

pub(crate) type Result<T> = result::Result<T, Error>;

#[derive(Error, Debug)]
pub(crate) enum Error {
    #[error("bytes are not enough")]
    Size,
    #[error("entry count {count} exceeds the capacity {capacity} of the page")]
    Count { count: usize, capacity: usize },
    #[error("the recorded entry area size {recorded} does not match {expected}")]
    AreaSize { recorded: u32, expected: u32 },
    #[error("a branch node must hold at least one child")]
    EmptyBranch,
}

/// Sequentially reads little-endian fields out of a page image.
pub(crate) struct Decoder<'a> {
    bytes: &'a [u8],
}

impl<'a> Decoder<'a> {
    #[inline]
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    #[inline]
    pub(crate) fn u64(&mut self) -> Result<u64> {
        self.take::<8>().map(u64::from_le_bytes)
    }

    #[inline]
    pub(crate) fn u32(&mut self) -> Result<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        if self.bytes.len() < N {
            return Err(Error::Size);
        }
        let (head, remaining) = self.bytes.split_at(N);
        self.bytes = remaining;

        let mut raw = [0; N];
        raw.copy_from_slice(head);
        Ok(raw)
    }
}

/// Sequentially writes little-endian fields into a page image.
pub(crate) struct Encoder<'a> {
    bytes: &'a mut [u8],
    pos: usize,
}

impl<'a> Encoder<'a> {
    #[inline]
    pub(crate) fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    #[inline]
    pub(crate) fn put_u64(&mut self, value: u64) -> Result<()> {
        self.put(&value.to_le_bytes())
    }

    #[inline]
    pub(crate) fn put_u32(&mut self, value: u32) -> Result<()> {
        self.put(&value.to_le_bytes())
    }

    /// The bytes written so far.
    #[inline]
    pub(crate) fn written(&self) -> &[u8] {
        &self.bytes[..self.pos]
    }

    fn put(&mut self, raw: &[u8]) -> Result<()> {
        let end = self.pos + raw.len();
        if end > self.bytes.len() {
            return Err(Error::Size);
        }
        self.bytes[self.pos..end].copy_from_slice(raw);
        self.pos = end;
        Ok(())
    }
}

/// Fails when `count` entries cannot fit into a page holding at most `capacity`.
#[inline]
pub(crate) fn check_count(count: usize, capacity: usize) -> Result<()> {
    if count <= capacity {
        Ok(())
    } else {
        Err(Error::Count { count, capacity })
    }
}
