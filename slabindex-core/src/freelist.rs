use thiserror::Error;

use crate::{storage::PageOffset, FREE_LIST_CAPACITY};

/// Represents the bounded free list that keeps track of reclaimed node pages.
///
/// Reclaimed offsets are reused in LIFO order before the slot cursor advances.
/// The capacity is part of the meta block layout, so it never grows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Freelist {
    offsets: Vec<PageOffset>,
}

#[derive(Error, Debug)]
#[error("the free list is full, cannot reclaim page {0}")]
pub(crate) struct FreelistOverflow(pub(crate) PageOffset);

#[derive(Error, Debug)]
#[error("the free list has room for {room} pages, but the removal may reclaim {needed}")]
pub(crate) struct FreelistExhausted {
    pub(crate) room: usize,
    pub(crate) needed: usize,
}

impl Freelist {
    #[inline]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The number of reclaimed pages in the free list.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.len() >= FREE_LIST_CAPACITY
    }

    /// Checks that `needed` more pages can be reclaimed without overflowing.
    #[inline]
    pub(crate) fn reserve(&self, needed: usize) -> Result<(), FreelistExhausted> {
        let room = FREE_LIST_CAPACITY.saturating_sub(self.len());
        match room >= needed {
            true => Ok(()),
            false => Err(FreelistExhausted { room, needed }),
        }
    }

    /// Reclaims a page.
    pub(crate) fn push(&mut self, offset: PageOffset) -> Result<(), FreelistOverflow> {
        if self.is_full() {
            return Err(FreelistOverflow(offset));
        }
        debug_assert!(!offset.is_null(), "the meta page cannot be reclaimed");
        debug_assert!(!self.offsets.contains(&offset), "page was reclaimed twice");
        self.offsets.push(offset);
        Ok(())
    }

    /// Takes the most recently reclaimed page.
    #[inline]
    pub(crate) fn pop(&mut self) -> Option<PageOffset> {
        self.offsets.pop()
    }

    /// The reclaimed offsets, oldest first.
    #[inline]
    pub(crate) fn as_slice(&self) -> &[PageOffset] {
        &self.offsets
    }
}

impl<T> From<T> for Freelist
where
    T: Into<Vec<PageOffset>>,
{
    #[inline]
    fn from(value: T) -> Self {
        Self {
            offsets: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Freelist;
    use crate::{storage::PageOffset, FREE_LIST_CAPACITY};

    #[test]
    fn test_lifo() {
        let mut freelist = Freelist::new();
        assert_eq!(freelist.pop(), None);

        freelist.push(4096.into()).unwrap();
        freelist.push(12288.into()).unwrap();
        freelist.push(8192.into()).unwrap();
        assert_eq!(freelist.len(), 3);

        assert_eq!(freelist.pop(), Some(8192.into()));
        assert_eq!(freelist.pop(), Some(12288.into()));
        assert_eq!(freelist.as_slice(), &[PageOffset::from(4096)]);
    }

    #[test]
    fn test_overflow() {
        let mut freelist = Freelist::from(
            (1..=FREE_LIST_CAPACITY as u64)
                .map(|i| PageOffset::from(i * 4096))
                .collect::<Vec<_>>(),
        );
        assert!(freelist.is_full());

        let err = freelist.push(PageOffset::from(1 << 30)).unwrap_err();
        assert_eq!(err.0, PageOffset::from(1 << 30));
        assert_eq!(freelist.len(), FREE_LIST_CAPACITY);
    }

    #[test]
    fn test_reserve() {
        let mut freelist = Freelist::from(
            (1..FREE_LIST_CAPACITY as u64 - 2)
                .map(|i| PageOffset::from(i * 4096))
                .collect::<Vec<_>>(),
        );
        assert!(freelist.reserve(3).is_ok());

        let err = freelist.reserve(4).unwrap_err();
        assert_eq!((err.room, err.needed), (3, 4));

        freelist.pop();
        assert!(freelist.reserve(4).is_ok());
    }
}
