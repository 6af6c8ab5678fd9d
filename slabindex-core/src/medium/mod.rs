use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) use file::File;

pub(crate) mod cache;
pub(crate) mod codec;
pub(crate) mod file;

/// The minimum page size (4 KB).
pub(crate) const MIN_PAGE_SIZE: u32 = 4 * 1024;

/// The page size used when none is configured: the operating system's memory page
/// size, but never smaller than [`MIN_PAGE_SIZE`].
pub(crate) fn default_page_size() -> u32 {
    static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

    let os_page_size = match PAGE_SIZE.load(Ordering::Acquire) {
        0 => {
            let page_size = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) }.max(0) as usize;
            PAGE_SIZE.store(page_size, Ordering::Release);
            page_size
        }
        page_size => page_size,
    };

    u32::try_from(os_page_size)
        .unwrap_or(MIN_PAGE_SIZE)
        .max(MIN_PAGE_SIZE)
}
