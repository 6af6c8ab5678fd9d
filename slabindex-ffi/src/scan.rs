use std::{ffi::c_void, ptr};

use slabindex::{Entry, SlabIndex};

use crate::{
    ffi_call::{ffi_call, FFICallState},
    index::FFILocator,
};

/// The result of a range scan: `length` keys and the locators they map to,
/// in ascending key order.
///
/// Owned by this library, the caller must hand it back through `slabindex_scan_dealloc`.
#[repr(C)]
pub struct FFIScan {
    keys: *mut u64,
    locators: *mut FFILocator,
    length: u64,
}

impl FFIScan {
    fn new(entries: Vec<Entry>) -> Self {
        if entries.is_empty() {
            return Self::empty();
        }

        let length = entries.len() as u64;
        let (keys, locators): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .map(|e| (e.key, FFILocator::from(e.locator)))
            .unzip();

        Self {
            keys: Box::into_raw(keys.into_boxed_slice()) as *mut u64,
            locators: Box::into_raw(locators.into_boxed_slice()) as *mut FFILocator,
            length,
        }
    }

    #[inline]
    pub(crate) const fn empty() -> Self {
        Self {
            keys: ptr::null_mut(),
            locators: ptr::null_mut(),
            length: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn keys(&self) -> &[u64] {
        match self.keys.is_null() {
            true => &[],
            false => unsafe { std::slice::from_raw_parts(self.keys, self.length as usize) },
        }
    }

    unsafe fn dealloc(self) {
        let length = self.length as usize;
        if !self.keys.is_null() {
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(self.keys, length)));
        }
        if !self.locators.is_null() {
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                self.locators,
                length,
            )));
        }
    }
}

/// Collects up to `limit` entries whose keys are not less than `key`.
#[no_mangle]
pub unsafe extern "C" fn slabindex_find_n(
    index: *const c_void,
    key: u64,
    limit: u64,
    call_state: &mut FFICallState,
) -> FFIScan {
    ffi_call(call_state, || {
        check_null_ptr!(index);
        let index = &*(index as *const SlabIndex);
        index
            .search_range(key, limit as usize)
            .map(FFIScan::new)
    })
}

#[no_mangle]
pub unsafe extern "C" fn slabindex_scan_dealloc(scan: FFIScan, call_state: &mut FFICallState) {
    ffi_call(call_state, || {
        scan.dealloc();
        Ok(())
    })
}
