#![allow(clippy::missing_safety_doc)]

macro_rules! check_null_ptr {
    ($ptr:expr) => {
        if $ptr.is_null() {
            return Ok(crate::ffi_call::FFIDefault::default());
        }
    };
}

mod bytes;
mod ffi_call;
pub mod scan;

pub mod index {
    use std::ffi::c_void;

    use slabindex::{
        worker_path, InsertOutcome, Locator, RemoveOutcome, SlabIndex, UpdateOutcome,
    };

    use crate::{
        bytes::FFIBytesRef,
        ffi_call::{ffi_call, FFICallState},
    };

    #[repr(C)]
    pub struct SlabIndexOptions {
        /// 0 keeps the default order.
        order: u32,
        /// 0 keeps the operating system's page size.
        page_size: u32,
        force_sync: u8,
        page_cache_capacity: u64,
    }

    #[cfg(test)]
    impl SlabIndexOptions {
        pub(crate) fn new(order: u32) -> Self {
            Self {
                order,
                page_size: 4096,
                force_sync: 0,
                page_cache_capacity: 8,
            }
        }
    }

    impl From<SlabIndexOptions> for slabindex::Options {
        fn from(value: SlabIndexOptions) -> Self {
            let mut options = Self::new();
            if value.order != 0 {
                options.order(value.order as usize);
            }
            options
                .page_size((value.page_size != 0).then_some(value.page_size))
                .force_sync(value.force_sync != 0)
                .page_cache_capacity(value.page_cache_capacity as usize);
            options
        }
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FFILocator {
        pub segment_id: u64,
        pub slot_index: u64,
    }

    impl From<Locator> for FFILocator {
        #[inline]
        fn from(value: Locator) -> Self {
            Self {
                segment_id: value.segment_id,
                slot_index: value.slot_index,
            }
        }
    }

    impl From<FFILocator> for Locator {
        #[inline]
        fn from(value: FFILocator) -> Self {
            Locator::new(value.segment_id, value.slot_index)
        }
    }

    #[repr(C)]
    pub enum FFIUpdateOutcome {
        FFIUpdateUpdated = 0,
        FFIUpdateMismatch,
        FFIUpdateNotFound,
    }

    impl From<UpdateOutcome> for FFIUpdateOutcome {
        #[inline]
        fn from(value: UpdateOutcome) -> Self {
            match value {
                UpdateOutcome::Updated => Self::FFIUpdateUpdated,
                UpdateOutcome::Mismatch => Self::FFIUpdateMismatch,
                UpdateOutcome::NotFound => Self::FFIUpdateNotFound,
            }
        }
    }

    /// Opens the index of `worker_id` under the directory `dir`.
    #[no_mangle]
    pub unsafe extern "C" fn slabindex_create(
        dir: FFIBytesRef,
        worker_id: u64,
        options: SlabIndexOptions,
        call_state: &mut FFICallState,
    ) -> *mut c_void {
        ffi_call(call_state, || {
            let options = slabindex::Options::from(options);
            options
                .open(worker_path(dir.into_str(), worker_id), worker_id)
                .map(Box::new)
                .map(Box::into_raw)
                .map(|ptr| ptr as *mut c_void)
        })
    }

    #[no_mangle]
    pub unsafe extern "C" fn slabindex_free(index: *mut c_void, call_state: &mut FFICallState) {
        ffi_call(call_state, || {
            check_null_ptr!(index);
            drop(Box::from_raw(index as *mut SlabIndex));
            Ok(())
        })
    }

    /// Writes the locator of `key` to `locator` and returns 1, or returns 0 when absent.
    #[no_mangle]
    pub unsafe extern "C" fn slabindex_find(
        index: *const c_void,
        key: u64,
        locator: *mut FFILocator,
        call_state: &mut FFICallState,
    ) -> u8 {
        ffi_call(call_state, || {
            check_null_ptr!(index);
            check_null_ptr!(locator);
            let index = &*(index as *const SlabIndex);
            Ok(match index.search(key)? {
                Some(found) => {
                    *locator = found.into();
                    1
                }
                None => 0,
            })
        })
    }

    /// Returns 1 when inserted, 0 when the key is already present.
    #[no_mangle]
    pub unsafe extern "C" fn slabindex_insert(
        index: *mut c_void,
        key: u64,
        locator: FFILocator,
        call_state: &mut FFICallState,
    ) -> u8 {
        ffi_call(call_state, || {
            check_null_ptr!(index);
            let index = &mut *(index as *mut SlabIndex);
            index
                .insert(key, locator.into())
                .map(|o| (o == InsertOutcome::Inserted) as u8)
        })
    }

    #[no_mangle]
    pub unsafe extern "C" fn slabindex_update(
        index: *mut c_void,
        key: u64,
        locator: FFILocator,
        call_state: &mut FFICallState,
    ) -> FFIUpdateOutcome {
        ffi_call(call_state, || {
            check_null_ptr!(index);
            let index = &mut *(index as *mut SlabIndex);
            index.update(key, locator.into()).map(Into::into)
        })
    }

    /// Returns 1 when removed, 0 when the key is absent.
    #[no_mangle]
    pub unsafe extern "C" fn slabindex_delete(
        index: *mut c_void,
        key: u64,
        call_state: &mut FFICallState,
    ) -> u8 {
        ffi_call(call_state, || {
            check_null_ptr!(index);
            let index = &mut *(index as *mut SlabIndex);
            index
                .remove(key)
                .map(|o| (o == RemoveOutcome::Removed) as u8)
        })
    }

    /// Calls `callback` with every key in ascending order, passing `data` along.
    #[no_mangle]
    pub unsafe extern "C" fn slabindex_forall_keys(
        index: *const c_void,
        callback: Option<extern "C" fn(key: u64, data: *mut c_void)>,
        data: *mut c_void,
        call_state: &mut FFICallState,
    ) {
        ffi_call(call_state, || {
            check_null_ptr!(index);
            let Some(callback) = callback else {
                return Ok(());
            };
            let index = &*(index as *const SlabIndex);
            index.for_each(|key, _| callback(key, data))
        })
    }
}
