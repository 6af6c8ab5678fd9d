use std::{panic, ptr, thread};

use crate::{bytes::FFIBytes, index::FFIUpdateOutcome, scan::FFIScan};

#[repr(C)]
pub enum FFICallCode {
    FFICallSuccess = 0,
    FFICallPanic,
    FFICallErrIO,
    FFICallErrInputInvalid,
    FFICallErrFileUnexpected,
    FFICallErrIndexCorrupted,
}

use FFICallCode::*;

#[repr(C)]
pub struct FFICallState {
    code: FFICallCode,
    err_desc: FFIBytes,
}

#[cfg(test)]
impl FFICallState {
    pub(crate) fn new() -> Self {
        Self {
            code: FFICallSuccess,
            err_desc: FFIBytes::null(),
        }
    }

    pub(crate) fn is_success(&self) -> bool {
        matches!(self.code, FFICallSuccess)
    }
}

/// Runs `call`, catching its panic, and reports how it went through `state`.
///
/// On failure the [`FFIDefault`] of the return type is handed back to the caller.
pub(crate) fn ffi_call<T, F>(state: &mut FFICallState, call: F) -> T
where
    T: FFIDefault,
    F: FnOnce() -> slabindex::Result<T> + panic::UnwindSafe,
{
    let result = panic::catch_unwind(call);
    *state = result.call_state();
    result
        .ok()
        .and_then(|r| r.ok())
        .unwrap_or_else(FFIDefault::default)
}

trait FFICallResult {
    fn call_state(&self) -> FFICallState;
}

impl<T> FFICallResult for thread::Result<T>
where
    T: FFICallResult,
{
    fn call_state(&self) -> FFICallState {
        match self {
            Ok(result) => result.call_state(),
            Err(err) => {
                let err_desc = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                    if let Some(s) = err.downcast_ref::<&'static str>() {
                        s.to_string()
                    } else if let Some(s) = err.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "panic!".to_string()
                    }
                    .into()
                }))
                .unwrap_or_default();

                FFICallState {
                    code: FFICallPanic,
                    err_desc,
                }
            }
        }
    }
}

impl<T> FFICallResult for slabindex::Result<T> {
    #[inline]
    fn call_state(&self) -> FFICallState {
        match self {
            Ok(_) => FFICallState {
                code: FFICallSuccess,
                err_desc: FFIBytes::null(),
            },
            Err(err) => err.call_state(),
        }
    }
}

impl FFICallResult for slabindex::Error {
    fn call_state(&self) -> FFICallState {
        let code = match self.code() {
            slabindex::ErrorCode::IO => FFICallErrIO,
            slabindex::ErrorCode::InputInvalid => FFICallErrInputInvalid,
            slabindex::ErrorCode::FileUnexpected => FFICallErrFileUnexpected,
            slabindex::ErrorCode::DatabaseCorrupted => FFICallErrIndexCorrupted,
        };
        let err_desc = self.to_string().into();

        FFICallState { code, err_desc }
    }
}

pub(crate) trait FFIDefault {
    fn default() -> Self;
}

impl<T> FFIDefault for *mut T {
    #[inline]
    fn default() -> Self {
        ptr::null_mut()
    }
}

impl FFIDefault for () {
    #[inline]
    fn default() -> Self {}
}

impl FFIDefault for u8 {
    #[inline]
    fn default() -> Self {
        0
    }
}

impl FFIDefault for FFIBytes {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

impl FFIDefault for FFIScan {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl FFIDefault for FFIUpdateOutcome {
    #[inline]
    fn default() -> Self {
        Self::FFIUpdateNotFound
    }
}
