use std::fmt::{Display, Formatter};

use crate::{bptree, db, freelist, medium, meta};

/// A `Result` type that all API calls of the index return.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible error cases that can be returned by API calls of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// An error occurred during an I/O operation.
    IO,
    /// The input (e.g., options) is invalid.
    InputInvalid,
    /// The index file is not in the expected format.
    FileUnexpected,
    /// The index is corrupted, or its structure can no longer be maintained.
    DatabaseCorrupted,
}

/// The error type of the index: a coarse [`ErrorCode`] plus the underlying cause.
#[derive(Debug)]
pub struct Error {
    code: ErrorCode,
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl Display for ErrorCode {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::IO => "IO error",
            Self::InputInvalid => "invalid input argument",
            Self::FileUnexpected => "unexpected index file",
            Self::DatabaseCorrupted => "index is corrupted",
        })
    }
}

impl Error {
    #[inline]
    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl Display for Error {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.source)
    }
}

impl std::error::Error for Error {
    #[inline]
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

impl From<medium::file::Error> for Error {
    #[inline]
    fn from(value: medium::file::Error) -> Self {
        Self {
            code: ErrorCode::IO,
            source: Box::new(value),
        }
    }
}

impl From<db::InputInvalid> for Error {
    #[inline]
    fn from(value: db::InputInvalid) -> Self {
        Self {
            code: ErrorCode::InputInvalid,
            source: Box::new(value),
        }
    }
}

impl From<meta::ValidationError> for Error {
    #[inline]
    fn from(value: meta::ValidationError) -> Self {
        Self {
            code: ErrorCode::FileUnexpected,
            source: Box::new(value),
        }
    }
}

impl From<medium::codec::Error> for Error {
    #[inline]
    fn from(value: medium::codec::Error) -> Self {
        Self {
            code: ErrorCode::DatabaseCorrupted,
            source: Box::new(value),
        }
    }
}

impl From<freelist::FreelistOverflow> for Error {
    #[inline]
    fn from(value: freelist::FreelistOverflow) -> Self {
        Self {
            code: ErrorCode::DatabaseCorrupted,
            source: Box::new(value),
        }
    }
}

impl From<freelist::FreelistExhausted> for Error {
    #[inline]
    fn from(value: freelist::FreelistExhausted) -> Self {
        Self {
            code: ErrorCode::DatabaseCorrupted,
            source: Box::new(value),
        }
    }
}

impl From<db::Poisoned> for Error {
    #[inline]
    fn from(value: db::Poisoned) -> Self {
        Self {
            code: ErrorCode::DatabaseCorrupted,
            source: Box::new(value),
        }
    }
}

impl From<bptree::Violation> for Error {
    #[inline]
    fn from(value: bptree::Violation) -> Self {
        Self {
            code: ErrorCode::DatabaseCorrupted,
            source: Box::new(value),
        }
    }
}
