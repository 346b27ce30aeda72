//! Error taxonomy for graph operations.
//!
//! Two layers exist:
//!
//! - [`NativeError`] is what a native engine raises: a DOMException-style
//!   numeric code plus a name and message.
//! - [`AudioError`] is what the shim surfaces. Errors the shim raises itself
//!   use the named variants; native errors the shim does not recognise pass
//!   through unchanged as [`AudioError::Native`].
//!
//! [`AudioError::kind`] classifies both layers, so a native `IndexSizeError`
//! that passed through untouched still reports [`ErrorKind::IndexSize`].
//!
//! Lookup misses for identity associations that a prior step guaranteed are
//! not represented here at all: they panic (see
//! [`identity`](crate::identity)).

use thiserror::Error;

/// Result type for shim operations.
pub type Result<T> = std::result::Result<T, AudioError>;

/// An error raised by a native engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct NativeError {
    /// DOMException legacy code, or 0 for `RangeError`/`TypeError`.
    pub code: u16,
    /// Exception name, e.g. `"InvalidStateError"`.
    pub name: String,
    /// Human-readable message.
    pub message: String,
}

impl NativeError {
    /// Code for `IndexSizeError`.
    pub const INDEX_SIZE_ERR: u16 = 1;
    /// Code for `NotSupportedError`.
    pub const NOT_SUPPORTED_ERR: u16 = 9;
    /// Code for `InvalidStateError`.
    pub const INVALID_STATE_ERR: u16 = 11;
    /// Code for `InvalidAccessError`.
    pub const INVALID_ACCESS_ERR: u16 = 15;

    /// Creates an error with an explicit code and name.
    pub fn new(code: u16, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            message: message.into(),
        }
    }

    /// `IndexSizeError`.
    pub fn index_size(message: impl Into<String>) -> Self {
        Self::new(Self::INDEX_SIZE_ERR, "IndexSizeError", message)
    }

    /// `NotSupportedError`.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(Self::NOT_SUPPORTED_ERR, "NotSupportedError", message)
    }

    /// `InvalidStateError`.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_STATE_ERR, "InvalidStateError", message)
    }

    /// `InvalidAccessError`.
    pub fn invalid_access(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_ACCESS_ERR, "InvalidAccessError", message)
    }

    /// `RangeError`.
    pub fn range(message: impl Into<String>) -> Self {
        Self::new(0, "RangeError", message)
    }

    /// `TypeError`.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(0, "TypeError", message)
    }

    /// Classifies this error by code, falling back to the name for code 0.
    pub fn kind(&self) -> ErrorKind {
        match self.code {
            Self::INDEX_SIZE_ERR => ErrorKind::IndexSize,
            Self::NOT_SUPPORTED_ERR => ErrorKind::NotSupported,
            Self::INVALID_STATE_ERR => ErrorKind::InvalidState,
            Self::INVALID_ACCESS_ERR => ErrorKind::InvalidAccess,
            0 if self.name == "RangeError" => ErrorKind::Range,
            0 if self.name == "TypeError" => ErrorKind::Type,
            _ => ErrorKind::Other,
        }
    }
}

/// Error kinds callers can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An output or input index is out of range.
    IndexSize,
    /// Cross-context access, or a destination the shim has no record of.
    InvalidAccess,
    /// The object is in a state that forbids the operation.
    InvalidState,
    /// The engine cannot do what was asked.
    NotSupported,
    /// A numeric argument is out of range.
    Range,
    /// An argument has the wrong type (e.g. a non-finite number).
    Type,
    /// A native error the shim does not classify.
    Other,
}

/// Errors surfaced by the shim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    /// An output or input index is out of range.
    #[error("IndexSizeError: {0}")]
    IndexSize(String),

    /// Cross-context access, or a destination with no identity record.
    #[error("InvalidAccessError: {0}")]
    InvalidAccess(String),

    /// Operation on a closed context or a node in a terminal state.
    #[error("InvalidStateError: {0}")]
    InvalidState(String),

    /// The engine cannot do what was asked.
    #[error("NotSupportedError: {0}")]
    NotSupported(String),

    /// A numeric argument is out of range.
    #[error("RangeError: {0}")]
    Range(String),

    /// An argument has the wrong type.
    #[error("TypeError: {0}")]
    Type(String),

    /// A native error passed through unchanged.
    #[error(transparent)]
    Native(#[from] NativeError),
}

impl AudioError {
    /// Create an index size error.
    pub fn index_size(message: impl Into<String>) -> Self {
        AudioError::IndexSize(message.into())
    }

    /// Create an invalid access error.
    pub fn invalid_access(message: impl Into<String>) -> Self {
        AudioError::InvalidAccess(message.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        AudioError::InvalidState(message.into())
    }

    /// Create a not supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        AudioError::NotSupported(message.into())
    }

    /// Create a range error.
    pub fn range(message: impl Into<String>) -> Self {
        AudioError::Range(message.into())
    }

    /// Create a type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        AudioError::Type(message.into())
    }

    /// Classifies the error, looking through passed-through native errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AudioError::IndexSize(_) => ErrorKind::IndexSize,
            AudioError::InvalidAccess(_) => ErrorKind::InvalidAccess,
            AudioError::InvalidState(_) => ErrorKind::InvalidState,
            AudioError::NotSupported(_) => ErrorKind::NotSupported,
            AudioError::Range(_) => ErrorKind::Range,
            AudioError::Type(_) => ErrorKind::Type,
            AudioError::Native(native) => native.kind(),
        }
    }
}

/// Relabels a native `InvalidStateError` as `InvalidAccessError`.
///
/// Some engines raise the state error for cross-context param connections.
/// Every other native error passes through unchanged.
pub(crate) fn relabel_invalid_state(error: NativeError) -> AudioError {
    if error.code == NativeError::INVALID_STATE_ERR {
        AudioError::InvalidAccess(error.message)
    } else {
        AudioError::Native(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_kind_follows_code() {
        assert_eq!(NativeError::index_size("x").kind(), ErrorKind::IndexSize);
        assert_eq!(NativeError::invalid_access("x").kind(), ErrorKind::InvalidAccess);
        assert_eq!(NativeError::range("x").kind(), ErrorKind::Range);
        assert_eq!(NativeError::type_error("x").kind(), ErrorKind::Type);
        assert_eq!(NativeError::new(3, "HierarchyRequestError", "x").kind(), ErrorKind::Other);
    }

    #[test]
    fn passthrough_keeps_kind() {
        let err = AudioError::from(NativeError::index_size("output 4 of 1"));
        assert!(matches!(err, AudioError::Native(_)));
        assert_eq!(err.kind(), ErrorKind::IndexSize);
    }

    #[test]
    fn relabel_only_touches_invalid_state() {
        let relabeled = relabel_invalid_state(NativeError::invalid_state("foreign param"));
        assert_eq!(relabeled, AudioError::InvalidAccess("foreign param".into()));

        let untouched = relabel_invalid_state(NativeError::index_size("output 2"));
        assert_eq!(untouched, AudioError::Native(NativeError::index_size("output 2")));
    }

    #[test]
    fn display_carries_exception_name() {
        assert_eq!(
            AudioError::invalid_access("different contexts").to_string(),
            "InvalidAccessError: different contexts"
        );
        assert_eq!(
            AudioError::from(NativeError::not_supported("no")).to_string(),
            "NotSupportedError: no"
        );
    }
}
