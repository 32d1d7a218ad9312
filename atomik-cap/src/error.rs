//! Capability error types
//!
//! One variant per failure the object-management core can report. Every
//! variant has a fixed numeric code at the syscall boundary (see
//! `atomik-syscall`), so the set is closed and ordered.

use core::fmt;

use atomik_syscall::ErrorCode;

/// Errors that can occur during capability operations.
///
/// Operations validate before they mutate, so an error means nothing was
/// changed, except where a multi-object operation documents its rollback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use = "capability errors must be handled"]
pub enum CapError {
    /// A scalar argument is out of its valid domain.
    InvalidArgument,

    /// A size (in log2 bytes or entries) is not acceptable.
    InvalidSize,

    /// The requested object type cannot be produced here.
    InvalidType,

    /// The capability has the wrong type for this operation.
    InvalidCapability,

    /// The operation is never allowed on this capability.
    ///
    /// Deleting a boot capability (one without a parent) and nesting
    /// pools are the usual causes.
    IllegalOperation,

    /// An index or count falls outside its container.
    Range,

    /// Capability pointer resolution failed.
    FailedLookup,

    /// The destination is occupied, or the object still holds state
    /// that must be deleted first.
    DeleteFirst,

    /// The capability still has derived children.
    RevokeFirst,

    /// The source region has no room for the request.
    NotEnoughMemory,

    /// Only page objects may be placed outside the kernel remap window.
    PagesOnly,

    /// A self-test suite failed.
    TestFailed,

    /// The mapping or capability lacks the requested access.
    AccessDenied,

    /// A virtual address is invalid or not translated.
    InvalidAddress,

    /// The pool has not been retyped yet.
    InitFirst,

    /// The object is not mapped.
    MapFirst,

    /// The object is already mapped.
    UnmapFirst,

    /// The CSpace or VSpace already belongs to a thread.
    AlreadyBound,

    /// The thread is already queued.
    PullFirst,

    /// The thread is not queued.
    PushFirst,

    /// Unknown syscall number.
    InvalidSyscall,
}

impl CapError {
    /// Get a short description of the error.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::InvalidSize => "invalid size",
            Self::InvalidType => "invalid object type",
            Self::InvalidCapability => "capability has the wrong type",
            Self::IllegalOperation => "illegal operation",
            Self::Range => "index out of range",
            Self::FailedLookup => "capability lookup failed",
            Self::DeleteFirst => "delete the existing object first",
            Self::RevokeFirst => "revoke derived capabilities first",
            Self::NotEnoughMemory => "not enough memory",
            Self::PagesOnly => "only pages may live outside the remap window",
            Self::TestFailed => "self-test failed",
            Self::AccessDenied => "access denied",
            Self::InvalidAddress => "invalid address",
            Self::InitFirst => "pool is not initialised",
            Self::MapFirst => "object is not mapped",
            Self::UnmapFirst => "object is already mapped",
            Self::AlreadyBound => "already bound to a thread",
            Self::PullFirst => "thread is already queued",
            Self::PushFirst => "thread is not queued",
            Self::InvalidSyscall => "invalid syscall",
        }
    }
}

impl fmt::Display for CapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result type for capability operations.
pub type CapResult<T> = Result<T, CapError>;

impl From<CapError> for ErrorCode {
    fn from(err: CapError) -> Self {
        match err {
            CapError::InvalidArgument => Self::InvalidArgument,
            CapError::InvalidSize => Self::InvalidSize,
            CapError::InvalidType => Self::InvalidType,
            CapError::InvalidCapability => Self::InvalidCapability,
            CapError::IllegalOperation => Self::IllegalOperation,
            CapError::Range => Self::Range,
            CapError::FailedLookup => Self::FailedLookup,
            CapError::DeleteFirst => Self::DeleteFirst,
            CapError::RevokeFirst => Self::RevokeFirst,
            CapError::NotEnoughMemory => Self::NotEnoughMemory,
            CapError::PagesOnly => Self::PagesOnly,
            CapError::TestFailed => Self::TestFailed,
            CapError::AccessDenied => Self::AccessDenied,
            CapError::InvalidAddress => Self::InvalidAddress,
            CapError::InitFirst => Self::InitFirst,
            CapError::MapFirst => Self::MapFirst,
            CapError::UnmapFirst => Self::UnmapFirst,
            CapError::AlreadyBound => Self::AlreadyBound,
            CapError::PullFirst => Self::PullFirst,
            CapError::PushFirst => Self::PushFirst,
            CapError::InvalidSyscall => Self::InvalidSyscall,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syscall_codes() {
        assert_eq!(ErrorCode::from(CapError::InvalidArgument).as_return(), -1);
        assert_eq!(ErrorCode::from(CapError::FailedLookup).as_return(), -7);
        assert_eq!(ErrorCode::from(CapError::PushFirst).as_return(), -20);
        assert_eq!(ErrorCode::from(CapError::InvalidSyscall).as_return(), -21);
    }
}
