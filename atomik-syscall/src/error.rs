//! Syscall error codes
//!
//! Every code is positive and travels negated in `eax`. Zero is success;
//! positive results carry call-specific information (`cap_get_info`
//! returns the object type).

/// Syscall error codes.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// Success.
    Success = 0,
    /// A scalar argument is out of range.
    InvalidArgument = 1,
    /// A size is not acceptable.
    InvalidSize = 2,
    /// The requested object type cannot be produced.
    InvalidType = 3,
    /// The capability has the wrong type.
    InvalidCapability = 4,
    /// The operation is never allowed on this capability.
    IllegalOperation = 5,
    /// An index falls outside its container.
    Range = 6,
    /// Capability pointer resolution failed.
    FailedLookup = 7,
    /// The destination is occupied.
    DeleteFirst = 8,
    /// The capability has derived children.
    RevokeFirst = 9,
    /// Out of memory in the source region.
    NotEnoughMemory = 10,
    /// Only pages may live outside the remap window.
    PagesOnly = 11,
    /// A self-test failed.
    TestFailed = 12,
    /// Missing access rights.
    AccessDenied = 13,
    /// Invalid or untranslated address.
    InvalidAddress = 14,
    /// The pool is not initialised.
    InitFirst = 15,
    /// The object is not mapped.
    MapFirst = 16,
    /// The object is already mapped.
    UnmapFirst = 17,
    /// Already bound to a thread.
    AlreadyBound = 18,
    /// The thread is already queued.
    PullFirst = 19,
    /// The thread is not queued.
    PushFirst = 20,
    /// Invalid syscall number.
    InvalidSyscall = 21,
}

impl ErrorCode {
    /// Value placed in `eax` for this code.
    #[inline]
    #[must_use]
    pub const fn as_return(self) -> i32 {
        -(self as i32)
    }

    /// Check if this represents success.
    #[inline]
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Try to convert from a positive code.
    pub fn from_code(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            1 => Some(Self::InvalidArgument),
            2 => Some(Self::InvalidSize),
            3 => Some(Self::InvalidType),
            4 => Some(Self::InvalidCapability),
            5 => Some(Self::IllegalOperation),
            6 => Some(Self::Range),
            7 => Some(Self::FailedLookup),
            8 => Some(Self::DeleteFirst),
            9 => Some(Self::RevokeFirst),
            10 => Some(Self::NotEnoughMemory),
            11 => Some(Self::PagesOnly),
            12 => Some(Self::TestFailed),
            13 => Some(Self::AccessDenied),
            14 => Some(Self::InvalidAddress),
            15 => Some(Self::InitFirst),
            16 => Some(Self::MapFirst),
            17 => Some(Self::UnmapFirst),
            18 => Some(Self::AlreadyBound),
            19 => Some(Self::PullFirst),
            20 => Some(Self::PushFirst),
            21 => Some(Self::InvalidSyscall),
            _ => None,
        }
    }

    /// Get the error name for logging.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidSize => "InvalidSize",
            Self::InvalidType => "InvalidType",
            Self::InvalidCapability => "InvalidCapability",
            Self::IllegalOperation => "IllegalOperation",
            Self::Range => "Range",
            Self::FailedLookup => "FailedLookup",
            Self::DeleteFirst => "DeleteFirst",
            Self::RevokeFirst => "RevokeFirst",
            Self::NotEnoughMemory => "NotEnoughMemory",
            Self::PagesOnly => "PagesOnly",
            Self::TestFailed => "TestFailed",
            Self::AccessDenied => "AccessDenied",
            Self::InvalidAddress => "InvalidAddress",
            Self::InitFirst => "InitFirst",
            Self::MapFirst => "MapFirst",
            Self::UnmapFirst => "UnmapFirst",
            Self::AlreadyBound => "AlreadyBound",
            Self::PullFirst => "PullFirst",
            Self::PushFirst => "PushFirst",
            Self::InvalidSyscall => "InvalidSyscall",
        }
    }
}

/// Syscall result type for userspace.
pub type SyscallResult<T = i32> = Result<T, ErrorCode>;

/// Check a raw syscall return value and convert to Result.
#[inline]
pub fn check_result(value: i32) -> SyscallResult {
    if value >= 0 {
        Ok(value)
    } else {
        Err(value
            .checked_neg()
            .and_then(ErrorCode::from_code)
            .unwrap_or(ErrorCode::InvalidSyscall))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_encoding() {
        assert_eq!(ErrorCode::FailedLookup.as_return(), -7);
        assert_eq!(ErrorCode::Success.as_return(), 0);
    }

    #[test]
    fn test_check_result() {
        assert_eq!(check_result(3), Ok(3));
        assert_eq!(check_result(-10), Err(ErrorCode::NotEnoughMemory));
        assert_eq!(check_result(-99), Err(ErrorCode::InvalidSyscall));
        assert_eq!(check_result(i32::MIN), Err(ErrorCode::InvalidSyscall));
    }
}
