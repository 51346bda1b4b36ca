//! Error type shared by the store and the block-device port.

use core::fmt;

/// Errors returned by [`KvStore`](crate::KvStore) operations and by
/// [`BlockDevice`](crate::BlockDevice) implementations.
///
/// `ReadFail`, `ProgramFail`, and `EraseFail` originate in the block-device
/// port and pass through the store unchanged. `ErasedData` is an internal
/// sentinel marking free space during log replay; it never escapes the
/// public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An argument violated the operation's contract.
    BadParam,
    /// The storage region is not erase-sector aligned, or its sector count
    /// is not a positive even number.
    Alignment,
    /// A heap allocation failed.
    MemAlloc,
    /// A record on the medium is corrupt: bad magic, out-of-range header
    /// fields, or CRC mismatch.
    InvalidData,
    /// The bytes at the probed offset are still in the erased state.
    ErasedData,
    /// No live record exists for the requested key.
    ItemNotFound,
    /// The mutation would exceed the logical capacity of one area even
    /// after compaction.
    StorageFull,
    /// The caller's buffer is smaller than the stored value; the payload
    /// is the required size in bytes.
    BufferTooSmall(u32),
    /// The store mutex could not be acquired within the configured timeout.
    Timeout,
    /// The block device failed a read.
    ReadFail,
    /// The block device failed a program.
    ProgramFail,
    /// The block device failed an erase.
    EraseFail,
}

impl Error {
    /// Stable short name for logs and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Error::BadParam => "bad_param",
            Error::Alignment => "alignment",
            Error::MemAlloc => "mem_alloc",
            Error::InvalidData => "invalid_data",
            Error::ErasedData => "erased_data",
            Error::ItemNotFound => "item_not_found",
            Error::StorageFull => "storage_full",
            Error::BufferTooSmall(_) => "buffer_too_small",
            Error::Timeout => "timeout",
            Error::ReadFail => "read_fail",
            Error::ProgramFail => "program_fail",
            Error::EraseFail => "erase_fail",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadParam => f.write_str("invalid argument"),
            Error::Alignment => f.write_str("storage region is not sector-aligned"),
            Error::MemAlloc => f.write_str("memory allocation failed"),
            Error::InvalidData => f.write_str("corrupt record on medium"),
            Error::ErasedData => f.write_str("erased medium at probed offset"),
            Error::ItemNotFound => f.write_str("key not found"),
            Error::StorageFull => f.write_str("storage area full"),
            Error::BufferTooSmall(needed) => {
                write!(f, "buffer too small, {needed} bytes required")
            }
            Error::Timeout => f.write_str("lock acquisition timed out"),
            Error::ReadFail => f.write_str("block device read failed"),
            Error::ProgramFail => f.write_str("block device program failed"),
            Error::EraseFail => f.write_str("block device erase failed"),
        }
    }
}

impl std::error::Error for Error {}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_too_small_carries_required_size() {
        let err = Error::BufferTooSmall(4096);
        assert_eq!(err.name(), "buffer_too_small");
        assert!(err.to_string().contains("4096"));
    }

    #[test]
    fn display_is_nonempty_for_all_variants() {
        let all = [
            Error::BadParam,
            Error::Alignment,
            Error::MemAlloc,
            Error::InvalidData,
            Error::ErasedData,
            Error::ItemNotFound,
            Error::StorageFull,
            Error::BufferTooSmall(1),
            Error::Timeout,
            Error::ReadFail,
            Error::ProgramFail,
            Error::EraseFail,
        ];
        for err in all {
            assert!(!err.to_string().is_empty());
            assert!(!err.name().is_empty());
        }
    }
}
