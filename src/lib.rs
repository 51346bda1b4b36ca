//! norkv: a power-fail-safe key-value store for NOR flash and other
//! block-addressed media.
//!
//! Binary values are indexed by short ASCII keys and persisted as
//! self-describing, CRC-protected records in a two-area log. Appends go
//! to the active area; when it fills, live records are compacted into
//! the other half and authority transfers with a single area-header
//! write, so a power loss at any instant leaves the store recoverable
//! to a prefix of the completed mutations.
//!
//! The host supplies the medium as a [`BlockDevice`]; [`MemDevice`] is
//! the RAM-backed implementation used by this crate's tests, fuzzing,
//! and benchmarks.

pub mod bufio;
pub mod crc;
pub mod device;
pub mod error;
pub mod index;
pub mod record;
pub mod store;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level re-exports for the common API entry points.
// ─────────────────────────────────────────────────────────────────────────────

/// The store itself and its open-time parameters.
pub use store::{Config, KvStore, Stats, DEFAULT_LOCK_TIMEOUT};

/// Key of the area-header record at the base of an active area.
pub use store::AREA_KEY;

/// The port every medium implements, plus the RAM-backed test device.
pub use device::mem::MemDevice;
pub use device::{BlockDevice, Geometry};

/// Crate-wide error and result types.
pub use error::{Error, Result};

/// Exclusive upper bound on key length in bytes.
pub use record::MAX_KEY_SIZE;

/// On-medium format constants, useful to external tooling that inspects
/// a medium image.
pub use record::{FORMAT_VERSION, HEADER_SIZE, RECORD_MAGIC};

/// CRC-16/CCITT-FALSE used for record integrity and key hashing.
pub use crc::{crc16, CRC16_INIT};
