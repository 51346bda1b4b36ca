//! Thin wrapper around the `crc` crate providing the CRC-16/CCITT-FALSE
//! flavor used throughout the on-medium format (record integrity and key
//! hashing).
//!
//! Parameters: polynomial `0x1021`, initial value `0xFFFF`, no input or
//! output reflection, no final XOR. Because the transform has no reflection
//! and no final XOR, the register value after any prefix is a valid initial
//! value for the remainder, so `crc16(b, crc16(a, INIT))` equals
//! `crc16(ab, INIT)`.

use crc::{Crc, CRC_16_IBM_3740};

/// CRC-16/CCITT-FALSE engine (the catalog name is CRC-16/IBM-3740).
const CRC16_CCITT: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Initial register value for a fresh checksum or key hash.
pub const CRC16_INIT: u16 = 0xFFFF;

/// One-shot CRC-16/CCITT-FALSE over `buf`, seeded with `init`.
///
/// Pass [`CRC16_INIT`] for a fresh computation, or a previous return value
/// to extend a running checksum over concatenated inputs.
#[inline]
pub fn crc16(buf: &[u8], init: u16) -> u16 {
    let mut digest = CRC16_CCITT.digest_with_initial(init);
    digest.update(buf);
    digest.finalize()
}

/// Streaming CRC-16 state for feeding a record through the transaction
/// buffer one chunk at a time.
#[derive(Debug, Clone, Copy)]
pub struct Crc16State {
    value: u16,
}

impl Crc16State {
    /// Fresh state seeded with [`CRC16_INIT`].
    #[inline]
    pub fn new() -> Self {
        Crc16State { value: CRC16_INIT }
    }

    /// Resume from a previously observed register value.
    #[inline]
    pub fn with_initial(value: u16) -> Self {
        Crc16State { value }
    }

    /// Absorb the next chunk.
    #[inline]
    pub fn update(&mut self, buf: &[u8]) {
        self.value = crc16(buf, self.value);
    }

    /// Current register value.
    #[inline]
    pub fn value(&self) -> u16 {
        self.value
    }
}

impl Default for Crc16State {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The CRC-16/CCITT-FALSE check vector from the CRC catalog.
    #[test]
    fn check_vector() {
        assert_eq!(crc16(b"123456789", CRC16_INIT), 0x29B1);
    }

    /// Empty input leaves the register untouched.
    #[test]
    fn empty_input_is_identity() {
        assert_eq!(crc16(b"", CRC16_INIT), CRC16_INIT);
        assert_eq!(crc16(b"", 0x1234), 0x1234);
    }

    /// Concatenation law: hashing in two chunks equals hashing at once.
    #[test]
    fn chaining_matches_oneshot() {
        let whole = crc16(b"MTBAREAIDXpayload bytes", CRC16_INIT);
        let first = crc16(b"MTBAREAIDX", CRC16_INIT);
        assert_eq!(crc16(b"payload bytes", first), whole);
    }

    /// Streaming state matches the one-shot function chunk for chunk.
    #[test]
    fn streaming_matches_oneshot() {
        let data = b"a moderately long input split into uneven pieces";
        let mut state = Crc16State::new();
        for chunk in data.chunks(7) {
            state.update(chunk);
        }
        assert_eq!(state.value(), crc16(data, CRC16_INIT));
    }

    /// Distinct short keys used as index hashes should not trivially collide.
    #[test]
    fn distinct_keys_hash_differently() {
        assert_ne!(crc16(b"alpha", CRC16_INIT), crc16(b"beta", CRC16_INIT));
    }
}
