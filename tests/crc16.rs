// Integration tests for src/crc.rs, the CRC-16/CCITT-FALSE wrapper.
//
// Verifies the checksum against published vectors and the chaining law
// the record codec depends on: extending a checksum over concatenated
// inputs must equal checksumming the concatenation.

use norkv::crc::{crc16, Crc16State, CRC16_INIT};

/// Catalog check value for CRC-16/IBM-3740 (aka CCITT-FALSE).
#[test]
fn catalog_check_value() {
    assert_eq!(crc16(b"123456789", CRC16_INIT), 0x29B1);
}

/// A fresh register over empty input stays at the seed.
#[test]
fn empty_input_returns_seed() {
    assert_eq!(crc16(b"", CRC16_INIT), CRC16_INIT);
    assert_eq!(crc16(b"", 0x0000), 0x0000);
    assert_eq!(crc16(b"", 0xA5A5), 0xA5A5);
}

/// crc16(a ‖ b, init) == crc16(b, crc16(a, init)) for arbitrary splits.
#[test]
fn concatenation_law_over_all_splits() {
    let data: Vec<u8> = (0u8..=200).collect();
    let whole = crc16(&data, CRC16_INIT);
    for split in 0..=data.len() {
        let first = crc16(&data[..split], CRC16_INIT);
        assert_eq!(
            crc16(&data[split..], first),
            whole,
            "split at {split} diverged"
        );
    }
}

/// The streaming state and the one-shot function agree byte for byte.
#[test]
fn streaming_state_agrees_with_oneshot() {
    let data = b"power-fail-safe key-value store";
    let mut state = Crc16State::new();
    for byte in data {
        state.update(core::slice::from_ref(byte));
    }
    assert_eq!(state.value(), crc16(data, CRC16_INIT));
}

/// Single-bit corruption anywhere in a buffer changes the checksum.
#[test]
fn single_bit_flips_are_detected() {
    let data = [0x31u8, 0x32, 0x33, 0x34, 0x55, 0xAA, 0x00, 0xFF];
    let clean = crc16(&data, CRC16_INIT);
    for byte in 0..data.len() {
        for bit in 0..8 {
            let mut corrupt = data;
            corrupt[byte] ^= 1 << bit;
            assert_ne!(crc16(&corrupt, CRC16_INIT), clean);
        }
    }
}
