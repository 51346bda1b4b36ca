//! E2E Test Suite 01: Basic store operations
//!
//! Validates the core write/read/delete lifecycle against a fresh medium:
//! - open on a fully erased region formats area version 1
//! - write/read round trips, overwrites, zero-length values
//! - delete semantics and idempotence
//! - probe operations (key_exists, value_size)
//! - persistence across close/reopen
//! - key validation boundaries

use norkv::{Config, Error, Geometry, KvStore, MemDevice, HEADER_SIZE, MAX_KEY_SIZE};

fn geom() -> Geometry {
    Geometry {
        read_size: 4,
        program_size: 16,
        erase_size: 4096,
    }
}

fn open_fresh() -> KvStore<MemDevice> {
    let device = MemDevice::new(8192, geom());
    KvStore::open(device, Config::new(0, 8192)).expect("open should succeed")
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: open on an erased 2-sector region writes area header version 1
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_open_erased_region_formats_version_1() {
    let store = open_fresh();
    let stats = store.stats().unwrap();
    assert_eq!(stats.active_area_addr, 0);
    assert_eq!(stats.area_version, 1);

    // Area header record: 18-byte header + 10-byte key + 4-byte value,
    // aligned up to the 16-byte program page.
    let header_record = 32;
    assert_eq!(stats.free_space_offset, header_record);
    assert_eq!(store.size().unwrap(), header_record);
    assert_eq!(store.remaining().unwrap(), 4096 - header_record);

    // The on-medium bytes at offset 0 spell out the header record.
    let image = store.into_device().into_vec();
    assert_eq!(&image[0..4], &0xFACE_FACEu32.to_le_bytes());
    assert_eq!(&image[HEADER_SIZE..HEADER_SIZE + 10], b"MTBAREAIDX");
    // version = 1, format_version = 0, both little-endian
    assert_eq!(&image[HEADER_SIZE + 10..HEADER_SIZE + 14], &[1, 0, 0, 0]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: write then read returns the exact value bytes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_write_read_round_trip() {
    let store = open_fresh();
    store.write("alpha", &[0x01, 0x02, 0x03]).unwrap();

    let mut buf = [0u8; 8];
    let n = store.read("alpha", &mut buf).unwrap();
    assert_eq!(n, 3);
    assert_eq!(&buf[..3], &[0x01, 0x02, 0x03]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: the latest write wins
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_overwrite_returns_latest_value() {
    let store = open_fresh();
    store.write("alpha", &[0xAA]).unwrap();
    store.write("alpha", &[0xBB, 0xBB]).unwrap();

    let mut buf = [0u8; 4];
    let n = store.read("alpha", &mut buf).unwrap();
    assert_eq!(n, 2);
    assert_eq!(&buf[..2], &[0xBB, 0xBB]);
}

#[test]
fn test_missing_key_is_item_not_found() {
    let store = open_fresh();
    let mut buf = [0u8; 4];
    assert_eq!(store.read("ghost", &mut buf), Err(Error::ItemNotFound));
    assert_eq!(store.value_size("ghost"), Err(Error::ItemNotFound));
    assert!(!store.key_exists("ghost").unwrap());
}

#[test]
fn test_probe_operations() {
    let store = open_fresh();
    store.write("answer", &[42u8; 17]).unwrap();
    assert!(store.key_exists("answer").unwrap());
    assert_eq!(store.value_size("answer").unwrap(), 17);
}

#[test]
fn test_zero_length_value_permitted() {
    let store = open_fresh();
    store.write("flag", &[]).unwrap();
    assert!(store.key_exists("flag").unwrap());
    assert_eq!(store.value_size("flag").unwrap(), 0);
    let mut buf = [0u8; 1];
    assert_eq!(store.read("flag", &mut buf).unwrap(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Short destination buffers report the required size for a retry
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_short_buffer_reports_required_size() {
    let store = open_fresh();
    store.write("blob", &[7u8; 40]).unwrap();

    let mut small = [0u8; 10];
    assert_eq!(
        store.read("blob", &mut small),
        Err(Error::BufferTooSmall(40))
    );

    // Retry with the reported size.
    let mut exact = vec![0u8; 40];
    assert_eq!(store.read("blob", &mut exact).unwrap(), 40);
    assert_eq!(exact, vec![7u8; 40]);
}

#[test]
fn test_delete_is_idempotent() {
    let store = open_fresh();
    store.write("doomed", b"x").unwrap();
    store.delete("doomed").unwrap();
    store.delete("doomed").unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(store.read("doomed", &mut buf), Err(Error::ItemNotFound));
    // Deleting a key that never existed also succeeds.
    store.delete("never-was").unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Key length boundaries: 1 and MAX_KEY_SIZE-1 accepted, 0 and MAX rejected
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_key_length_boundaries() {
    let store = open_fresh();
    store.write("k", b"one").unwrap();

    let longest = "L".repeat(MAX_KEY_SIZE - 1);
    store.write(&longest, b"edge").unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(store.read(&longest, &mut buf).unwrap(), 4);

    assert_eq!(store.write("", b"v"), Err(Error::BadParam));
    let too_long = "L".repeat(MAX_KEY_SIZE);
    assert_eq!(store.write(&too_long, b"v"), Err(Error::BadParam));
    assert_eq!(store.read("", &mut buf), Err(Error::BadParam));
    assert_eq!(store.delete(&too_long), Err(Error::BadParam));
}

// ─────────────────────────────────────────────────────────────────────────────
// State persists across close and reopen
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_reopen_preserves_state() {
    let store = open_fresh();
    store.write("persist", b"across reopen").unwrap();
    store.write("second", b"me too").unwrap();
    store.delete("second").unwrap();
    let size_before = store.size().unwrap();

    let image = store.into_device().into_vec();
    let device = MemDevice::from_vec(image, geom(), 0xFF);
    let store = KvStore::open(device, Config::new(0, 8192)).unwrap();

    assert_eq!(store.size().unwrap(), size_before);
    let mut buf = [0u8; 32];
    let n = store.read("persist", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"across reopen");
    assert_eq!(store.read("second", &mut buf), Err(Error::ItemNotFound));
}

// ─────────────────────────────────────────────────────────────────────────────
// Concurrent callers serialize on the store lock
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_threaded_writers_smoke() {
    let store = open_fresh();
    std::thread::scope(|scope| {
        for t in 0..4 {
            let store = &store;
            scope.spawn(move || {
                let key = format!("thread{t}");
                for round in 0..10u8 {
                    store.write(&key, &[t as u8, round]).unwrap();
                }
            });
        }
    });
    for t in 0..4 {
        let mut buf = [0u8; 2];
        let n = store.read(&format!("thread{t}"), &mut buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(buf, [t as u8, 9]);
    }
}
