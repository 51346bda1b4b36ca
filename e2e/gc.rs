//! E2E Test Suite 03: Garbage collection and reset
//!
//! Drives the store until the active area fills and verifies that
//! compaction preserves exactly the live records, swaps the active area,
//! and bumps the version. Also covers reset and long churn across many
//! collections.

use norkv::{Config, Error, Geometry, KvStore, MemDevice};

fn geom() -> Geometry {
    Geometry {
        read_size: 4,
        program_size: 16,
        erase_size: 4096,
    }
}

fn open_fresh() -> KvStore<MemDevice> {
    let device = MemDevice::new(8192, geom());
    KvStore::open(device, Config::new(0, 8192)).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Test: churning one key through ~4000 bytes of appends forces a swap
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_single_key_churn_compacts_and_swaps() {
    let store = open_fresh();
    let initial_area = store.stats().unwrap().active_area_addr;
    let mut swaps = 0;
    let mut last_area = initial_area;

    // Each record is 18 + 6 + 100 bytes, padded to 128; ~32 writes
    // overrun the 4096-byte area.
    for round in 0..40u8 {
        store.write("victim", &[round; 100]).unwrap();
        let area = store.stats().unwrap().active_area_addr;
        if area != last_area {
            swaps += 1;
            last_area = area;
        }
    }

    assert!(swaps >= 1, "expected at least one area swap");
    let stats = store.stats().unwrap();
    assert_eq!(stats.entries, 1);

    let mut buf = [0u8; 128];
    let n = store.read("victim", &mut buf).unwrap();
    assert_eq!(n, 100);
    assert!(buf[..100].iter().all(|&b| b == 39));
}

#[test]
fn test_version_increments_across_collections() {
    let store = open_fresh();
    let mut last_version = store.stats().unwrap().area_version;
    let mut bumps = 0;
    for round in 0..60u16 {
        store.write("churn", &vec![round as u8; 200]).unwrap();
        let version = store.stats().unwrap().area_version;
        if version != last_version {
            assert_eq!(version, last_version.wrapping_add(1));
            bumps += 1;
            last_version = version;
        }
    }
    assert!(bumps >= 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Compaction keeps live records and drops superseded and deleted ones
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_live_records_survive_compaction() {
    let store = open_fresh();
    for i in 0..10u8 {
        store.write(&format!("key{i}"), &[i; 20]).unwrap();
    }
    for i in (0..10u8).step_by(2) {
        store.write(&format!("key{i}"), &[i ^ 0xFF; 24]).unwrap();
    }
    for i in (1..10u8).step_by(2) {
        store.delete(&format!("key{i}")).unwrap();
    }

    // Churn a filler key until compaction has happened at least once.
    let before = store.stats().unwrap().active_area_addr;
    let mut churned = 0;
    while store.stats().unwrap().active_area_addr == before {
        store.write("filler", &[churned; 180]).unwrap();
        churned = churned.wrapping_add(1);
    }

    for i in 0..10u8 {
        let key = format!("key{i}");
        let mut buf = [0u8; 32];
        if i % 2 == 0 {
            let n = store.read(&key, &mut buf).unwrap();
            assert_eq!(n, 24);
            assert!(buf[..24].iter().all(|&b| b == i ^ 0xFF));
        } else {
            assert_eq!(store.read(&key, &mut buf), Err(Error::ItemNotFound));
        }
    }
    assert_eq!(store.stats().unwrap().entries, 6); // 5 evens + filler
}

#[test]
fn test_state_survives_reopen_after_compactions() {
    let store = open_fresh();
    for round in 0..50u8 {
        store.write("churn", &[round; 150]).unwrap();
        store.write(&format!("stable{}", round % 3), &[round; 8]).unwrap();
    }
    let stats = store.stats().unwrap();
    assert!(stats.area_version > 1);

    let image = store.into_device().into_vec();
    let store = KvStore::open(MemDevice::from_vec(image, geom(), 0xFF), Config::new(0, 8192)).unwrap();

    assert_eq!(store.stats().unwrap().consumed_size, stats.consumed_size);
    let mut buf = [0u8; 256];
    assert_eq!(store.read("churn", &mut buf).unwrap(), 150);
    assert!(buf[..150].iter().all(|&b| b == 49));
    for k in 0..3u8 {
        let n = store.read(&format!("stable{k}"), &mut buf).unwrap();
        assert_eq!(n, 8);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reset
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_reset_clears_logical_content() {
    let store = open_fresh();
    for i in 0..5u8 {
        store.write(&format!("key{i}"), &[i; 30]).unwrap();
    }
    let version_before = store.stats().unwrap().area_version;

    store.reset().unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.area_version, version_before.wrapping_add(1));
    // Only the area header remains.
    assert_eq!(store.size().unwrap(), stats.free_space_offset);
    let mut buf = [0u8; 64];
    for i in 0..5u8 {
        assert_eq!(
            store.read(&format!("key{i}"), &mut buf),
            Err(Error::ItemNotFound)
        );
    }

    // The store is immediately usable again.
    store.write("reborn", b"fresh").unwrap();
    let n = store.read("reborn", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"fresh");
}

#[test]
fn test_reset_survives_reopen() {
    let store = open_fresh();
    store.write("gone", b"bytes").unwrap();
    store.reset().unwrap();

    let image = store.into_device().into_vec();
    let store = KvStore::open(MemDevice::from_vec(image, geom(), 0xFF), Config::new(0, 8192)).unwrap();
    assert!(!store.key_exists("gone").unwrap());
    assert_eq!(store.stats().unwrap().entries, 0);
}
