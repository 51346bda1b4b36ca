//! E2E Test Suite 05: Hash-collision handling
//!
//! The RAM index stores only a CRC-16 of each key, so distinct keys can
//! share an index hash. These tests brute-force real collision pairs and
//! verify that key bytes on the medium, not the hash, decide every
//! lookup.

use std::collections::HashMap;

use norkv::{crc16, Config, Error, Geometry, KvStore, MemDevice, CRC16_INIT};

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

/// Find two distinct 3-letter keys with equal CRC-16 hashes. 17576 keys
/// over a 16-bit hash space collide thousands of times; the first pair
/// found is deterministic.
fn collision_pair() -> (String, String) {
    let mut seen: HashMap<u16, String> = HashMap::new();
    for a in b'a'..=b'z' {
        for b in b'a'..=b'z' {
            for c in b'a'..=b'z' {
                let key = String::from_utf8(vec![a, b, c]).unwrap();
                let hash = crc16(key.as_bytes(), CRC16_INIT);
                if let Some(first) = seen.get(&hash) {
                    return (first.clone(), key);
                }
                seen.insert(hash, key);
            }
        }
    }
    panic!("no CRC-16 collision among 3-letter keys");
}

#[test]
fn test_collision_pair_is_real() {
    let (a, b) = collision_pair();
    assert_ne!(a, b);
    assert_eq!(
        crc16(a.as_bytes(), CRC16_INIT),
        crc16(b.as_bytes(), CRC16_INIT)
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Colliding keys coexist and reads tell them apart
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_colliding_keys_coexist() {
    let (a, b) = collision_pair();
    let store = open_fresh();
    store.write(&a, b"value of a").unwrap();
    store.write(&b, b"value of b").unwrap();

    let mut buf = [0u8; 16];
    let n = store.read(&a, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"value of a");
    let n = store.read(&b, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"value of b");
    assert_eq!(store.stats().unwrap().entries, 2);
}

#[test]
fn test_deleting_one_collision_keeps_the_other() {
    let (a, b) = collision_pair();
    let store = open_fresh();
    store.write(&a, b"aaa").unwrap();
    store.write(&b, b"bbb").unwrap();

    store.delete(&a).unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(store.read(&a, &mut buf), Err(Error::ItemNotFound));
    let n = store.read(&b, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"bbb");
}

#[test]
fn test_updating_one_collision_leaves_the_other_untouched() {
    let (a, b) = collision_pair();
    let store = open_fresh();
    store.write(&a, b"old a").unwrap();
    store.write(&b, b"old b").unwrap();
    store.write(&a, b"new a").unwrap();

    let mut buf = [0u8; 8];
    let n = store.read(&a, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"new a");
    let n = store.read(&b, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"old b");
    assert_eq!(store.stats().unwrap().entries, 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Collisions survive replay and compaction
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_collisions_survive_reopen() {
    let (a, b) = collision_pair();
    let store = open_fresh();
    store.write(&a, b"persisted a").unwrap();
    store.write(&b, b"persisted b").unwrap();

    let image = store.into_device().into_vec();
    let store = KvStore::open(MemDevice::from_vec(image, geom(), 0xFF), Config::new(0, 8192)).unwrap();

    let mut buf = [0u8; 16];
    let n = store.read(&a, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"persisted a");
    let n = store.read(&b, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"persisted b");
}

#[test]
fn test_collisions_survive_compaction() {
    let (a, b) = collision_pair();
    let store = open_fresh();
    store.write(&a, b"compact a").unwrap();
    store.write(&b, b"compact b").unwrap();

    // Churn until the collector has swapped areas at least once.
    let before = store.stats().unwrap().active_area_addr;
    let mut round = 0u8;
    while store.stats().unwrap().active_area_addr == before {
        store.write("churn", &[round; 200]).unwrap();
        round = round.wrapping_add(1);
    }

    let mut buf = [0u8; 16];
    let n = store.read(&a, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"compact a");
    let n = store.read(&b, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"compact b");
}
