//! E2E Test Suite 02: Capacity accounting
//!
//! Exercises the logical and physical capacity checks:
//! - size() + remaining() always equals the area size
//! - a value exactly filling the free space is accepted
//! - one byte more triggers compaction, then succeeds or reports
//!   StorageFull depending on the logical projection
//! - tombstones consume physical space but no logical space

use norkv::{Config, Error, Geometry, KvStore, MemDevice};

// Byte-granular geometry keeps the arithmetic exact: records are not
// padded, so the header record is 32 bytes and a one-byte-key record is
// 19 + data bytes.
fn geom() -> Geometry {
    Geometry {
        read_size: 1,
        program_size: 1,
        erase_size: 1024,
    }
}

const AREA_SIZE: u32 = 1024;
const HEADER_RECORD: u32 = 32;

fn open_fresh() -> KvStore<MemDevice> {
    let device = MemDevice::new(2 * AREA_SIZE, geom());
    KvStore::open(device, Config::new(0, 2 * AREA_SIZE)).unwrap()
}

fn assert_accounting(store: &KvStore<MemDevice>) {
    assert_eq!(
        store.size().unwrap() + store.remaining().unwrap(),
        AREA_SIZE
    );
}

#[test]
fn test_size_remaining_accounting_through_mutations() {
    let store = open_fresh();
    assert_eq!(store.size().unwrap(), HEADER_RECORD);
    assert_accounting(&store);

    store.write("one", &[0u8; 100]).unwrap();
    assert_eq!(store.size().unwrap(), HEADER_RECORD + 18 + 3 + 100);
    assert_accounting(&store);

    store.write("two", &[0u8; 50]).unwrap();
    assert_accounting(&store);

    // Overwriting replaces the old record's contribution.
    store.write("one", &[0u8; 10]).unwrap();
    assert_eq!(
        store.size().unwrap(),
        HEADER_RECORD + (18 + 3 + 10) + (18 + 3 + 50)
    );
    assert_accounting(&store);

    store.delete("two").unwrap();
    assert_eq!(store.size().unwrap(), HEADER_RECORD + 18 + 3 + 10);
    assert_accounting(&store);
}

#[test]
fn test_tombstone_occupies_no_logical_space() {
    let store = open_fresh();
    store.write("k1", b"vv").unwrap();
    let before = store.stats().unwrap();
    store.delete("k1").unwrap();
    let after = store.stats().unwrap();

    // The tombstone advanced the append offset but freed the logical
    // space the record held.
    assert!(after.free_space_offset > before.free_space_offset);
    assert_eq!(after.consumed_size, HEADER_RECORD);
}

// ─────────────────────────────────────────────────────────────────────────────
// Exact-fit boundary: filling the last free byte works, one more does not
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_value_exactly_filling_free_space() {
    let store = open_fresh();
    let capacity = store.remaining().unwrap();
    // One-byte key: record overhead is 19 bytes.
    let fill = (capacity - 19) as usize;
    store.write("k", &vec![0x5A; fill]).unwrap();

    assert_eq!(store.size().unwrap(), AREA_SIZE);
    assert_eq!(store.remaining().unwrap(), 0);
    assert_accounting(&store);

    let mut buf = vec![0u8; fill];
    assert_eq!(store.read("k", &mut buf).unwrap(), fill);
    assert!(buf.iter().all(|&b| b == 0x5A));
}

#[test]
fn test_add_beyond_capacity_is_storage_full() {
    let store = open_fresh();
    let capacity = store.remaining().unwrap();
    store.write("k", &vec![1u8; (capacity - 19) as usize]).unwrap();

    // A second key cannot fit even after compaction.
    assert_eq!(store.write("x", &[0]), Err(Error::StorageFull));
    // The failed add changed nothing.
    assert_eq!(store.size().unwrap(), AREA_SIZE);
    let mut buf = vec![0u8; capacity as usize];
    assert_eq!(store.read("k", &mut buf).unwrap() as u32, capacity - 19);
}

#[test]
fn test_update_at_capacity_succeeds_via_compaction() {
    let store = open_fresh();
    let fill = (store.remaining().unwrap() - 19) as usize;
    store.write("k", &vec![1u8; fill]).unwrap();
    let version_before = store.stats().unwrap().area_version;

    // No free space is left, so this update can only go through the
    // collector's folded-write path.
    store.write("k", &vec![2u8; fill]).unwrap();
    let stats = store.stats().unwrap();
    assert_ne!(stats.area_version, version_before);

    let mut buf = vec![0u8; fill];
    store.read("k", &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 2));

    // Growing the value by one byte overflows the logical projection.
    assert_eq!(
        store.write("k", &vec![3u8; fill + 1]),
        Err(Error::StorageFull)
    );
}

#[test]
fn test_delete_at_capacity_folds_into_compaction() {
    let store = open_fresh();
    let fill = (store.remaining().unwrap() - 19) as usize;
    store.write("k", &vec![1u8; fill]).unwrap();

    // No room for a tombstone; the delete folds into a compaction pass.
    store.delete("k").unwrap();
    assert_eq!(store.size().unwrap(), HEADER_RECORD);
    assert!(!store.key_exists("k").unwrap());
    assert_accounting(&store);
}

#[test]
fn test_oversized_value_rejected_without_touching_medium() {
    let store = open_fresh();
    store.write("keep", b"intact").unwrap();
    let stats_before = store.stats().unwrap();

    let err = store.write("huge", &vec![0u8; AREA_SIZE as usize]);
    assert_eq!(err, Err(Error::StorageFull));
    assert_eq!(store.stats().unwrap(), stats_before);

    let mut buf = [0u8; 16];
    let n = store.read("keep", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"intact");
}
