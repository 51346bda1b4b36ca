//! E2E Test Suite 06: Device geometries and region validation
//!
//! The store must behave identically whether the medium is byte-granular
//! (read = program = erase = 1) or has large, mismatched granularities.
//! Also covers the open-time validation of region placement.

use std::collections::BTreeMap;

use norkv::{Config, Error, Geometry, KvStore, MemDevice};

fn run_workload(store: &KvStore<MemDevice>) -> BTreeMap<String, Vec<u8>> {
    for i in 0..30usize {
        let key = format!("key{}", i % 5);
        store.write(&key, &vec![i as u8; (i * 11) % 90 + 1]).unwrap();
    }
    store.delete("key2").unwrap();
    store.write("key0", b"final value").unwrap();

    let mut state = BTreeMap::new();
    let mut buf = [0u8; 128];
    for i in 0..5 {
        let key = format!("key{i}");
        if let Ok(n) = store.read(&key, &mut buf) {
            state.insert(key, buf[..n].to_vec());
        }
    }
    state
}

// ─────────────────────────────────────────────────────────────────────────────
// Byte-granular and page-granular media agree on logical state
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_unit_geometry_matches_page_geometry() {
    let unit = KvStore::open(
        MemDevice::with_unit_geometry(8192),
        Config::new(0, 8192),
    )
    .unwrap();
    let paged = KvStore::open(
        MemDevice::new(
            8192,
            Geometry {
                read_size: 4,
                program_size: 16,
                erase_size: 4096,
            },
        ),
        Config::new(0, 8192),
    )
    .unwrap();

    let state_unit = run_workload(&unit);
    let state_paged = run_workload(&paged);
    assert_eq!(state_unit, state_paged);
    assert_eq!(state_unit.len(), 4);
    assert_eq!(state_unit["key0"], b"final value");
}

#[test]
fn test_large_program_pages() {
    // Pages larger than the minimum transaction buffer: every record
    // occupies at least one 256-byte page.
    let store = KvStore::open(
        MemDevice::new(
            16384,
            Geometry {
                read_size: 4,
                program_size: 256,
                erase_size: 4096,
            },
        ),
        Config::new(0, 16384),
    )
    .unwrap();

    let state = run_workload(&store);
    assert_eq!(state["key0"], b"final value");
    // Each live record costs a full page.
    assert_eq!(store.size().unwrap() % 256, 0);
}

#[test]
fn test_read_size_larger_than_program_size() {
    let store = KvStore::open(
        MemDevice::new(
            8192,
            Geometry {
                read_size: 64,
                program_size: 32,
                erase_size: 4096,
            },
        ),
        Config::new(0, 8192),
    )
    .unwrap();
    let state = run_workload(&store);
    assert_eq!(state["key0"], b"final value");
}

#[test]
fn test_region_inside_larger_medium() {
    let geometry = Geometry {
        read_size: 1,
        program_size: 8,
        erase_size: 2048,
    };
    let store = KvStore::open(
        MemDevice::new(16384, geometry),
        Config::new(4096, 8192),
    )
    .unwrap();
    store.write("inner", b"region").unwrap();
    assert_eq!(store.stats().unwrap().active_area_addr, 4096);

    // Bytes outside the configured region stay erased.
    let image = store.into_device().into_vec();
    assert!(image[..4096].iter().all(|&b| b == 0xFF));
    assert!(image[12288..].iter().all(|&b| b == 0xFF));
}

// ─────────────────────────────────────────────────────────────────────────────
// Region validation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_open_rejects_bad_regions() {
    let geometry = Geometry {
        read_size: 1,
        program_size: 16,
        erase_size: 4096,
    };

    // Zero length.
    assert!(matches!(
        KvStore::open(MemDevice::new(8192, geometry), Config::new(0, 0)),
        Err(Error::BadParam)
    ));
    // Unaligned start address.
    assert!(matches!(
        KvStore::open(MemDevice::new(16384, geometry), Config::new(100, 8192)),
        Err(Error::Alignment)
    ));
    // Length not a multiple of the sector size.
    assert!(matches!(
        KvStore::open(MemDevice::new(16384, geometry), Config::new(0, 6000)),
        Err(Error::Alignment)
    ));
    // Odd sector count cannot split into two equal areas.
    assert!(matches!(
        KvStore::open(MemDevice::new(16384, geometry), Config::new(0, 3 * 4096)),
        Err(Error::Alignment)
    ));
}

#[test]
fn test_open_rejects_pages_not_tiling_sectors() {
    let geometry = Geometry {
        read_size: 1,
        program_size: 48,
        erase_size: 64,
    };
    assert!(matches!(
        KvStore::open(MemDevice::new(1024, geometry), Config::new(0, 256)),
        Err(Error::Alignment)
    ));
}
