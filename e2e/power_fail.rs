//! E2E Test Suite 04: Power-failure recovery
//!
//! Models crashes three ways and checks prefix-consistency after every
//! one: a corrupted record discovered at open, a power cut at every
//! possible program boundary of a deterministic workload (including cuts
//! landing inside garbage collection), and an interrupted erase. In all
//! cases reopen must succeed and yield the state after some prefix of
//! the completed mutations.

use std::collections::BTreeMap;

use norkv::{Config, Error, Geometry, KvStore, MemDevice};

fn geom() -> Geometry {
    Geometry {
        read_size: 4,
        program_size: 16,
        erase_size: 4096,
    }
}

const REGION: u32 = 8192;

fn open(device: MemDevice) -> KvStore<MemDevice> {
    KvStore::open(device, Config::new(0, REGION)).expect("open must survive any crash image")
}

type Model = BTreeMap<String, Vec<u8>>;

/// Deterministic workload: six keys, mixed sizes, every seventh op a
/// delete. Sized so a full run crosses at least one collection.
fn workload() -> Vec<(String, Option<Vec<u8>>)> {
    (0..60usize)
        .map(|i| {
            let key = format!("k{}", i % 6);
            if i % 7 == 3 {
                (key, None)
            } else {
                let len = (i * 13) % 120 + 1;
                (key, Some(vec![i as u8; len]))
            }
        })
        .collect()
}

/// Model states after applying each prefix of the workload.
fn snapshots(ops: &[(String, Option<Vec<u8>>)]) -> Vec<Model> {
    let mut states = vec![Model::new()];
    let mut current = Model::new();
    for (key, value) in ops {
        match value {
            Some(v) => {
                current.insert(key.clone(), v.clone());
            }
            None => {
                current.remove(key);
            }
        }
        states.push(current.clone());
    }
    states
}

fn dump(store: &KvStore<MemDevice>, keys: &[String]) -> Model {
    let mut out = Model::new();
    let mut buf = [0u8; 256];
    for key in keys {
        match store.read(key, &mut buf) {
            Ok(n) => {
                out.insert(key.clone(), buf[..n].to_vec());
            }
            Err(Error::ItemNotFound) => {}
            Err(err) => panic!("unexpected read error for {key}: {err}"),
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Corruption discovered at open drops the corrupt record and its suffix
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_bit_flip_drops_corrupt_record_and_suffix() {
    let store = open(MemDevice::new(REGION, geom()));
    store.write("aa", b"first").unwrap();
    let bb_offset = store.stats().unwrap().free_space_offset;
    store.write("bb", b"second").unwrap();
    store.write("cc", b"third").unwrap();
    let active = store.stats().unwrap().active_area_addr;

    let mut image = store.into_device().into_vec();
    // Flip one bit inside bb's value region (18-byte header, 2-byte key).
    image[(active + bb_offset) as usize + 18 + 2 + 1] ^= 0x04;

    let store = open(MemDevice::from_vec(image, geom(), 0xFF));
    let mut buf = [0u8; 16];
    let n = store.read("aa", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"first");
    // bb is corrupt; cc followed it and is dropped with it.
    assert_eq!(store.read("bb", &mut buf), Err(Error::ItemNotFound));
    assert_eq!(store.read("cc", &mut buf), Err(Error::ItemNotFound));

    // Recovery compacted into the other half.
    assert_ne!(store.stats().unwrap().active_area_addr, active);
    assert_eq!(store.stats().unwrap().entries, 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Exhaustive cut sweep: every program boundary of the workload
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_power_cut_sweep_is_prefix_consistent() {
    let ops = workload();
    let states = snapshots(&ops);
    let keys: Vec<String> = (0..6).map(|i| format!("k{i}")).collect();

    let mut cut = 0u64;
    loop {
        // Format first so the armed cut can only land inside the workload
        // (a cut during formatting is covered by its own test below).
        let mut device = open(MemDevice::new(REGION, geom())).into_device();
        // Vary where inside the page the torn program stops.
        device.cut_power_after_programs(cut, (cut as usize * 7) % 16);
        let store = open(device);

        let mut applied = 0;
        let mut failed = false;
        for (key, value) in &ops {
            let result = match value {
                Some(v) => store.write(key, v),
                None => store.delete(key),
            };
            match result {
                Ok(()) => applied += 1,
                Err(_) => {
                    failed = true;
                    break;
                }
            }
        }

        let device = store.into_device();
        if !failed {
            // The cut never fired; the sweep has covered every boundary.
            assert!(!device.is_powered_off());
            break;
        }

        let reopened = open(MemDevice::from_vec(device.into_vec(), geom(), 0xFF));
        let state = dump(&reopened, &keys);
        // The interrupted op either vanished or fully landed.
        assert!(
            state == states[applied] || state == states[applied + 1],
            "cut {cut}: state matches neither prefix {applied} nor {}",
            applied + 1
        );
        let stats = reopened.stats().unwrap();
        assert_eq!(
            reopened.size().unwrap() + reopened.remaining().unwrap(),
            REGION / 2,
            "cut {cut}: accounting broken"
        );
        assert_eq!(stats.entries, state.len());

        cut += 1;
    }
    // The workload performs real work before the sweep ends.
    assert!(cut > 50, "sweep ended after only {cut} cuts");
}

// ─────────────────────────────────────────────────────────────────────────────
// A torn area header at open is treated as an unformatted half
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_open_on_torn_area_header_reformats() {
    let mut device = MemDevice::new(REGION, geom());
    // A crash during first-time formatting can leave a prefix of the area
    // header: valid magic, erased bytes after it.
    device.data_mut()[0..4].copy_from_slice(&0xFACE_FACEu32.to_le_bytes());
    device.data_mut()[4] = 0;

    let store = open(device);
    let stats = store.stats().unwrap();
    assert_eq!(stats.area_version, 1);
    assert_eq!(stats.entries, 0);
    store.write("works", b"again").unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Interrupted erase: the old area header survives, so nothing is lost
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_interrupted_gc_erase_preserves_old_area() {
    let mut device = MemDevice::new(REGION, geom());
    device.cut_power_after_erases(1); // skip the open-time format erase
    let store = open(device);

    store.write("stable", b"keep me").unwrap();
    // Churn until a collection starts; its first erase call dies.
    let mut err = None;
    for round in 0..100u8 {
        if let Err(e) = store.write("churn", &[round; 180]) {
            err = Some(e);
            break;
        }
    }
    assert_eq!(err, Some(Error::EraseFail));

    let reopened = open(MemDevice::from_vec(
        store.into_device().into_vec(),
        geom(),
        0xFF,
    ));
    let mut buf = [0u8; 256];
    let n = reopened.read("stable", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"keep me");
    // The churn key keeps its last committed value.
    let n = reopened.read("churn", &mut buf).unwrap();
    assert_eq!(n, 180);
}

// ─────────────────────────────────────────────────────────────────────────────
// A torn append is invisible after reopen; earlier writes survive
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_torn_append_is_rolled_back() {
    let mut device = MemDevice::new(REGION, geom());
    let store = open(device.clone());
    store.write("a", b"alpha").unwrap();
    store.write("b", b"beta").unwrap();
    // Count the programs those two appends took, then replay them with a
    // cut landing inside the second append.
    let programs = store.into_device().program_calls();

    device.cut_power_after_programs(programs - 1, 7);
    let store = open(device);
    store.write("a", b"alpha").unwrap();
    assert!(store.write("b", b"beta").is_err());

    let reopened = open(MemDevice::from_vec(
        store.into_device().into_vec(),
        geom(),
        0xFF,
    ));
    let mut buf = [0u8; 16];
    let n = reopened.read("a", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"alpha");
    assert_eq!(reopened.read("b", &mut buf), Err(Error::ItemNotFound));
}
