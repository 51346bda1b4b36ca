#![no_main]
use std::collections::HashMap;

use libfuzzer_sys::fuzz_target;
use norkv::{Config, Error, Geometry, KvStore, MemDevice};

// Interpret the fuzz input as a stream of operations over a small key
// universe and check every observable result against a HashMap model.
fuzz_target!(|data: &[u8]| {
    let geom = Geometry {
        read_size: 1,
        program_size: 8,
        erase_size: 2048,
    };
    let store = KvStore::open(MemDevice::new(4096, geom), Config::new(0, 4096))
        .expect("fresh region must open");
    let mut model: HashMap<String, Vec<u8>> = HashMap::new();

    let mut bytes = data.iter().copied();
    while let (Some(op), Some(sel)) = (bytes.next(), bytes.next()) {
        let key = format!("k{}", sel % 8);
        match op % 4 {
            0 | 1 => {
                let len = (op as usize).wrapping_mul(7) % 48;
                let value: Vec<u8> = bytes.by_ref().take(len).collect();
                match store.write(&key, &value) {
                    Ok(()) => {
                        model.insert(key, value);
                    }
                    Err(Error::StorageFull) => {}
                    Err(err) => panic!("write failed: {err}"),
                }
            }
            2 => {
                store.delete(&key).expect("delete never fails in-memory");
                model.remove(&key);
            }
            3 => {
                let mut buf = [0u8; 64];
                match (store.read(&key, &mut buf), model.get(&key)) {
                    (Ok(n), Some(v)) => assert_eq!(&buf[..n], &v[..]),
                    (Err(Error::ItemNotFound), None) => {}
                    (got, want) => panic!("read mismatch: {got:?} vs model {want:?}"),
                }
            }
            _ => unreachable!(),
        }
    }

    // Final sweep: the store and the model agree on every key, and the
    // capacity counters still add up.
    let mut buf = [0u8; 64];
    for i in 0..8 {
        let key = format!("k{i}");
        match (store.read(&key, &mut buf), model.get(&key)) {
            (Ok(n), Some(v)) => assert_eq!(&buf[..n], &v[..]),
            (Err(Error::ItemNotFound), None) => {}
            (got, want) => panic!("final sweep mismatch for {key}: {got:?} vs {want:?}"),
        }
    }
    assert_eq!(store.size().unwrap() + store.remaining().unwrap(), 2048);
});
