#![no_main]
use std::collections::BTreeMap;

use libfuzzer_sys::fuzz_target;
use norkv::{Config, Geometry, KvStore, MemDevice};

// Crash-consistency fuzzing: derive a workload and a power-cut point
// from the input, run until the cut fires, then reopen the surviving
// medium image and require the state to match some prefix of the
// completed mutations.
fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }
    let geom = Geometry {
        read_size: 1,
        program_size: 16,
        erase_size: 2048,
    };
    let region = 4096u32;
    let cut = u16::from_le_bytes([data[0], data[1]]) as u64 % 512;
    let partial = data[2] as usize % 16;
    let ops: Vec<(String, Option<Vec<u8>>)> = data[3..]
        .chunks(2)
        .filter(|c| c.len() == 2)
        .map(|c| {
            let key = format!("k{}", c[0] % 6);
            if c[1] % 5 == 0 {
                (key, None)
            } else {
                (key, Some(vec![c[1]; c[0] as usize % 60 + 1]))
            }
        })
        .collect();

    // Model states after each prefix of the workload.
    let mut states = vec![BTreeMap::new()];
    let mut current: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    for (key, value) in &ops {
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

    // Format first so the cut can only land inside the workload, then
    // arm the cut and run until it fires.
    let device = KvStore::open(MemDevice::new(region, geom), Config::new(0, region))
        .expect("format")
        .into_device();
    let mut device = MemDevice::from_vec(device.into_vec(), geom, 0xFF);
    device.cut_power_after_programs(cut, partial);
    let store = KvStore::open(device, Config::new(0, region)).expect("reopen formatted");

    let mut applied = 0usize;
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
        return;
    }

    let reopened = KvStore::open(
        MemDevice::from_vec(device.into_vec(), geom, 0xFF),
        Config::new(0, region),
    )
    .expect("open must survive a crash image");

    let mut state = BTreeMap::new();
    let mut buf = [0u8; 128];
    for i in 0..6 {
        let key = format!("k{i}");
        if let Ok(n) = reopened.read(&key, &mut buf) {
            state.insert(key, buf[..n].to_vec());
        }
    }

    assert!(
        state == states[applied] || state == states[applied + 1],
        "crash state is not prefix-consistent (applied {applied})"
    );
});
