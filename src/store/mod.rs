//! The store: public API, locking, and the open/replay lifecycle.
//!
//! A [`KvStore`] owns two equal halves ("areas") of the configured region.
//! Appends go to the active area; when it fills, the garbage collector
//! compacts live records into the other half and swaps the two by writing
//! a new area-header record, which is the only commit point the on-medium
//! format has. Everything else in this module is bookkeeping around that
//! invariant.

mod area;
mod gc;
mod mutate;

use std::time::Duration;

use parking_lot::Mutex;

use crate::device::{align_up, BlockDevice, Geometry};
use crate::error::{Error, Result};
use crate::index::RamIndex;
use crate::record::{self, RecordCheck, MAX_KEY_SIZE};

pub use area::AREA_KEY;

/// Smallest transaction buffer the store will allocate.
pub const MIN_TXBUF_SIZE: u32 = 128;

/// Lock acquisition bound applied when [`Config::lock_timeout`] is left at
/// its default.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Placement and locking parameters for [`KvStore::open`].
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Absolute address of the storage region; must be a multiple of the
    /// erase-sector size.
    pub start_addr: u32,
    /// Region length in bytes; must be a positive even number of erase
    /// sectors. The store splits it into two equal areas.
    pub length: u32,
    /// Upper bound on waiting for the store mutex in every public
    /// operation; exhaustion returns [`Error::Timeout`].
    pub lock_timeout: Duration,
}

impl Config {
    pub fn new(start_addr: u32, length: u32) -> Self {
        Config {
            start_addr,
            length,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Point-in-time diagnostic snapshot, mainly for tests and health logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Base address of the area currently receiving appends.
    pub active_area_addr: u32,
    /// Version counter from the active area's header record.
    pub area_version: u16,
    /// Offset of the next append within the active area.
    pub free_space_offset: u32,
    /// Bytes occupied by live records plus the area header.
    pub consumed_size: u32,
    /// Live keys in the RAM index.
    pub entries: usize,
}

/// Power-fail-safe key-value store over a [`BlockDevice`].
///
/// All operations serialize on one internal mutex, so a store shared
/// between threads behaves as a linearizable register per key.
pub struct KvStore<D: BlockDevice> {
    inner: Mutex<Inner<D>>,
    lock_timeout: Duration,
}

pub(crate) struct Inner<D: BlockDevice> {
    device: D,
    geom: Geometry,
    area_size: u32,
    active_area_addr: u32,
    gc_area_addr: u32,
    area_version: u16,
    free_space_offset: u32,
    consumed_size: u32,
    txbuf: Vec<u8>,
    index: RamIndex,
}

/// Outcome of a RAM-index lookup: where the key's entry lives (or would
/// be inserted) and, when present, what its current record looks like.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FindResult {
    pub pos: usize,
    pub hash: u16,
    pub found: Option<FoundRecord>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FoundRecord {
    pub offset: u32,
    pub data_size: u32,
    pub record_size: u32,
}

impl<D: BlockDevice> KvStore<D> {
    /// Attach to (or freshly format) the region described by `config`.
    ///
    /// Validates alignment, allocates the transaction buffer and index,
    /// identifies the active area, and replays its log to rebuild the RAM
    /// index. A torn record at the log tail triggers a recovery
    /// compaction; every record before it survives.
    pub fn open(device: D, config: Config) -> Result<Self> {
        let inner = Inner::open(device, &config)?;
        Ok(KvStore {
            inner: Mutex::new(inner),
            lock_timeout: config.lock_timeout,
        })
    }

    /// Store `data` under `key`, replacing any previous value.
    pub fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let key = validate_key(key)?;
        self.lock()?.write_op(key, data, false).map_err(surface)
    }

    /// Copy the value stored under `key` into `buf`.
    ///
    /// Returns the value length. A `buf` shorter than the stored value
    /// fails with [`Error::BufferTooSmall`] carrying the required size.
    pub fn read(&self, key: &str, buf: &mut [u8]) -> Result<usize> {
        let key = validate_key(key)?;
        self.lock()?.read_op(key, buf).map_err(surface)
    }

    /// Remove `key`. Deleting an absent key succeeds.
    pub fn delete(&self, key: &str) -> Result<()> {
        let key = validate_key(key)?;
        self.lock()?.write_op(key, &[], true).map_err(surface)
    }

    /// Whether a live record exists for `key`.
    pub fn key_exists(&self, key: &str) -> Result<bool> {
        let key = validate_key(key)?;
        match self.lock()?.find_slot(key) {
            Ok(fr) => Ok(fr.found.is_some()),
            Err(err) => Err(surface(err)),
        }
    }

    /// Length in bytes of the value stored under `key`.
    pub fn value_size(&self, key: &str) -> Result<u32> {
        let key = validate_key(key)?;
        self.lock()?
            .find_slot(key)
            .map_err(surface)?
            .found
            .map(|f| f.data_size)
            .ok_or(Error::ItemNotFound)
    }

    /// Bytes consumed by live records plus the area header.
    pub fn size(&self) -> Result<u32> {
        Ok(self.lock()?.consumed_size)
    }

    /// Bytes still available for live records in one area.
    pub fn remaining(&self) -> Result<u32> {
        let inner = self.lock()?;
        Ok(inner.area_size - inner.consumed_size)
    }

    /// Erase all logical content. The next write lands in a freshly
    /// compacted area with a bumped version.
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.lock()?;
        inner.index.clear();
        inner.collect_garbage(None).map_err(surface)?;
        log::info!(
            "store reset, area version {} at {:#x}",
            inner.area_version,
            inner.active_area_addr
        );
        Ok(())
    }

    /// Diagnostic snapshot of the area state.
    pub fn stats(&self) -> Result<Stats> {
        let inner = self.lock()?;
        Ok(Stats {
            active_area_addr: inner.active_area_addr,
            area_version: inner.area_version,
            free_space_offset: inner.free_space_offset,
            consumed_size: inner.consumed_size,
            entries: inner.index.len(),
        })
    }

    /// Tear the store down and hand the block device back.
    ///
    /// Waits for the mutex without a timeout; ownership of `self`
    /// guarantees no other borrow can hold it indefinitely.
    pub fn into_device(self) -> D {
        self.inner.into_inner().device
    }

    fn lock(&self) -> Result<parking_lot::MutexGuard<'_, Inner<D>>> {
        self.inner
            .try_lock_for(self.lock_timeout)
            .ok_or(Error::Timeout)
    }
}

/// [`Error::ErasedData`] is an internal free-space sentinel; if external
/// interference makes it reach the public API, report it as corruption.
fn surface(err: Error) -> Error {
    match err {
        Error::ErasedData => Error::InvalidData,
        other => other,
    }
}

fn validate_key(key: &str) -> Result<&[u8]> {
    let bytes = key.as_bytes();
    if bytes.is_empty() || bytes.len() >= MAX_KEY_SIZE {
        return Err(Error::BadParam);
    }
    Ok(bytes)
}

impl<D: BlockDevice> Inner<D> {
    fn open(device: D, config: &Config) -> Result<Self> {
        if config.length == 0 || config.start_addr.checked_add(config.length).is_none() {
            return Err(Error::BadParam);
        }
        let geom = Geometry::probe(&device, config.start_addr)?;
        let es = geom.erase_size;
        let sectors = config.length / es;
        if config.start_addr % es != 0
            || config.length % es != 0
            || sectors == 0
            || sectors % 2 != 0
        {
            return Err(Error::Alignment);
        }

        let txbuf_size = align_up(
            geom.program_size.max(geom.read_size).max(MIN_TXBUF_SIZE),
            geom.program_size,
        ) as usize;
        let mut txbuf = Vec::new();
        txbuf
            .try_reserve_exact(txbuf_size)
            .map_err(|_| Error::MemAlloc)?;
        txbuf.resize(txbuf_size, 0);

        let area_size = config.length / 2;
        let mut inner = Inner {
            device,
            geom,
            area_size,
            active_area_addr: config.start_addr,
            gc_area_addr: config.start_addr + area_size,
            area_version: 0,
            free_space_offset: 0,
            consumed_size: 0,
            txbuf,
            index: RamIndex::new()?,
        };
        inner.select_active_area(config.start_addr)?;
        inner.replay()?;
        log::info!(
            "opened store at {:#x}, active area {:#x} version {}, {} keys, {} bytes live",
            config.start_addr,
            inner.active_area_addr,
            inner.area_version,
            inner.index.len(),
            inner.consumed_size
        );
        Ok(inner)
    }

    /// Locate `key` in the RAM index, disambiguating hash collisions by
    /// reading candidate records and comparing key bytes on the medium.
    ///
    /// On a miss, `pos` is the sorted insertion position (after any run of
    /// equal-hash entries, preserving insertion order among collisions).
    pub(crate) fn find_slot(&mut self, key: &[u8]) -> Result<FindResult> {
        let hash = crate::crc::crc16(key, crate::crc::CRC16_INIT);
        let mut pos = self.index.probe_start(hash);
        while pos < self.index.len() {
            let entry = self.index.entry(pos);
            if entry.hash != hash {
                break;
            }
            let addr = self.active_area_addr + entry.offset;
            let header = record::read_header(&mut self.device, addr)?;
            match record::verify_record(
                &mut self.device,
                &mut self.txbuf,
                addr,
                &header,
                RecordCheck {
                    expect_key: Some(key),
                    ..Default::default()
                },
            ) {
                Ok(()) => {
                    return Ok(FindResult {
                        pos,
                        hash,
                        found: Some(FoundRecord {
                            offset: entry.offset,
                            data_size: header.data_size,
                            record_size: record::record_size(&header, self.geom.program_size),
                        }),
                    });
                }
                Err(Error::ItemNotFound) => pos += 1,
                Err(err) => return Err(err),
            }
        }
        Ok(FindResult {
            pos,
            hash,
            found: None,
        })
    }

    fn read_op(&mut self, key: &[u8], buf: &mut [u8]) -> Result<usize> {
        let found = self.find_slot(key)?.found.ok_or(Error::ItemNotFound)?;
        let addr = self.active_area_addr + found.offset;
        let header = record::read_header(&mut self.device, addr)?;
        record::verify_record(
            &mut self.device,
            &mut self.txbuf,
            addr,
            &header,
            RecordCheck {
                expect_key: Some(key),
                value_out: Some(buf),
                ..Default::default()
            },
        )?;
        Ok(header.data_size as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_validation_bounds() {
        assert!(validate_key("a").is_ok());
        let max_ok = "k".repeat(MAX_KEY_SIZE - 1);
        assert!(validate_key(&max_ok).is_ok());
        assert_eq!(validate_key(""), Err(Error::BadParam));
        let too_long = "k".repeat(MAX_KEY_SIZE);
        assert_eq!(validate_key(&too_long), Err(Error::BadParam));
    }
}
