//! Area identification, formatting, and log replay.
//!
//! Each half of the region, when active, starts with an area-header
//! record: an ordinary record keyed [`AREA_KEY`] whose 4-byte value holds
//! the area's version counter. At open time both halves are probed; the
//! half with the newer version (modulo 2^16, half-window comparison) is
//! the active one. Replay then walks the active log record by record,
//! rebuilding the RAM index, stopping at the first erased offset, and
//! converting a torn or corrupt tail into a recovery compaction.

use super::Inner;
use crate::device::{align_up, BlockDevice};
use crate::error::{Error, Result};
use crate::index::IndexEntry;
use crate::record::{self, RecordCheck, HEADER_SIZE, MAX_KEY_SIZE};

/// Key of the area-header record at offset 0 of an active area.
pub const AREA_KEY: &[u8] = b"MTBAREAIDX";

/// Format version stored in the area-header value.
pub(super) const AREA_FORMAT_VERSION: u16 = 0;

/// `a` is newer than `b` under wrap-around version arithmetic: the
/// difference modulo 2^16 must fall in `1..0x8000`. This makes `0` the
/// successor of `0xFFFF` and keeps comparisons meaningful across more
/// than 65535 collections.
pub(super) fn version_newer(a: u16, b: u16) -> bool {
    let d = a.wrapping_sub(b);
    d != 0 && d < 0x8000
}

/// Serialize the area-header value: `{version, format_version}`, both
/// little-endian.
pub(super) fn encode_area_value(version: u16) -> [u8; 4] {
    let mut out = [0u8; 4];
    out[0..2].copy_from_slice(&version.to_le_bytes());
    out[2..4].copy_from_slice(&AREA_FORMAT_VERSION.to_le_bytes());
    out
}

impl<D: BlockDevice> Inner<D> {
    /// On-medium size of the area-header record.
    pub(super) fn area_header_size(&self) -> u32 {
        align_up(
            (HEADER_SIZE + AREA_KEY.len() + 4) as u32,
            self.geom.program_size,
        )
    }

    /// Validate the area-header record at `base`; `None` means the half
    /// is erased, corrupt, or keyed by something else. Device failures
    /// abort the probe.
    fn probe_area(&mut self, base: u32) -> Result<Option<u16>> {
        let header = match record::read_header(&mut self.device, base) {
            Ok(h) => h,
            Err(Error::ErasedData) | Err(Error::InvalidData) => return Ok(None),
            Err(err) => return Err(err),
        };
        if header.data_size != 4 || header.is_tombstone() {
            return Ok(None);
        }
        let mut value = [0u8; 4];
        match record::verify_record(
            &mut self.device,
            &mut self.txbuf,
            base,
            &header,
            RecordCheck {
                expect_key: Some(AREA_KEY),
                value_out: Some(&mut value),
                ..Default::default()
            },
        ) {
            Ok(()) => Ok(Some(u16::from_le_bytes([value[0], value[1]]))),
            Err(Error::ItemNotFound) | Err(Error::InvalidData) | Err(Error::ErasedData) => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Decide which half is active, formatting the region when neither
    /// half carries a valid header.
    pub(super) fn select_active_area(&mut self, start_addr: u32) -> Result<()> {
        let lower = start_addr;
        let upper = start_addr + self.area_size;
        let tag_a = self.probe_area(lower)?;
        let tag_b = self.probe_area(upper)?;

        let (active, version) = match (tag_a, tag_b) {
            (None, None) => {
                log::info!("no valid area header, formatting region at {lower:#x}");
                self.device.erase(lower, self.area_size)?;
                record::write_record(
                    &mut self.device,
                    &mut self.txbuf,
                    lower,
                    self.geom.program_size,
                    AREA_KEY,
                    &encode_area_value(1),
                    false,
                )?;
                (lower, 1)
            }
            (Some(va), None) => (lower, va),
            (None, Some(vb)) => (upper, vb),
            (Some(va), Some(vb)) => {
                if va == vb {
                    log::error!("both areas report version {va}, refusing to guess");
                    return Err(Error::InvalidData);
                }
                if version_newer(va, vb) {
                    (lower, va)
                } else {
                    (upper, vb)
                }
            }
        };

        self.active_area_addr = active;
        self.gc_area_addr = if active == lower { upper } else { lower };
        self.area_version = version;
        self.free_space_offset = self.area_header_size();
        self.consumed_size = self.free_space_offset;
        log::debug!("active area {active:#x} version {version}");
        Ok(())
    }

    /// Walk the active log past the area header, rebuilding the RAM index.
    pub(super) fn replay(&mut self) -> Result<()> {
        let mut offset = self.area_header_size();
        loop {
            // A record needs at least a header's worth of room.
            if offset + HEADER_SIZE as u32 > self.area_size {
                self.free_space_offset = offset;
                break;
            }
            let addr = self.active_area_addr + offset;
            let header = match record::read_header(&mut self.device, addr) {
                Ok(h) => h,
                Err(Error::ErasedData) => {
                    self.free_space_offset = offset;
                    break;
                }
                Err(Error::InvalidData) => {
                    log::warn!("corrupt record at offset {offset:#x}, running recovery compaction");
                    return self.collect_garbage(None);
                }
                Err(err) => return Err(err),
            };

            // A corrupt data_size can claim a record far past the area,
            // so the bound check runs in u64 before anything is read.
            let rsize64 = record::record_size64(&header, self.geom.program_size);
            if offset as u64 + rsize64 > self.area_size as u64 {
                log::warn!("record at offset {offset:#x} overruns the area, running recovery compaction");
                return self.collect_garbage(None);
            }
            let rsize = rsize64 as u32;

            let key_size = header.key_size as usize;
            let mut key_buf = [0u8; MAX_KEY_SIZE];
            match record::verify_record(
                &mut self.device,
                &mut self.txbuf,
                addr,
                &header,
                RecordCheck {
                    key_out: Some(&mut key_buf[..key_size]),
                    ..Default::default()
                },
            ) {
                Ok(()) => {}
                Err(Error::InvalidData) => {
                    log::warn!("checksum mismatch at offset {offset:#x}, running recovery compaction");
                    return self.collect_garbage(None);
                }
                Err(err) => return Err(err),
            }

            let fr = self.find_slot(&key_buf[..key_size])?;
            match (header.is_tombstone(), fr.found) {
                (true, None) => {}
                (true, Some(old)) => {
                    self.index.remove(fr.pos);
                    self.consumed_size -= old.record_size;
                }
                (false, Some(old)) => {
                    self.index.set(
                        fr.pos,
                        IndexEntry {
                            hash: fr.hash,
                            offset,
                        },
                    );
                    self.consumed_size = self.consumed_size - old.record_size + rsize;
                }
                (false, None) => {
                    self.index.insert(
                        fr.pos,
                        IndexEntry {
                            hash: fr.hash,
                            offset,
                        },
                    )?;
                    self.consumed_size += rsize;
                }
            }
            offset += rsize;
        }
        log::debug!(
            "replay done, {} keys live, free space at {:#x}",
            self.index.len(),
            self.free_space_offset
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_newer_handles_wraparound() {
        assert!(version_newer(2, 1));
        assert!(!version_newer(1, 2));
        assert!(!version_newer(5, 5));
        // 0 succeeds 0xFFFF.
        assert!(version_newer(0, 0xFFFF));
        assert!(!version_newer(0xFFFF, 0));
        // Window edges.
        assert!(version_newer(0x8000, 1));
        assert!(!version_newer(0x8001, 1));
    }

    #[test]
    fn area_value_layout() {
        let v = encode_area_value(0x0102);
        assert_eq!(v, [0x02, 0x01, 0x00, 0x00]);
    }
}
