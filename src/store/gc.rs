//! Garbage collection: compacting live records into the swap area.
//!
//! The collector copies every live record into the freshly erased swap
//! half, optionally folding one in-flight mutation into the pass, and
//! commits by writing the swap half's area-header record with the next
//! version. That single program call is the commit point: before it the
//! old area is authoritative, after it the selection rule at open time
//! picks the new one. The old area is left unerased; the next collection
//! erases it.

use super::{area, Inner};
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::index::IndexEntry;
use crate::record::{self, RecordHeader};

/// A mutation folded into a compaction pass instead of being appended.
pub(super) enum FoldOp<'a> {
    /// Rewrite `key` with `value`, skipping the superseded record.
    Update {
        pos: usize,
        hash: u16,
        key: &'a [u8],
        value: &'a [u8],
        old_record_size: u32,
    },
    /// Drop the record at index position `pos` entirely; compaction makes
    /// a tombstone unnecessary.
    Delete { pos: usize },
}

impl<D: BlockDevice> Inner<D> {
    /// Compact live records into the swap area and make it active.
    ///
    /// Interruption at any point before the area-header write leaves the
    /// store recoverable from the old area.
    pub(super) fn collect_garbage(&mut self, fold: Option<FoldOp<'_>>) -> Result<()> {
        if let Some(FoldOp::Update {
            key,
            value,
            old_record_size,
            ..
        }) = &fold
        {
            let header = RecordHeader::for_write(key.len() as u16, value.len() as u32, false);
            let new_size = record::record_size(&header, self.geom.program_size);
            if self.consumed_size - old_record_size + new_size > self.area_size {
                return Err(Error::StorageFull);
            }
        }

        log::debug!(
            "gc: compacting {} records into {:#x}",
            self.index.len(),
            self.gc_area_addr
        );

        // Erase back-to-front: the first sector holds the old header of
        // this half, and the new header must be the last thing written.
        // Erasing it last keeps at most one half header-valid if power
        // fails mid-erase.
        let es = self.geom.erase_size;
        if self.area_size > es {
            self.device.erase(self.gc_area_addr + es, self.area_size - es)?;
        }
        self.device.erase(self.gc_area_addr, es)?;

        let skip_pos = match &fold {
            Some(FoldOp::Update { pos, .. }) | Some(FoldOp::Delete { pos }) => Some(*pos),
            None => None,
        };

        let mut dst = self.area_header_size();
        for i in 0..self.index.len() {
            if Some(i) == skip_pos {
                continue;
            }
            let entry = self.index.entry(i);
            let src = self.active_area_addr + entry.offset;
            let header = record::read_header(&mut self.device, src)?;
            let rsize = record::record_size(&header, self.geom.program_size);
            self.copy_record(src, self.gc_area_addr + dst, rsize)?;
            self.index.set(
                i,
                IndexEntry {
                    hash: entry.hash,
                    offset: dst,
                },
            );
            dst += rsize;
        }

        match fold {
            Some(FoldOp::Update {
                pos, hash, key, value, ..
            }) => {
                let rsize = record::write_record(
                    &mut self.device,
                    &mut self.txbuf,
                    self.gc_area_addr + dst,
                    self.geom.program_size,
                    key,
                    value,
                    false,
                )?;
                self.index.set(pos, IndexEntry { hash, offset: dst });
                dst += rsize;
            }
            Some(FoldOp::Delete { pos }) => self.index.remove(pos),
            None => {}
        }

        // Commit point: the new area header makes the swap half
        // authoritative for the next open.
        let new_version = self.area_version.wrapping_add(1);
        record::write_record(
            &mut self.device,
            &mut self.txbuf,
            self.gc_area_addr,
            self.geom.program_size,
            area::AREA_KEY,
            &area::encode_area_value(new_version),
            false,
        )?;

        core::mem::swap(&mut self.active_area_addr, &mut self.gc_area_addr);
        self.area_version = new_version;
        self.free_space_offset = dst;
        self.consumed_size = dst;
        log::info!(
            "gc committed version {} at {:#x}, {} bytes live",
            new_version,
            self.active_area_addr,
            dst
        );
        Ok(())
    }

    /// Bit-identical record move through the transaction buffer. The CRC
    /// is not recomputed; the bytes do not change.
    fn copy_record(&mut self, src: u32, dst: u32, len: u32) -> Result<()> {
        let mut done = 0u32;
        while done < len {
            let n = (self.txbuf.len() as u32).min(len - done) as usize;
            self.device.read(src + done, &mut self.txbuf[..n])?;
            self.device.program(dst + done, &self.txbuf[..n])?;
            done += n as u32;
        }
        Ok(())
    }
}
