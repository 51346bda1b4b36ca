//! The mutation pipeline behind `write` and `delete`.
//!
//! A mutation is classified against the RAM index (add, update, delete),
//! checked against logical capacity, then appended to the active area.
//! When the append would not physically fit, the garbage collector runs
//! first; updates and deletes are folded into the compaction itself so
//! they cost no extra append, while adds retry after a plain compaction.

use super::gc::FoldOp;
use super::Inner;
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::index::IndexEntry;
use crate::record::{self, HEADER_SIZE};

impl<D: BlockDevice> Inner<D> {
    pub(crate) fn write_op(&mut self, key: &[u8], value: &[u8], delete: bool) -> Result<()> {
        let fr = self.find_slot(key)?;
        if delete && fr.found.is_none() {
            return Ok(());
        }
        if !delete && fr.found.is_none() {
            // Grow the index before touching the medium so an allocation
            // failure leaves no orphan record behind.
            self.index.reserve_for_add()?;
        }

        let payload = if delete { 0 } else { value.len() as u64 };
        let ps = self.geom.program_size as u64;
        let raw = HEADER_SIZE as u64 + key.len() as u64 + payload;
        let new_size64 = raw.div_ceil(ps) * ps;
        let old_size = fr.found.map(|f| f.record_size).unwrap_or(0);

        if !delete
            && self.consumed_size as u64 - old_size as u64 + new_size64 > self.area_size as u64
        {
            return Err(Error::StorageFull);
        }
        let new_size = new_size64 as u32;

        if self.free_space_offset + new_size > self.area_size {
            match fr.found {
                Some(f) if !delete => {
                    return self.collect_garbage(Some(FoldOp::Update {
                        pos: fr.pos,
                        hash: fr.hash,
                        key,
                        value,
                        old_record_size: f.record_size,
                    }));
                }
                Some(_) => {
                    return self.collect_garbage(Some(FoldOp::Delete { pos: fr.pos }));
                }
                None => {
                    self.collect_garbage(None)?;
                    // The logical check above guarantees the compacted
                    // area has room for the add.
                    debug_assert!(self.free_space_offset + new_size <= self.area_size);
                }
            }
        }

        let offset = self.free_space_offset;
        let written = record::write_record(
            &mut self.device,
            &mut self.txbuf,
            self.active_area_addr + offset,
            self.geom.program_size,
            key,
            if delete { &[] } else { value },
            delete,
        )?;
        debug_assert_eq!(written, new_size);

        match fr.found {
            None => {
                self.index.insert(
                    fr.pos,
                    IndexEntry {
                        hash: fr.hash,
                        offset,
                    },
                )?;
                self.consumed_size += new_size;
            }
            Some(f) if delete => {
                self.index.remove(fr.pos);
                self.consumed_size -= f.record_size;
            }
            Some(f) => {
                self.index.set(
                    fr.pos,
                    IndexEntry {
                        hash: fr.hash,
                        offset,
                    },
                );
                self.consumed_size = self.consumed_size - f.record_size + new_size;
            }
        }
        self.free_space_offset += new_size;
        Ok(())
    }
}
