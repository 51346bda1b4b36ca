//! Buffered medium I/O through the store's single transaction buffer.
//!
//! Records are assembled from arbitrarily sized pieces (header, key,
//! value) but the medium only accepts program-page-aligned bursts.
//! [`WriteBuf`] accumulates pieces into the transaction buffer and
//! programs it each time it fills; the final [`flush`](WriteBuf::flush)
//! zero-pads the tail up to the program-page boundary. [`ChunkReader`]
//! is the read-side counterpart, feeding an on-medium byte range through
//! the same buffer one chunk at a time.

use crate::device::{align_up, BlockDevice};
use crate::error::Result;

/// Accumulates record bytes and programs them in buffer-sized bursts.
///
/// The buffer length and the start address must both be multiples of the
/// program-page size; the store guarantees this by construction (records
/// begin on page boundaries and the transaction buffer is page-aligned
/// in size).
pub struct WriteBuf<'a, D: BlockDevice> {
    device: &'a mut D,
    buf: &'a mut [u8],
    addr: u32,
    fill: usize,
    program_size: u32,
}

impl<'a, D: BlockDevice> WriteBuf<'a, D> {
    pub fn new(device: &'a mut D, buf: &'a mut [u8], addr: u32, program_size: u32) -> Self {
        debug_assert_eq!(buf.len() as u32 % program_size, 0);
        debug_assert_eq!(addr % program_size, 0);
        WriteBuf {
            device,
            buf,
            addr,
            fill: 0,
            program_size,
        }
    }

    /// Append `src`, programming full buffers as they fill.
    pub fn push(&mut self, mut src: &[u8]) -> Result<()> {
        while !src.is_empty() {
            let room = self.buf.len() - self.fill;
            let n = room.min(src.len());
            self.buf[self.fill..self.fill + n].copy_from_slice(&src[..n]);
            self.fill += n;
            src = &src[n..];
            if self.fill == self.buf.len() {
                self.device.program(self.addr, self.buf)?;
                self.addr += self.buf.len() as u32;
                self.fill = 0;
            }
        }
        Ok(())
    }

    /// Program any buffered tail, zero-padded to the next page boundary.
    ///
    /// The pad bytes sit outside the CRC'd region of the record.
    pub fn flush(&mut self) -> Result<()> {
        if self.fill == 0 {
            return Ok(());
        }
        let padded = align_up(self.fill as u32, self.program_size) as usize;
        self.buf[self.fill..padded].fill(0);
        self.device.program(self.addr, &self.buf[..padded])?;
        self.addr += padded as u32;
        self.fill = 0;
        Ok(())
    }
}

/// Streams `len` bytes starting at `addr` through the transaction buffer.
///
/// Call [`next_chunk`](ChunkReader::next_chunk) until it returns an empty
/// slice. Chunk boundaries follow the buffer size, not any record field
/// boundary; callers stream one field range per reader.
pub struct ChunkReader<'a, D: BlockDevice> {
    device: &'a mut D,
    buf: &'a mut [u8],
    addr: u32,
    remaining: usize,
}

impl<'a, D: BlockDevice> ChunkReader<'a, D> {
    pub fn new(device: &'a mut D, buf: &'a mut [u8], addr: u32, len: usize) -> Self {
        ChunkReader {
            device,
            buf,
            addr,
            remaining: len,
        }
    }

    /// Bytes not yet returned.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Read and return the next chunk; empty once the range is exhausted.
    pub fn next_chunk(&mut self) -> Result<&[u8]> {
        if self.remaining == 0 {
            return Ok(&[]);
        }
        let n = self.remaining.min(self.buf.len());
        self.device.read(self.addr, &mut self.buf[..n])?;
        self.addr += n as u32;
        self.remaining -= n;
        Ok(&self.buf[..n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mem::MemDevice;
    use crate::device::Geometry;

    fn device() -> MemDevice {
        MemDevice::new(
            1024,
            Geometry {
                read_size: 1,
                program_size: 16,
                erase_size: 256,
            },
        )
    }

    #[test]
    fn push_spanning_multiple_bursts() {
        let mut dev = device();
        let mut buf = [0u8; 32];
        let payload: Vec<u8> = (0u8..100).collect();
        {
            let mut wb = WriteBuf::new(&mut dev, &mut buf, 0, 16);
            // Uneven pieces crossing both the buffer and page boundaries.
            wb.push(&payload[..3]).unwrap();
            wb.push(&payload[3..70]).unwrap();
            wb.push(&payload[70..]).unwrap();
            wb.flush().unwrap();
        }
        assert_eq!(&dev.data()[..100], &payload[..]);
        // Flush pads the final page with zeros.
        assert_eq!(&dev.data()[100..112], &[0u8; 12]);
        assert_eq!(&dev.data()[112..120], &[0xFF; 8]);
    }

    #[test]
    fn flush_on_empty_buffer_is_noop() {
        let mut dev = device();
        let mut buf = [0u8; 32];
        let mut wb = WriteBuf::new(&mut dev, &mut buf, 64, 16);
        wb.flush().unwrap();
        wb.flush().unwrap();
    }

    #[test]
    fn chunk_reader_walks_exact_range() {
        let mut dev = device();
        let pattern: Vec<u8> = (0u8..=255).collect();
        dev.program(0, &pattern[..256]).unwrap();

        let mut buf = [0u8; 32];
        let mut seen = Vec::new();
        let mut rd = ChunkReader::new(&mut dev, &mut buf, 5, 77);
        loop {
            let chunk = rd.next_chunk().unwrap();
            if chunk.is_empty() {
                break;
            }
            seen.extend_from_slice(chunk);
        }
        assert_eq!(seen, &pattern[5..82]);
    }
}
