//! On-medium record codec.
//!
//! A record is a self-describing unit: an 18-byte little-endian header,
//! the key bytes, the value bytes, and zero padding up to the next
//! program-page boundary. The header's `crc` field holds a
//! CRC-16/CCITT-FALSE (in the low 16 bits of the 4-byte field) computed
//! over the header minus the crc field, then the key, then the value.
//! Pad bytes are outside the checked region.
//!
//! Free space is recognized by magic: a fully erased medium reads as
//! `0x00000000` or `0xFFFFFFFF` where the magic word would be.

use crate::bufio::{ChunkReader, WriteBuf};
use crate::crc::{crc16, Crc16State, CRC16_INIT};
use crate::device::BlockDevice;
use crate::error::{Error, Result};

/// Magic word identifying a record header.
pub const RECORD_MAGIC: u32 = 0xFACE_FACE;

/// On-medium format version written into every record.
pub const FORMAT_VERSION: u8 = 0;

/// Flags bit 7: the record is a delete tombstone.
pub const FLAG_TOMBSTONE: u8 = 0x80;

/// Serialized header size in bytes.
pub const HEADER_SIZE: usize = 18;

/// Exclusive upper bound on key length; keys are 1..=63 bytes.
pub const MAX_KEY_SIZE: usize = 64;

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub magic: u32,
    pub format_version: u8,
    pub flags: u8,
    pub header_size: u16,
    pub key_size: u16,
    pub data_size: u32,
    pub crc: u32,
}

impl RecordHeader {
    /// Header for a record the store is about to write. The `crc` field is
    /// filled in by [`write_record`].
    pub fn for_write(key_size: u16, data_size: u32, tombstone: bool) -> Self {
        RecordHeader {
            magic: RECORD_MAGIC,
            format_version: FORMAT_VERSION,
            flags: if tombstone { FLAG_TOMBSTONE } else { 0 },
            header_size: HEADER_SIZE as u16,
            key_size,
            data_size,
            crc: 0,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.flags & FLAG_TOMBSTONE != 0
    }

    /// Serialize in field order, little-endian.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4] = self.format_version;
        out[5] = self.flags;
        out[6..8].copy_from_slice(&self.header_size.to_le_bytes());
        out[8..10].copy_from_slice(&self.key_size.to_le_bytes());
        out[10..14].copy_from_slice(&self.data_size.to_le_bytes());
        out[14..18].copy_from_slice(&self.crc.to_le_bytes());
        out
    }

    pub fn from_bytes(raw: &[u8; HEADER_SIZE]) -> Self {
        RecordHeader {
            magic: u32::from_le_bytes(raw[0..4].try_into().unwrap()),
            format_version: raw[4],
            flags: raw[5],
            header_size: u16::from_le_bytes(raw[6..8].try_into().unwrap()),
            key_size: u16::from_le_bytes(raw[8..10].try_into().unwrap()),
            data_size: u32::from_le_bytes(raw[10..14].try_into().unwrap()),
            crc: 0,
        }
        .with_crc(u32::from_le_bytes(raw[14..18].try_into().unwrap()))
    }

    fn with_crc(mut self, crc: u32) -> Self {
        self.crc = crc;
        self
    }

    /// CRC seed covering the header fields in declared order, excluding
    /// the crc field itself.
    pub fn crc_seed(&self) -> u16 {
        crc16(&self.to_bytes()[..HEADER_SIZE - 4], CRC16_INIT)
    }
}

/// Total on-medium size of the record described by `header`, aligned up to
/// the program-page size at the record's address.
///
/// Only valid for headers whose record is known to fit the area; use
/// [`record_size64`] for headers straight off the medium, where a corrupt
/// `data_size` can push the sum past `u32::MAX`.
pub fn record_size(header: &RecordHeader, program_size: u32) -> u32 {
    record_size64(header, program_size) as u32
}

/// Overflow-proof form of [`record_size`] for unvalidated headers.
pub fn record_size64(header: &RecordHeader, program_size: u32) -> u64 {
    let raw = header.header_size as u64 + header.key_size as u64 + header.data_size as u64;
    raw.div_ceil(program_size as u64) * program_size as u64
}

/// Read and validate a record header at `addr`.
///
/// Returns [`Error::ErasedData`] when the magic word reads as all-zeros or
/// all-ones (free space), [`Error::InvalidData`] for any other malformed
/// header.
pub fn read_header<D: BlockDevice>(device: &mut D, addr: u32) -> Result<RecordHeader> {
    let mut raw = [0u8; HEADER_SIZE];
    device.read(addr, &mut raw)?;
    let header = RecordHeader::from_bytes(&raw);
    match header.magic {
        0x0000_0000 | 0xFFFF_FFFF => return Err(Error::ErasedData),
        RECORD_MAGIC => {}
        _ => return Err(Error::InvalidData),
    }
    if header.key_size == 0 || header.key_size as usize >= MAX_KEY_SIZE {
        return Err(Error::InvalidData);
    }
    if (header.header_size as usize) < HEADER_SIZE {
        return Err(Error::InvalidData);
    }
    Ok(header)
}

/// What [`verify_record`] should do with the key and value streams.
#[derive(Default)]
pub struct RecordCheck<'a> {
    /// Compare the on-medium key against this one; a mismatch is
    /// [`Error::ItemNotFound`] (hash-collision disambiguation).
    pub expect_key: Option<&'a [u8]>,
    /// Copy the on-medium key here; must be exactly `key_size` bytes.
    pub key_out: Option<&'a mut [u8]>,
    /// Copy the value here; shorter than `data_size` is
    /// [`Error::BufferTooSmall`].
    pub value_out: Option<&'a mut [u8]>,
}

/// Stream the key and value of the record at `addr` through the
/// transaction buffer, checking the CRC and applying `check`.
///
/// `header` must have come from [`read_header`] at the same address.
pub fn verify_record<D: BlockDevice>(
    device: &mut D,
    txbuf: &mut [u8],
    addr: u32,
    header: &RecordHeader,
    check: RecordCheck<'_>,
) -> Result<()> {
    let RecordCheck {
        expect_key,
        mut key_out,
        mut value_out,
    } = check;

    if let Some(out) = &value_out {
        if (out.len() as u32) < header.data_size {
            return Err(Error::BufferTooSmall(header.data_size));
        }
    }
    if let Some(expected) = expect_key {
        if expected.len() != header.key_size as usize {
            return Err(Error::ItemNotFound);
        }
    }
    if let Some(out) = &key_out {
        debug_assert_eq!(out.len(), header.key_size as usize);
    }

    let mut crc = Crc16State::with_initial(header.crc_seed());
    let key_addr = addr + header.header_size as u32;

    let mut cursor = 0usize;
    let mut rd = ChunkReader::new(device, txbuf, key_addr, header.key_size as usize);
    loop {
        let chunk = rd.next_chunk()?;
        if chunk.is_empty() {
            break;
        }
        crc.update(chunk);
        if let Some(expected) = expect_key {
            if chunk != &expected[cursor..cursor + chunk.len()] {
                return Err(Error::ItemNotFound);
            }
        }
        if let Some(out) = key_out.as_deref_mut() {
            out[cursor..cursor + chunk.len()].copy_from_slice(chunk);
        }
        cursor += chunk.len();
    }

    let value_addr = key_addr + header.key_size as u32;
    let mut cursor = 0usize;
    let mut rd = ChunkReader::new(device, txbuf, value_addr, header.data_size as usize);
    loop {
        let chunk = rd.next_chunk()?;
        if chunk.is_empty() {
            break;
        }
        crc.update(chunk);
        if let Some(out) = value_out.as_deref_mut() {
            out[cursor..cursor + chunk.len()].copy_from_slice(chunk);
        }
        cursor += chunk.len();
    }

    if crc.value() != (header.crc & 0xFFFF) as u16 {
        return Err(Error::InvalidData);
    }
    Ok(())
}

/// Serialize and program a record at `addr`; returns its aligned size.
///
/// `addr` must lie on a program-page boundary (the store appends records
/// at aligned offsets only).
pub fn write_record<D: BlockDevice>(
    device: &mut D,
    txbuf: &mut [u8],
    addr: u32,
    program_size: u32,
    key: &[u8],
    value: &[u8],
    tombstone: bool,
) -> Result<u32> {
    debug_assert!(!key.is_empty() && key.len() < MAX_KEY_SIZE);
    let mut header = RecordHeader::for_write(key.len() as u16, value.len() as u32, tombstone);
    let mut crc = Crc16State::with_initial(header.crc_seed());
    crc.update(key);
    crc.update(value);
    header.crc = crc.value() as u32;

    let mut wb = WriteBuf::new(device, txbuf, addr, program_size);
    wb.push(&header.to_bytes())?;
    wb.push(key)?;
    wb.push(value)?;
    wb.flush()?;
    Ok(record_size(&header, program_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mem::MemDevice;
    use crate::device::Geometry;

    fn device() -> MemDevice {
        MemDevice::new(
            4096,
            Geometry {
                read_size: 1,
                program_size: 16,
                erase_size: 512,
            },
        )
    }

    #[test]
    fn header_round_trips_through_bytes() {
        let mut h = RecordHeader::for_write(5, 300, true);
        h.crc = 0xBEEF;
        let decoded = RecordHeader::from_bytes(&h.to_bytes());
        assert_eq!(decoded, h);
        assert!(decoded.is_tombstone());
    }

    #[test]
    fn erased_magic_reports_free_space() {
        let mut dev = device();
        assert_eq!(read_header(&mut dev, 0), Err(Error::ErasedData));
    }

    #[test]
    fn foreign_magic_reports_corruption() {
        let mut dev = device();
        let mut page = [0u8; 16];
        page[0..4].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        dev.program(0, &page).unwrap();
        assert_eq!(read_header(&mut dev, 0), Err(Error::InvalidData));
    }

    #[test]
    fn record_size_aligns_to_program_page() {
        let h = RecordHeader::for_write(3, 1, false);
        assert_eq!(record_size(&h, 16), 32); // 18 + 3 + 1 = 22
        assert_eq!(record_size(&h, 1), 22);
        assert_eq!(record_size(&h, 512), 512);
    }

    #[test]
    fn write_verify_round_trip() {
        let mut dev = device();
        let mut txbuf = [0u8; 128];
        let size =
            write_record(&mut dev, &mut txbuf, 0, 16, b"alpha", b"\x01\x02\x03", false).unwrap();
        assert_eq!(size, 32);

        let header = read_header(&mut dev, 0).unwrap();
        assert_eq!(header.key_size, 5);
        assert_eq!(header.data_size, 3);
        assert!(!header.is_tombstone());

        let mut value = [0u8; 8];
        verify_record(
            &mut dev,
            &mut txbuf,
            0,
            &header,
            RecordCheck {
                expect_key: Some(b"alpha"),
                value_out: Some(&mut value),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(&value[..3], &[1, 2, 3]);
    }

    #[test]
    fn key_mismatch_is_item_not_found() {
        let mut dev = device();
        let mut txbuf = [0u8; 128];
        write_record(&mut dev, &mut txbuf, 0, 16, b"alpha", b"v", false).unwrap();
        let header = read_header(&mut dev, 0).unwrap();
        let err = verify_record(
            &mut dev,
            &mut txbuf,
            0,
            &header,
            RecordCheck {
                expect_key: Some(b"aloha"),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, Error::ItemNotFound);
    }

    #[test]
    fn flipped_value_bit_is_invalid_data() {
        let mut dev = device();
        let mut txbuf = [0u8; 128];
        write_record(&mut dev, &mut txbuf, 0, 16, b"key", b"payload", false).unwrap();
        dev.data_mut()[HEADER_SIZE + 3 + 2] ^= 0x01;
        let header = read_header(&mut dev, 0).unwrap();
        let err = verify_record(
            &mut dev,
            &mut txbuf,
            0,
            &header,
            RecordCheck::default(),
        )
        .unwrap_err();
        assert_eq!(err, Error::InvalidData);
    }

    #[test]
    fn short_value_buffer_reports_required_size() {
        let mut dev = device();
        let mut txbuf = [0u8; 128];
        write_record(&mut dev, &mut txbuf, 0, 16, b"key", &[7u8; 40], false).unwrap();
        let header = read_header(&mut dev, 0).unwrap();
        let mut small = [0u8; 8];
        let err = verify_record(
            &mut dev,
            &mut txbuf,
            0,
            &header,
            RecordCheck {
                value_out: Some(&mut small),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, Error::BufferTooSmall(40));
    }
}
