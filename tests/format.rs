// Integration tests for the on-medium record layout.
//
// Pins down the exact byte image of a record so a format change cannot
// slip through unnoticed: field order, little-endian widths, CRC
// placement, and page padding.

use norkv::crc::{crc16, CRC16_INIT};
use norkv::record::{
    read_header, record_size, write_record, RecordHeader, FLAG_TOMBSTONE, HEADER_SIZE,
};
use norkv::{BlockDevice, Error, Geometry, MemDevice, RECORD_MAGIC};

fn device() -> MemDevice {
    MemDevice::new(
        2048,
        Geometry {
            read_size: 1,
            program_size: 16,
            erase_size: 1024,
        },
    )
}

#[test]
fn record_byte_image_is_stable() {
    let mut dev = device();
    let mut txbuf = [0u8; 128];
    write_record(&mut dev, &mut txbuf, 0, 16, b"kv", &[0xDE, 0xAD], false).unwrap();
    let image = dev.data();

    // magic, format_version, flags
    assert_eq!(&image[0..4], &RECORD_MAGIC.to_le_bytes());
    assert_eq!(image[4], 0);
    assert_eq!(image[5], 0);
    // header_size = 18, key_size = 2, data_size = 2
    assert_eq!(&image[6..8], &18u16.to_le_bytes());
    assert_eq!(&image[8..10], &2u16.to_le_bytes());
    assert_eq!(&image[10..14], &2u32.to_le_bytes());

    // CRC over header-minus-crc, then key, then value; high half zero.
    let mut expected = crc16(&image[..14], CRC16_INIT);
    expected = crc16(b"kv", expected);
    expected = crc16(&[0xDE, 0xAD], expected);
    assert_eq!(&image[14..18], &(expected as u32).to_le_bytes());

    // Key and value bytes follow the header directly.
    assert_eq!(&image[18..20], b"kv");
    assert_eq!(&image[20..22], &[0xDE, 0xAD]);
    // Pad to the 32-byte boundary is written as zeros.
    assert_eq!(&image[22..32], &[0u8; 10]);
    // Bytes past the record are untouched.
    assert_eq!(image[32], 0xFF);
}

#[test]
fn tombstone_sets_flag_bit_and_no_data() {
    let mut dev = device();
    let mut txbuf = [0u8; 128];
    write_record(&mut dev, &mut txbuf, 0, 16, b"gone", &[], true).unwrap();

    let header = read_header(&mut dev, 0).unwrap();
    assert!(header.is_tombstone());
    assert_eq!(header.flags, FLAG_TOMBSTONE);
    assert_eq!(header.data_size, 0);
    assert_eq!(record_size(&header, 16), 32);
}

#[test]
fn header_rejects_out_of_range_key_sizes() {
    let mut dev = device();
    // Hand-build a header with key_size = 0.
    let mut h = RecordHeader::for_write(1, 0, false);
    h.key_size = 0;
    let mut page = [0u8; 32];
    page[..HEADER_SIZE].copy_from_slice(&h.to_bytes());
    dev.program(0, &page).unwrap();
    assert_eq!(read_header(&mut dev, 0), Err(Error::InvalidData));

    // And one with key_size past the limit.
    let mut dev = device();
    h.key_size = 64;
    page[..HEADER_SIZE].copy_from_slice(&h.to_bytes());
    dev.program(0, &page).unwrap();
    assert_eq!(read_header(&mut dev, 0), Err(Error::InvalidData));
}

#[test]
fn erased_medium_reads_as_free_space_for_both_polarities() {
    // 0xFF-erased media read the magic as all-ones.
    let mut dev = device();
    assert_eq!(read_header(&mut dev, 0), Err(Error::ErasedData));

    // 0x00-erased media read it as all-zeros.
    let mut dev = MemDevice::from_vec(
        vec![0x00; 2048],
        Geometry {
            read_size: 1,
            program_size: 16,
            erase_size: 1024,
        },
        0x00,
    );
    assert_eq!(read_header(&mut dev, 0), Err(Error::ErasedData));
}

#[test]
fn truncated_header_size_is_rejected() {
    let mut dev = device();
    let mut h = RecordHeader::for_write(2, 0, false);
    h.header_size = 10;
    let mut page = [0u8; 32];
    page[..HEADER_SIZE].copy_from_slice(&h.to_bytes());
    dev.program(0, &page).unwrap();
    assert_eq!(read_header(&mut dev, 0), Err(Error::InvalidData));
}
