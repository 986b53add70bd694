use std::fs;
use std::io::Cursor;

use bootimg_pack::{EntryType, Error, Format, Writer};
use byteorder::{ByteOrder, LittleEndian};

#[test]
fn packs_a_boot_image_onto_disk() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("boot.img");

    let mut writer = Writer::new();
    writer.set_format(Format::Android).unwrap();
    writer.open_file(&path).unwrap();

    let mut header = writer.get_header().unwrap();
    header.board_name = Some("serranolte".to_string());
    writer.write_header(&header).unwrap();

    loop {
        let entry = match writer.get_entry() {
            Ok(entry) => entry,
            Err(Error::EndOfEntries) => break,
            Err(error) => panic!("fetching an entry failed: {error}"),
        };
        let payload: &[u8] = match entry.entry_type {
            EntryType::Kernel => b"fake kernel",
            EntryType::Ramdisk => b"fake ramdisk",
            EntryType::DeviceTree => b"fake device tree",
            _ => continue,
        };
        writer.write_entry(&entry).unwrap();
        writer.write_data(payload).unwrap();
    }
    writer.close().unwrap();

    let data = fs::read(&path).unwrap();
    assert_eq!(data.len(), 4 * 2048);
    assert_eq!(&data[..8], b"ANDROID!");
    assert_eq!(LittleEndian::read_u32(&data[8..]), 11);
    assert_eq!(LittleEndian::read_u32(&data[16..]), 12);
    assert_eq!(LittleEndian::read_u32(&data[24..]), 0);
    assert_eq!(LittleEndian::read_u32(&data[40..]), 16);
    assert_eq!(&data[48..58], b"serranolte");
    assert_eq!(&data[2048..2059], b"fake kernel");
    assert_eq!(&data[4096..4108], b"fake ramdisk");
    assert_eq!(&data[6144..6160], b"fake device tree");
}

#[test]
fn dropping_an_open_writer_finalises_the_image() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("boot.img");

    let mut writer = Writer::new();
    writer.set_format(Format::Android).unwrap();
    writer.open_file(&path).unwrap();
    let header = writer.get_header().unwrap();
    writer.write_header(&header).unwrap();
    drop(writer);

    // The drop handler closed the image, so the header and trailing
    // padding made it to disk.
    let data = fs::read(&path).unwrap();
    assert_eq!(data.len(), 2048);
    assert_eq!(&data[..8], b"ANDROID!");
}

#[test]
fn a_closed_writer_can_pack_another_image() {
    let directory = tempfile::tempdir().unwrap();
    let first = directory.path().join("first.img");
    let second = directory.path().join("second.img");

    let mut writer = Writer::new();
    writer.set_format(Format::SonyElf).unwrap();

    for path in [&first, &second] {
        writer.open_file(path).unwrap();
        let header = writer.get_header().unwrap();
        writer.write_header(&header).unwrap();
        writer.close().unwrap();
    }

    for path in [&first, &second] {
        let data = fs::read(path).unwrap();
        assert_eq!(data.len(), 244);
        assert_eq!(&data[..4], b"\x7fELF");
    }
}

#[test]
fn android_images_offer_the_four_classic_entries() {
    let mut buffer = Cursor::new(Vec::new());
    let mut writer = Writer::new();
    writer.set_format(Format::Android).unwrap();
    writer.open_borrowed(&mut buffer).unwrap();
    let header = writer.get_header().unwrap();
    writer.write_header(&header).unwrap();

    let mut offered = Vec::new();
    loop {
        match writer.get_entry() {
            Ok(entry) => offered.push(entry.entry_type),
            Err(Error::EndOfEntries) => break,
            Err(error) => panic!("fetching an entry failed: {error}"),
        }
    }

    assert_eq!(
        offered,
        [
            EntryType::Kernel,
            EntryType::Ramdisk,
            EntryType::SecondBoot,
            EntryType::DeviceTree,
        ]
    );
    writer.close().unwrap();
}

#[test]
fn moved_writers_keep_the_open_session() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("boot.img");

    let mut writer = Writer::new();
    writer.set_format(Format::Android).unwrap();
    writer.open_file(&path).unwrap();
    let header = writer.get_header().unwrap();
    writer.write_header(&header).unwrap();

    let mut moved = writer.take();
    assert!(!writer.is_open());
    assert!(writer.format().is_none());

    moved.close().unwrap();

    let data = fs::read(&path).unwrap();
    assert_eq!(data.len(), 2048);
    assert_eq!(&data[..8], b"ANDROID!");
}

#[test]
fn loki_packs_consume_the_aboot_entry() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("boot.lok");

    let mut aboot = vec![0u8; 4096];
    LittleEndian::write_u32(&mut aboot[12..], 0x8000_0028);

    let mut writer = Writer::new();
    writer.set_format(Format::Loki).unwrap();
    writer.open_file(&path).unwrap();
    let header = writer.get_header().unwrap();
    writer.write_header(&header).unwrap();

    loop {
        let entry = match writer.get_entry() {
            Ok(entry) => entry,
            Err(Error::EndOfEntries) => break,
            Err(error) => panic!("fetching an entry failed: {error}"),
        };
        match entry.entry_type {
            EntryType::Kernel => {
                writer.write_entry(&entry).unwrap();
                writer.write_data(b"fake kernel").unwrap();
            }
            EntryType::Aboot => {
                writer.write_entry(&entry).unwrap();
                writer.write_data(&aboot).unwrap();
            }
            _ => continue,
        }
    }
    writer.close().unwrap();

    let data = fs::read(&path).unwrap();
    assert_eq!(data.len(), 2 * 2048);
    assert_eq!(&data[..8], b"ANDROID!");
    assert_eq!(&data[0x400..0x404], b"LOKI");
    // The load base from the aboot image, less the header bias.
    assert_eq!(LittleEndian::read_u32(&data[0x490..]), 0x8000_0000);
    assert_eq!(&data[2048..2059], b"fake kernel");
}
