use std::io::SeekFrom;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use sha1::{Digest, Sha1};

use super::android::{digest_region, AndroidHeader};
use super::consts::android::*;
use super::consts::loki::*;
use super::segment::SegmentWriter;
use super::{Format, FormatWriter};
use crate::entry::{Entry, EntryType};
use crate::errors::{Error, Result};
use crate::header::{Header, HeaderFields};
use crate::util::{align_up, write_zeros};
use crate::writer::Stream;

const SUPPORTED_FIELDS: HeaderFields = HeaderFields::KERNEL_ADDRESS
    .union(HeaderFields::RAMDISK_ADDRESS)
    .union(HeaderFields::SECOND_ADDRESS)
    .union(HeaderFields::TAGS_ADDRESS)
    .union(HeaderFields::PAGE_SIZE)
    .union(HeaderFields::BOARD_NAME)
    .union(HeaderFields::CMDLINE);

/// Writes Android boot images carrying a Loki patch record.
///
/// The patch record needs the load base of the device's aboot
/// bootloader, so the entry sequence ends with an aboot entry whose
/// payload is consumed for the record but never stored in the image.
#[derive(Debug)]
pub struct LokiWriter {
    header: AndroidHeader,
    segments: SegmentWriter,
    aboot: Vec<u8>,
    in_aboot: bool,
    started: bool,
}

impl LokiWriter {
    pub fn new() -> Self {
        Self {
            header: AndroidHeader::default(),
            segments: Self::layout(DEFAULT_PAGE_SIZE),
            aboot: Vec::new(),
            in_aboot: false,
            started: false,
        }
    }

    fn layout(page_size: u32) -> SegmentWriter {
        let align = u64::from(page_size);
        SegmentWriter::new(&[
            (EntryType::Kernel, align),
            (EntryType::Ramdisk, align),
            (EntryType::DeviceTree, align),
            (EntryType::Aboot, 0),
        ])
    }
}

impl Default for LokiWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatWriter for LokiWriter {
    fn format(&self) -> Format {
        Format::Loki
    }

    fn open(&mut self, _stream: &mut dyn Stream) -> Result<()> {
        self.header = AndroidHeader::default();
        self.segments = Self::layout(DEFAULT_PAGE_SIZE);
        self.aboot.clear();
        self.in_aboot = false;
        self.started = false;
        Ok(())
    }

    fn close(&mut self, stream: &mut dyn Stream) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        self.in_aboot = false;
        self.segments.finish_entry(stream)?;

        if self.aboot.is_empty() {
            return Err(Error::InvalidData(
                "An aboot image is required to apply the Loki patch",
            ));
        }
        if self.aboot.len() < ABOOT_MIN_SIZE {
            return Err(Error::InvalidData(
                "The aboot image is too small to carry a load base",
            ));
        }
        let base =
            LittleEndian::read_u32(&self.aboot[ABOOT_BASE_OFFSET..]).wrapping_sub(ABOOT_BASE_BIAS);

        let page = u64::from(self.header.page_size);
        let slots = self.segments.segments();
        self.header.kernel_size = slots[0].size as u32;
        self.header.ramdisk_size = slots[1].size as u32;
        self.header.dt_size = slots[2].size as u32;

        // The aboot payload is hashed along with the stored payloads
        // even though it never lands in the image itself.
        let mut hasher = Sha1::new();
        for slot in slots {
            if slot.entry_type == EntryType::Aboot {
                continue;
            }
            if slot.written {
                digest_region(stream, slot.offset, slot.size, &mut hasher)?;
            }
            hasher.update((slot.size as u32).to_le_bytes());
        }
        hasher.update(&self.aboot);
        hasher.update((self.aboot.len() as u32).to_le_bytes());
        let digest = hasher.finalize();
        self.header.id[..digest.len()].copy_from_slice(&digest);

        let end = slots
            .iter()
            .filter(|slot| slot.written && slot.entry_type != EntryType::Aboot)
            .map(|slot| slot.offset + align_up(slot.size, page))
            .max()
            .unwrap_or(HEADER_SIZE)
            .max(LOKI_MAGIC_OFFSET + LOKI_HEADER_SIZE);

        stream.seek(SeekFrom::Start(0))?;
        self.header.write_to(stream)?;

        stream.seek(SeekFrom::Start(LOKI_MAGIC_OFFSET))?;
        stream.write_all(LOKI_MAGIC)?;
        // A boot image patch; recovery images would store 1 here.
        stream.write_u32::<LittleEndian>(0)?;
        write_zeros(stream, LOKI_BUILD_SIZE as u64)?;
        stream.write_u32::<LittleEndian>(self.header.kernel_size)?;
        stream.write_u32::<LittleEndian>(self.header.ramdisk_size)?;
        stream.write_u32::<LittleEndian>(base)?;

        let total = align_up(end, page);
        if total > end {
            stream.seek(SeekFrom::Start(end))?;
            write_zeros(stream, total - end)?;
        }
        Ok(())
    }

    fn get_header(&mut self, _stream: &mut dyn Stream) -> Result<Header> {
        let mut header = Header::with_supported(SUPPORTED_FIELDS);
        header.kernel_address = Some(DEFAULT_KERNEL_ADDRESS);
        header.ramdisk_address = Some(DEFAULT_RAMDISK_ADDRESS);
        header.second_address = Some(DEFAULT_SECOND_ADDRESS);
        header.tags_address = Some(DEFAULT_TAGS_ADDRESS);
        header.page_size = Some(DEFAULT_PAGE_SIZE);
        Ok(header)
    }

    fn write_header(&mut self, stream: &mut dyn Stream, header: &Header) -> Result<()> {
        self.header = AndroidHeader::from_fields(header)?;
        self.segments = Self::layout(self.header.page_size);
        stream.seek(SeekFrom::Start(u64::from(self.header.page_size)))?;
        self.started = true;
        Ok(())
    }

    fn get_entry(&mut self, _stream: &mut dyn Stream) -> Result<Entry> {
        self.segments.get_entry()
    }

    fn write_entry(&mut self, stream: &mut dyn Stream, entry: &Entry) -> Result<()> {
        self.segments.write_entry(stream, entry)?;
        self.in_aboot = entry.entry_type == EntryType::Aboot;
        if self.in_aboot {
            self.aboot.clear();
        }
        Ok(())
    }

    fn write_data(&mut self, stream: &mut dyn Stream, buf: &[u8]) -> Result<usize> {
        if self.in_aboot {
            self.aboot.extend_from_slice(buf);
            Ok(buf.len())
        } else {
            self.segments.write_data(stream, buf)
        }
    }

    fn finish_entry(&mut self, stream: &mut dyn Stream) -> Result<()> {
        self.in_aboot = false;
        self.segments.finish_entry(stream)?;
        Ok(())
    }
}
