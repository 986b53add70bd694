use std::io::SeekFrom;

use byteorder::{LittleEndian, WriteBytesExt};
use sha1::{Digest, Sha1};

use super::android::{digest_region, AndroidHeader};
use super::consts::android::*;
use super::consts::mtk::*;
use super::segment::{Segment, SegmentWriter};
use super::{Format, FormatWriter};
use crate::entry::{Entry, EntryType};
use crate::errors::Result;
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

fn wrapped(entry_type: EntryType) -> bool {
    matches!(entry_type, EntryType::Kernel | EntryType::Ramdisk)
}

/// Bytes the slot occupies in the image, section header included.
fn region_size(slot: &Segment) -> u64 {
    if !slot.written {
        0
    } else if wrapped(slot.entry_type) {
        MTK_HEADER_SIZE + slot.size
    } else {
        slot.size
    }
}

/// Writes Android boot images whose kernel and ramdisk are wrapped in
/// MediaTek section headers.
///
/// A section header carries the payload size, which is only known once
/// the payload has been streamed. Space for it is reserved when the slot
/// is opened and the header is patched in at close, together with the
/// Android header whose size fields count the wrapping.
#[derive(Debug)]
pub struct MtkWriter {
    header: AndroidHeader,
    segments: SegmentWriter,
    started: bool,
}

impl MtkWriter {
    pub fn new() -> Self {
        Self {
            header: AndroidHeader::default(),
            segments: Self::layout(),
            started: false,
        }
    }

    fn layout() -> SegmentWriter {
        // Padding runs to the end of the wrapped region rather than the
        // bare payload, so the slots are left unaligned here.
        SegmentWriter::new(&[
            (EntryType::Kernel, 0),
            (EntryType::Ramdisk, 0),
            (EntryType::SecondBoot, 0),
            (EntryType::DeviceTree, 0),
        ])
    }

    fn finish_open(&mut self, stream: &mut dyn Stream) -> Result<()> {
        let Some(index) = self.segments.finish_entry(stream)? else {
            return Ok(());
        };
        let region = region_size(&self.segments.segments()[index]);
        let page = u64::from(self.header.page_size);
        write_zeros(stream, align_up(region, page) - region)?;
        Ok(())
    }
}

impl Default for MtkWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatWriter for MtkWriter {
    fn format(&self) -> Format {
        Format::Mtk
    }

    fn open(&mut self, _stream: &mut dyn Stream) -> Result<()> {
        self.header = AndroidHeader::default();
        self.segments = Self::layout();
        self.started = false;
        Ok(())
    }

    fn close(&mut self, stream: &mut dyn Stream) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        self.finish_open(stream)?;

        // Patch the section headers now that the payload sizes are
        // known. The remainder of each header was zeroed when the slot
        // was opened.
        for slot in self.segments.segments() {
            if slot.written && wrapped(slot.entry_type) {
                let label: &[u8] = match slot.entry_type {
                    EntryType::Kernel => MTK_LABEL_KERNEL,
                    _ => MTK_LABEL_RAMDISK,
                };
                stream.seek(SeekFrom::Start(slot.offset))?;
                stream.write_all(MTK_MAGIC)?;
                stream.write_u32::<LittleEndian>(slot.size as u32)?;
                stream.write_all(label)?;
                write_zeros(stream, MTK_NAME_SIZE as u64 - label.len() as u64)?;
            }
        }

        let page = u64::from(self.header.page_size);
        let slots = self.segments.segments();
        self.header.kernel_size = region_size(&slots[0]) as u32;
        self.header.ramdisk_size = region_size(&slots[1]) as u32;
        self.header.second_size = region_size(&slots[2]) as u32;
        self.header.dt_size = region_size(&slots[3]) as u32;

        // The checksum covers the wrapped regions, section headers and
        // all, with the sizes the Android header reports.
        let mut hasher = Sha1::new();
        for slot in slots {
            let region = region_size(slot);
            if slot.written {
                digest_region(stream, slot.offset, region, &mut hasher)?;
            }
            hasher.update((region as u32).to_le_bytes());
        }
        let digest = hasher.finalize();
        self.header.id[..digest.len()].copy_from_slice(&digest);

        let end = slots
            .iter()
            .filter(|slot| slot.written)
            .map(|slot| slot.offset + align_up(region_size(slot), page))
            .max()
            .unwrap_or(HEADER_SIZE);

        stream.seek(SeekFrom::Start(0))?;
        self.header.write_to(stream)?;

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
        self.segments = Self::layout();
        stream.seek(SeekFrom::Start(u64::from(self.header.page_size)))?;
        self.started = true;
        Ok(())
    }

    fn get_entry(&mut self, _stream: &mut dyn Stream) -> Result<Entry> {
        self.segments.get_entry()
    }

    fn write_entry(&mut self, stream: &mut dyn Stream, entry: &Entry) -> Result<()> {
        self.segments.write_entry(stream, entry)?;
        // Reserve room for the section header; the payload goes behind
        // it and the header is filled in at close.
        if wrapped(entry.entry_type) {
            write_zeros(stream, MTK_HEADER_SIZE)?;
        }
        Ok(())
    }

    fn write_data(&mut self, stream: &mut dyn Stream, buf: &[u8]) -> Result<usize> {
        self.segments.write_data(stream, buf)
    }

    fn finish_entry(&mut self, stream: &mut dyn Stream) -> Result<()> {
        self.finish_open(stream)
    }
}

#[cfg(test)]
mod tests {
    use byteorder::ByteOrder;

    use super::super::testutil::pack_with;
    use super::*;
    use crate::errors::Error;

    fn sample_image() -> Vec<u8> {
        pack_with(Format::Mtk, |writer| {
            let header = writer.get_header()?;
            writer.write_header(&header)?;

            loop {
                let entry = match writer.get_entry() {
                    Ok(entry) => entry,
                    Err(Error::EndOfEntries) => break,
                    Err(error) => return Err(error),
                };
                let payload: &[u8] = match entry.entry_type {
                    EntryType::Kernel => b"kern",
                    EntryType::Ramdisk => b"rdsk",
                    EntryType::DeviceTree => b"tree",
                    _ => continue,
                };
                writer.write_entry(&entry)?;
                writer.write_data(payload)?;
            }
            Ok(())
        })
    }

    #[test]
    fn kernel_and_ramdisk_are_wrapped_in_section_headers() {
        let data = sample_image();

        assert_eq!(data.len(), 4 * 2048);

        // Kernel region: section header at the page boundary, payload
        // behind it, padded to the next page.
        assert_eq!(&data[2048..2052], MTK_MAGIC);
        assert_eq!(LittleEndian::read_u32(&data[2052..]), 4);
        assert_eq!(&data[2056..2062], MTK_LABEL_KERNEL);
        assert!(data[2062..2560].iter().all(|&byte| byte == 0));
        assert_eq!(&data[2560..2564], b"kern");

        assert_eq!(&data[4096..4100], MTK_MAGIC);
        assert_eq!(&data[4104..4110], MTK_LABEL_RAMDISK);
        assert_eq!(&data[4608..4612], b"rdsk");

        // The device tree is stored bare.
        assert_eq!(&data[6144..6148], b"tree");
    }

    #[test]
    fn header_sizes_count_the_section_headers() {
        let data = sample_image();

        assert_eq!(&data[..8], BOOT_MAGIC);
        assert_eq!(LittleEndian::read_u32(&data[8..]), 512 + 4);
        assert_eq!(LittleEndian::read_u32(&data[16..]), 512 + 4);
        assert_eq!(LittleEndian::read_u32(&data[24..]), 0);
        assert_eq!(LittleEndian::read_u32(&data[40..]), 4);
    }

    #[test]
    fn image_checksum_covers_the_wrapped_regions() {
        let data = sample_image();

        let mut hasher = Sha1::new();
        hasher.update(&data[2048..2564]);
        hasher.update(516u32.to_le_bytes());
        hasher.update(&data[4096..4612]);
        hasher.update(516u32.to_le_bytes());
        hasher.update(0u32.to_le_bytes());
        hasher.update(&data[6144..6148]);
        hasher.update(4u32.to_le_bytes());
        let digest = hasher.finalize();

        assert_eq!(&data[576..596], digest.as_slice());
    }
}
