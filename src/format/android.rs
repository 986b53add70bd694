use std::io::{SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use sha1::{Digest, Sha1};
use tracing::trace;

use super::consts::android::*;
use super::segment::SegmentWriter;
use super::{Format, FormatWriter};
use crate::entry::{Entry, EntryType};
use crate::errors::{Error, Result};
use crate::header::{Header, HeaderFields};
use crate::util::{align_up, padded_array, write_zeros};
use crate::writer::Stream;

/// Raw header of an Android boot image, in its on-disk layout.
#[derive(Debug, Clone)]
pub struct AndroidHeader {
    /// Kernel size, in bytes.
    pub kernel_size: u32,
    /// Address the kernel should be loaded to.
    pub kernel_address: u32,
    /// Ramdisk size, in bytes.
    pub ramdisk_size: u32,
    /// Address the ramdisk should be loaded to.
    pub ramdisk_address: u32,
    /// Size of an optional second stage bootloader.
    pub second_size: u32,
    /// Address the optional second stage bootloader should be loaded to.
    pub second_address: u32,
    /// Physical address of the kernel tags.
    pub tags_address: u32,
    /// The page size.
    pub page_size: u32,
    /// The size of the device tree, in bytes.
    pub dt_size: u32,
    /// Room for future expansion. This should always be set to 0.
    _unused: u32,
    /// Name of the product. This is a null-terminated ASCII string.
    pub name: [u8; NAME_SIZE],
    /// Arguments to pass to the kernel during boot.
    pub cmdline: [u8; CMDLINE_SIZE],
    /// Used to uniquely identify boot images.
    pub id: [u8; ID_SIZE],
}

impl AndroidHeader {
    /// Builds a raw header from the portable one, with all sizes still
    /// zero. Returns an error if a field does not fit the layout.
    pub fn from_fields(header: &Header) -> Result<Self> {
        let page_size = header.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if !PAGE_SIZES.contains(&page_size) {
            return Err(Error::InvalidPageSize(page_size));
        }

        Ok(Self {
            kernel_size: 0,
            kernel_address: header.kernel_address.unwrap_or(DEFAULT_KERNEL_ADDRESS),
            ramdisk_size: 0,
            ramdisk_address: header.ramdisk_address.unwrap_or(DEFAULT_RAMDISK_ADDRESS),
            second_size: 0,
            second_address: header.second_address.unwrap_or(DEFAULT_SECOND_ADDRESS),
            tags_address: header.tags_address.unwrap_or(DEFAULT_TAGS_ADDRESS),
            page_size,
            dt_size: 0,
            _unused: 0,
            name: padded_array(
                header.board_name.as_deref().unwrap_or("").as_bytes(),
                "board name",
            )?,
            cmdline: padded_array(
                header.cmdline.as_deref().unwrap_or("").as_bytes(),
                "kernel command line",
            )?,
            id: [0; ID_SIZE],
        })
    }

    /// Writes the header in its on-disk layout.
    pub fn write_to<W: Write + ?Sized>(&self, dst: &mut W) -> Result<()> {
        dst.write_all(BOOT_MAGIC)?;
        dst.write_u32::<LittleEndian>(self.kernel_size)?;
        dst.write_u32::<LittleEndian>(self.kernel_address)?;
        dst.write_u32::<LittleEndian>(self.ramdisk_size)?;
        dst.write_u32::<LittleEndian>(self.ramdisk_address)?;
        dst.write_u32::<LittleEndian>(self.second_size)?;
        dst.write_u32::<LittleEndian>(self.second_address)?;
        dst.write_u32::<LittleEndian>(self.tags_address)?;
        dst.write_u32::<LittleEndian>(self.page_size)?;
        dst.write_u32::<LittleEndian>(self.dt_size)?;
        dst.write_u32::<LittleEndian>(self._unused)?;
        dst.write_all(&self.name)?;
        dst.write_all(&self.cmdline)?;
        dst.write_all(&self.id)?;
        Ok(())
    }
}

impl Default for AndroidHeader {
    fn default() -> Self {
        Self {
            kernel_size: 0,
            kernel_address: DEFAULT_KERNEL_ADDRESS,
            ramdisk_size: 0,
            ramdisk_address: DEFAULT_RAMDISK_ADDRESS,
            second_size: 0,
            second_address: DEFAULT_SECOND_ADDRESS,
            tags_address: DEFAULT_TAGS_ADDRESS,
            page_size: DEFAULT_PAGE_SIZE,
            dt_size: 0,
            _unused: 0,
            name: [0; NAME_SIZE],
            cmdline: [0; CMDLINE_SIZE],
            id: [0; ID_SIZE],
        }
    }
}

/// Feeds the given stream region into a running checksum.
pub fn digest_region(
    stream: &mut dyn Stream,
    offset: u64,
    size: u64,
    hasher: &mut Sha1,
) -> Result<()> {
    if size == 0 {
        return Ok(());
    }
    stream.seek(SeekFrom::Start(offset))?;
    let mut remaining = size;
    let mut chunk = [0; 4096];
    while remaining > 0 {
        let take = remaining.min(chunk.len() as u64) as usize;
        stream.read_exact(&mut chunk[..take])?;
        hasher.update(&chunk[..take]);
        remaining -= take as u64;
    }
    Ok(())
}

const SUPPORTED_FIELDS: HeaderFields = HeaderFields::KERNEL_ADDRESS
    .union(HeaderFields::RAMDISK_ADDRESS)
    .union(HeaderFields::SECOND_ADDRESS)
    .union(HeaderFields::TAGS_ADDRESS)
    .union(HeaderFields::PAGE_SIZE)
    .union(HeaderFields::BOARD_NAME)
    .union(HeaderFields::CMDLINE);

/// Writes Android boot images, and bumped ones when asked to.
///
/// Payloads land on page boundaries behind the header page. The header
/// itself is written last, once the payload sizes and the checksum over
/// them are known.
#[derive(Debug)]
pub struct AndroidWriter {
    header: AndroidHeader,
    segments: SegmentWriter,
    started: bool,
    bump: bool,
}

impl AndroidWriter {
    pub fn new(bump: bool) -> Self {
        Self {
            header: AndroidHeader::default(),
            segments: Self::layout(DEFAULT_PAGE_SIZE),
            started: false,
            bump,
        }
    }

    fn layout(page_size: u32) -> SegmentWriter {
        let align = u64::from(page_size);
        SegmentWriter::new(&[
            (EntryType::Kernel, align),
            (EntryType::Ramdisk, align),
            (EntryType::SecondBoot, align),
            (EntryType::DeviceTree, align),
        ])
    }
}

impl FormatWriter for AndroidWriter {
    fn format(&self) -> Format {
        if self.bump {
            Format::Bump
        } else {
            Format::Android
        }
    }

    fn open(&mut self, _stream: &mut dyn Stream) -> Result<()> {
        self.header = AndroidHeader::default();
        self.segments = Self::layout(DEFAULT_PAGE_SIZE);
        self.started = false;
        Ok(())
    }

    fn close(&mut self, stream: &mut dyn Stream) -> Result<()> {
        // Nothing was laid out yet, so there is nothing to finalise.
        if !self.started {
            return Ok(());
        }
        self.segments.finish_entry(stream)?;

        let page = u64::from(self.header.page_size);
        let slots = self.segments.segments();
        self.header.kernel_size = slots[0].size as u32;
        self.header.ramdisk_size = slots[1].size as u32;
        self.header.second_size = slots[2].size as u32;
        self.header.dt_size = slots[3].size as u32;

        // Every payload contributes its bytes and its size word to the
        // image checksum, absent ones just the zero size word.
        let mut hasher = Sha1::new();
        for slot in slots {
            if slot.written {
                digest_region(stream, slot.offset, slot.size, &mut hasher)?;
            }
            hasher.update((slot.size as u32).to_le_bytes());
        }
        let digest = hasher.finalize();
        self.header.id[..digest.len()].copy_from_slice(&digest);

        let end = slots
            .iter()
            .filter(|slot| slot.written)
            .map(|slot| slot.offset + align_up(slot.size, page))
            .max()
            .unwrap_or(HEADER_SIZE);

        stream.seek(SeekFrom::Start(0))?;
        self.header.write_to(stream)?;

        let total = align_up(end, page);
        if total > end {
            stream.seek(SeekFrom::Start(end))?;
            write_zeros(stream, total - end)?;
        }
        if self.bump {
            stream.seek(SeekFrom::Start(total))?;
            stream.write_all(BUMP_MAGIC)?;
        }
        trace!("Finalised Android boot image of {} pages", total / page);
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
        // The header page is skipped for now and filled in at close.
        stream.seek(SeekFrom::Start(u64::from(self.header.page_size)))?;
        self.started = true;
        Ok(())
    }

    fn get_entry(&mut self, _stream: &mut dyn Stream) -> Result<Entry> {
        self.segments.get_entry()
    }

    fn write_entry(&mut self, stream: &mut dyn Stream, entry: &Entry) -> Result<()> {
        self.segments.write_entry(stream, entry)
    }

    fn write_data(&mut self, stream: &mut dyn Stream, buf: &[u8]) -> Result<usize> {
        self.segments.write_data(stream, buf)
    }

    fn finish_entry(&mut self, stream: &mut dyn Stream) -> Result<()> {
        self.segments.finish_entry(stream)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use byteorder::ByteOrder;

    use super::super::testutil::pack_with;
    use super::*;
    use crate::writer::Writer;

    fn sample_image(format: Format) -> Vec<u8> {
        pack_with(format, |writer| {
            let mut header = writer.get_header()?;
            header.board_name = Some("hammerhead".to_string());
            header.cmdline = Some("console=ttyHSL0".to_string());
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
    fn images_follow_the_android_layout() {
        let data = sample_image(Format::Android);

        // Header page plus three payload pages; the skipped second stage
        // bootloader takes no room.
        assert_eq!(data.len(), 4 * 2048);
        assert_eq!(&data[..8], BOOT_MAGIC);
        assert_eq!(LittleEndian::read_u32(&data[8..]), 4);
        assert_eq!(LittleEndian::read_u32(&data[12..]), DEFAULT_KERNEL_ADDRESS);
        assert_eq!(LittleEndian::read_u32(&data[16..]), 4);
        assert_eq!(LittleEndian::read_u32(&data[20..]), DEFAULT_RAMDISK_ADDRESS);
        assert_eq!(LittleEndian::read_u32(&data[24..]), 0);
        assert_eq!(LittleEndian::read_u32(&data[32..]), DEFAULT_TAGS_ADDRESS);
        assert_eq!(LittleEndian::read_u32(&data[36..]), 2048);
        assert_eq!(LittleEndian::read_u32(&data[40..]), 4);
        assert_eq!(&data[48..58], b"hammerhead");
        assert_eq!(&data[64..79], b"console=ttyHSL0");

        assert_eq!(&data[2048..2052], b"kern");
        assert_eq!(&data[4096..4100], b"rdsk");
        assert_eq!(&data[6144..6148], b"tree");
        // Payload padding is zero-filled.
        assert!(data[2052..4096].iter().all(|&byte| byte == 0));
    }

    #[test]
    fn image_checksum_covers_payloads_and_size_words() {
        let data = sample_image(Format::Android);

        let mut hasher = Sha1::new();
        hasher.update(b"kern");
        hasher.update(4u32.to_le_bytes());
        hasher.update(b"rdsk");
        hasher.update(4u32.to_le_bytes());
        hasher.update(0u32.to_le_bytes());
        hasher.update(b"tree");
        hasher.update(4u32.to_le_bytes());
        let digest = hasher.finalize();

        assert_eq!(&data[576..596], digest.as_slice());
        assert_eq!(&data[596..608], &[0; 12]);
    }

    #[test]
    fn header_only_images_take_one_page() {
        let data = pack_with(Format::Android, |writer| {
            let header = writer.get_header()?;
            writer.write_header(&header)
        });

        assert_eq!(data.len(), 2048);
        assert_eq!(&data[..8], BOOT_MAGIC);
        assert_eq!(LittleEndian::read_u32(&data[8..]), 0);
    }

    #[test]
    fn bumped_images_carry_the_trailer_magic() {
        let data = sample_image(Format::Bump);

        assert_eq!(data.len(), 4 * 2048 + BUMP_MAGIC.len());
        assert_eq!(&data[4 * 2048..], BUMP_MAGIC);
    }

    #[test]
    fn unknown_page_sizes_are_rejected() {
        let mut buffer = Cursor::new(Vec::new());
        let mut writer = Writer::new();
        writer.set_format(Format::Android).unwrap();
        writer.open_borrowed(&mut buffer).unwrap();

        let mut header = writer.get_header().unwrap();
        header.page_size = Some(1000);
        assert!(matches!(
            writer.write_header(&header),
            Err(Error::InvalidPageSize(1000))
        ));

        // The session is still waiting for a header, so a corrected one
        // goes through.
        header.page_size = Some(4096);
        writer.write_header(&header).unwrap();
    }

    #[test]
    fn overlong_board_names_are_rejected() {
        let mut buffer = Cursor::new(Vec::new());
        let mut writer = Writer::new();
        writer.set_format(Format::Android).unwrap();
        writer.open_borrowed(&mut buffer).unwrap();

        let mut header = writer.get_header().unwrap();
        header.board_name = Some("a".repeat(NAME_SIZE + 1));
        assert!(matches!(
            writer.write_header(&header),
            Err(Error::FieldTooLong("board name"))
        ));
    }
}
