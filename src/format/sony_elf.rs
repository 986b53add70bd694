use std::io::SeekFrom;

use byteorder::{LittleEndian, WriteBytesExt};

use super::consts::sony_elf::*;
use super::segment::SegmentWriter;
use super::{Format, FormatWriter};
use crate::entry::{Entry, EntryType};
use crate::errors::Result;
use crate::header::{Header, HeaderFields};
use crate::util::write_zeros;
use crate::writer::Stream;

const SUPPORTED_FIELDS: HeaderFields = HeaderFields::KERNEL_ADDRESS
    .union(HeaderFields::RAMDISK_ADDRESS)
    .union(HeaderFields::IPL_ADDRESS)
    .union(HeaderFields::RPM_ADDRESS)
    .union(HeaderFields::APPSBL_ADDRESS)
    .union(HeaderFields::ENTRYPOINT)
    .union(HeaderFields::CMDLINE);

struct ProgramHeader {
    p_type: u32,
    offset: u64,
    vaddr: u32,
    filesz: u64,
    flags: u32,
}

/// Writes the ELF formatted boot images used by older Sony devices.
///
/// Payloads are packed back to back behind a fixed reservation for the
/// ELF header and its program header table, one program header per
/// payload. The kernel command line travels as a note segment appended
/// after the last payload.
#[derive(Debug)]
pub struct SonyElfWriter {
    entrypoint: Option<u32>,
    kernel_address: u32,
    ramdisk_address: u32,
    ipl_address: u32,
    rpm_address: u32,
    appsbl_address: u32,
    cmdline: String,
    segments: SegmentWriter,
    started: bool,
}

impl SonyElfWriter {
    pub fn new() -> Self {
        Self {
            entrypoint: None,
            kernel_address: DEFAULT_KERNEL_ADDRESS,
            ramdisk_address: DEFAULT_RAMDISK_ADDRESS,
            ipl_address: 0,
            rpm_address: 0,
            appsbl_address: 0,
            cmdline: String::new(),
            segments: Self::layout(),
            started: false,
        }
    }

    fn layout() -> SegmentWriter {
        SegmentWriter::new(&[
            (EntryType::Kernel, 0),
            (EntryType::Ramdisk, 0),
            (EntryType::Ipl, 0),
            (EntryType::Rpm, 0),
            (EntryType::Appsbl, 0),
        ])
    }

    fn address_for(&self, entry_type: EntryType) -> u32 {
        match entry_type {
            EntryType::Kernel => self.kernel_address,
            EntryType::Ramdisk => self.ramdisk_address,
            EntryType::Ipl => self.ipl_address,
            EntryType::Rpm => self.rpm_address,
            EntryType::Appsbl => self.appsbl_address,
            _ => 0,
        }
    }

    fn flags_for(entry_type: EntryType) -> u32 {
        match entry_type {
            EntryType::Ramdisk => FLAGS_RAMDISK,
            EntryType::Ipl => FLAGS_IPL,
            EntryType::Rpm => FLAGS_RPM,
            EntryType::Appsbl => FLAGS_APPSBL,
            _ => 0,
        }
    }
}

impl Default for SonyElfWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatWriter for SonyElfWriter {
    fn format(&self) -> Format {
        Format::SonyElf
    }

    fn open(&mut self, _stream: &mut dyn Stream) -> Result<()> {
        self.entrypoint = None;
        self.kernel_address = DEFAULT_KERNEL_ADDRESS;
        self.ramdisk_address = DEFAULT_RAMDISK_ADDRESS;
        self.ipl_address = 0;
        self.rpm_address = 0;
        self.appsbl_address = 0;
        self.cmdline.clear();
        self.segments = Self::layout();
        self.started = false;
        Ok(())
    }

    fn close(&mut self, stream: &mut dyn Stream) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        self.segments.finish_entry(stream)?;

        let mut phdrs = Vec::new();
        for slot in self.segments.segments() {
            if !slot.written {
                continue;
            }
            phdrs.push(ProgramHeader {
                p_type: PT_LOAD,
                offset: slot.offset,
                vaddr: self.address_for(slot.entry_type),
                filesz: slot.size,
                flags: Self::flags_for(slot.entry_type),
            });
        }
        if !self.cmdline.is_empty() {
            let offset = stream.stream_position()?;
            stream.write_all(self.cmdline.as_bytes())?;
            phdrs.push(ProgramHeader {
                p_type: PT_NOTE,
                offset,
                vaddr: 0,
                filesz: self.cmdline.len() as u64,
                flags: 0,
            });
        }

        stream.seek(SeekFrom::Start(0))?;
        stream.write_all(ELF_MAGIC)?;
        // 32-bit, little-endian, current version.
        stream.write_all(&[1, 1, 1])?;
        write_zeros(stream, 9)?;
        stream.write_u16::<LittleEndian>(ET_EXEC)?;
        stream.write_u16::<LittleEndian>(EM_ARM)?;
        stream.write_u32::<LittleEndian>(1)?;
        stream.write_u32::<LittleEndian>(self.entrypoint.unwrap_or(self.kernel_address))?;
        stream.write_u32::<LittleEndian>(EHDR_SIZE as u32)?;
        stream.write_u32::<LittleEndian>(0)?;
        stream.write_u32::<LittleEndian>(0)?;
        stream.write_u16::<LittleEndian>(EHDR_SIZE as u16)?;
        stream.write_u16::<LittleEndian>(PHDR_SIZE as u16)?;
        stream.write_u16::<LittleEndian>(phdrs.len() as u16)?;
        stream.write_u16::<LittleEndian>(0)?;
        stream.write_u16::<LittleEndian>(0)?;
        stream.write_u16::<LittleEndian>(0)?;

        for phdr in &phdrs {
            stream.write_u32::<LittleEndian>(phdr.p_type)?;
            stream.write_u32::<LittleEndian>(phdr.offset as u32)?;
            stream.write_u32::<LittleEndian>(phdr.vaddr)?;
            stream.write_u32::<LittleEndian>(phdr.vaddr)?;
            stream.write_u32::<LittleEndian>(phdr.filesz as u32)?;
            stream.write_u32::<LittleEndian>(phdr.filesz as u32)?;
            stream.write_u32::<LittleEndian>(phdr.flags)?;
            stream.write_u32::<LittleEndian>(0)?;
        }
        // Unused program header slots stay zeroed.
        write_zeros(stream, (MAX_PHDRS - phdrs.len() as u64) * PHDR_SIZE)?;
        Ok(())
    }

    fn get_header(&mut self, _stream: &mut dyn Stream) -> Result<Header> {
        let mut header = Header::with_supported(SUPPORTED_FIELDS);
        header.kernel_address = Some(DEFAULT_KERNEL_ADDRESS);
        header.ramdisk_address = Some(DEFAULT_RAMDISK_ADDRESS);
        Ok(header)
    }

    fn write_header(&mut self, stream: &mut dyn Stream, header: &Header) -> Result<()> {
        self.entrypoint = header.entrypoint;
        self.kernel_address = header.kernel_address.unwrap_or(DEFAULT_KERNEL_ADDRESS);
        self.ramdisk_address = header.ramdisk_address.unwrap_or(DEFAULT_RAMDISK_ADDRESS);
        self.ipl_address = header.ipl_address.unwrap_or(0);
        self.rpm_address = header.rpm_address.unwrap_or(0);
        self.appsbl_address = header.appsbl_address.unwrap_or(0);
        self.cmdline = header.cmdline.clone().unwrap_or_default();
        self.segments = Self::layout();
        stream.seek(SeekFrom::Start(EHDR_SIZE + MAX_PHDRS * PHDR_SIZE))?;
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
