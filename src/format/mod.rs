//! The boot image formats the writer can produce.

mod android;
mod consts;
mod loki;
mod mtk;
mod segment;
mod sony_elf;

use std::fmt;
use std::str::FromStr;

use crate::entry::Entry;
use crate::errors::{Error, Result};
use crate::header::Header;
use crate::writer::Stream;

/// A boot image format the writer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// A plain Android boot image.
    Android,
    /// An Android boot image with a bump trailer appended.
    Bump,
    /// An Android boot image with a Loki patch record.
    Loki,
    /// An Android boot image with MediaTek section headers.
    Mtk,
    /// The ELF formatted images used by older Sony devices.
    SonyElf,
}

impl Format {
    /// Every supported format, in the order they are listed to users.
    pub const ALL: &'static [Format] = &[
        Format::Android,
        Format::Bump,
        Format::Loki,
        Format::Mtk,
        Format::SonyElf,
    ];

    /// The name the format goes by on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Format::Android => "android",
            Format::Bump => "bump",
            Format::Loki => "loki",
            Format::Mtk => "mtk",
            Format::SonyElf => "sonyelf",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "android" => Ok(Format::Android),
            "bump" => Ok(Format::Bump),
            "loki" => Ok(Format::Loki),
            "mtk" => Ok(Format::Mtk),
            "sonyelf" | "sony_elf" => Ok(Format::SonyElf),
            _ => Err(Error::UnknownFormat(s.to_string())),
        }
    }
}

/// Callback surface a format implements to put bytes on a stream.
///
/// The writer enforces the call order, so implementations can rely on
/// it: `open` starts a session and `close` ends it, `write_header` runs
/// before any entry traffic, and a written entry is always closed with
/// `finish_entry` before the next one is fetched.
pub(crate) trait FormatWriter {
    /// The format this writer produces.
    fn format(&self) -> Format;

    /// Applies a format specific option. Unknown keys are rejected.
    fn set_option(&mut self, key: &str, _value: &str) -> Result<()> {
        Err(Error::UnknownOption(key.to_string()))
    }

    /// Called when a session starts, before anything is written.
    fn open(&mut self, _stream: &mut dyn Stream) -> Result<()> {
        Ok(())
    }

    /// Finalises the image. Called once per session, with a trailing
    /// unfinished entry possibly still to be closed.
    fn close(&mut self, _stream: &mut dyn Stream) -> Result<()> {
        Ok(())
    }

    /// Produces the format's default header, restricted to the fields
    /// the format can store.
    fn get_header(&mut self, stream: &mut dyn Stream) -> Result<Header>;

    /// Lays the header down, or records it for writing at close.
    fn write_header(&mut self, stream: &mut dyn Stream, header: &Header) -> Result<()>;

    /// Describes the next entry of the format's sequence.
    fn get_entry(&mut self, stream: &mut dyn Stream) -> Result<Entry>;

    /// Starts the payload region for an entry.
    fn write_entry(&mut self, stream: &mut dyn Stream, entry: &Entry) -> Result<()>;

    /// Appends payload bytes to the current entry.
    fn write_data(&mut self, stream: &mut dyn Stream, buf: &[u8]) -> Result<usize>;

    /// Closes the current entry once its payload is complete.
    fn finish_entry(&mut self, _stream: &mut dyn Stream) -> Result<()> {
        Ok(())
    }
}

impl fmt::Debug for dyn FormatWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FormatWriter({})", self.format())
    }
}

/// Creates the format writer backing a [`Format`] selection.
pub(crate) fn new_format_writer(format: Format) -> Box<dyn FormatWriter> {
    match format {
        Format::Android => Box::new(android::AndroidWriter::new(false)),
        Format::Bump => Box::new(android::AndroidWriter::new(true)),
        Format::Loki => Box::new(loki::LokiWriter::new()),
        Format::Mtk => Box::new(mtk::MtkWriter::new()),
        Format::SonyElf => Box::new(sony_elf::SonyElfWriter::new()),
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::io::Cursor;

    use super::Format;
    use crate::errors::Result;
    use crate::writer::Writer;

    /// Packs an image into memory with the given format and build steps.
    pub(crate) fn pack_with<F>(format: Format, build: F) -> Vec<u8>
    where
        F: FnOnce(&mut Writer<'_>) -> Result<()>,
    {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = Writer::new();
            writer.set_format(format).unwrap();
            writer.open_borrowed(&mut buffer).unwrap();
            build(&mut writer).unwrap();
            writer.close().unwrap();
        }
        buffer.into_inner()
    }
}
