use std::fmt;
use std::fs::OpenOptions;
use std::io::{Read, Seek, Write};
use std::mem;
use std::path::Path;

use tracing::debug;

use crate::entry::Entry;
use crate::errors::{Error, Result};
use crate::format::{self, Format, FormatWriter};
use crate::header::Header;

/// Capability required of the byte stream a boot image is written to.
///
/// Formats re-read previously written regions while finalising (checksums,
/// patch records), so a writing stream must also be readable and seekable.
/// Blanket-implemented for anything that satisfies the three traits.
pub trait Stream: Read + Write + Seek {}

impl<T: Read + Write + Seek> Stream for T {}

/// Position of a [`Writer`] in its legal call sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// No stream attached. Only format selection and opening are legal.
    New,
    /// Stream open; awaiting the header.
    Header,
    /// Header written; awaiting the next entry.
    Entry,
    /// Entry begun; payload data may be streamed.
    Data,
}

enum ActiveStream<'s> {
    Owned(Box<dyn Stream + 's>),
    Borrowed(&'s mut (dyn Stream + 's)),
}

impl<'s> ActiveStream<'s> {
    fn get(&mut self) -> &mut (dyn Stream + 's) {
        match self {
            ActiveStream::Owned(stream) => stream.as_mut(),
            ActiveStream::Borrowed(stream) => &mut **stream,
        }
    }
}

impl fmt::Debug for ActiveStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveStream::Owned(_) => f.write_str("Owned"),
            ActiveStream::Borrowed(_) => f.write_str("Borrowed"),
        }
    }
}

/// Writes boot images in a caller-selected format.
///
/// A writer drives one format through a fixed protocol: select a format,
/// open a stream, write the header, then fetch and fill entries until the
/// format reports [`Error::EndOfEntries`], and close. Illegal call orders
/// are rejected with [`Error::InvalidState`] before the format ever sees
/// them.
///
/// ```no_run
/// use bootimg_pack::{Error, Format, Writer};
///
/// fn main() -> Result<(), Error> {
///     let mut writer = Writer::new();
///     writer.set_format(Format::Android)?;
///     writer.open_file("boot.img")?;
///
///     let mut header = writer.get_header()?;
///     header.cmdline = Some("console=ttyHSL0,115200,n8".to_string());
///     writer.write_header(&header)?;
///
///     loop {
///         let entry = match writer.get_entry() {
///             Ok(entry) => entry,
///             Err(Error::EndOfEntries) => break,
///             Err(error) => return Err(error),
///         };
///         writer.write_entry(&entry)?;
///         writer.write_data(b"payload bytes would go here")?;
///     }
///
///     writer.close()
/// }
/// ```
#[derive(Debug)]
pub struct Writer<'s> {
    state: WriterState,
    stream: Option<ActiveStream<'s>>,
    format: Option<Box<dyn FormatWriter>>,
}

impl<'s> Writer<'s> {
    /// Creates a writer with no format selected.
    pub fn new() -> Self {
        Self {
            state: WriterState::New,
            stream: None,
            format: None,
        }
    }

    /// Selects the format the next session writes. Only legal while no
    /// session is open; replaces any previously selected format.
    pub fn set_format(&mut self, format: Format) -> Result<()> {
        self.ensure_state(&[WriterState::New])?;
        debug!("Selected boot image format '{}'", format);
        self.format = Some(format::new_format_writer(format));
        Ok(())
    }

    /// Returns the selected format, if any.
    pub fn format(&self) -> Option<Format> {
        self.format.as_ref().map(|writer| writer.format())
    }

    /// True while a session is open.
    pub fn is_open(&self) -> bool {
        self.state != WriterState::New
    }

    /// Creates (or truncates) the file at `path` and starts a session on
    /// it. The file is opened readable as well, since formats re-read
    /// written regions while finalising.
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.ensure_state(&[WriterState::New])?;
        debug!("Writing boot image to '{}'", path.as_ref().display());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        self.open(file)
    }

    /// Starts a session on a stream the writer takes ownership of. The
    /// stream is flushed and dropped when the session closes.
    pub fn open(&mut self, stream: impl Stream + 's) -> Result<()> {
        self.open_stream(ActiveStream::Owned(Box::new(stream)))
    }

    /// Starts a session on a borrowed stream. The caller keeps ownership
    /// and the stream is left untouched by close.
    pub fn open_borrowed(&mut self, stream: &'s mut (dyn Stream + 's)) -> Result<()> {
        self.open_stream(ActiveStream::Borrowed(stream))
    }

    fn open_stream(&mut self, mut stream: ActiveStream<'s>) -> Result<()> {
        self.ensure_state(&[WriterState::New])?;
        let format = self.format.as_mut().ok_or(Error::NoFormatRegistered)?;

        if let Err(error) = format.open(stream.get()) {
            // Let the format release whatever its open acquired; the
            // original failure is what the caller sees.
            let _ = format.close(stream.get());
            return Err(error);
        }

        self.stream = Some(stream);
        self.state = WriterState::Header;
        Ok(())
    }

    /// Closes the session: finalises the format, then releases an owned
    /// stream. Both steps always run and the first failure is reported.
    /// The state is reset regardless of the outcome, while the selected
    /// format is kept so the writer can be reopened. Closing a writer
    /// with nothing open succeeds without touching the format.
    pub fn close(&mut self) -> Result<()> {
        let mut result = Ok(());

        if self.state != WriterState::New {
            debug!("Closing boot image writer");
            if let (Some(format), Some(stream)) = (self.format.as_mut(), self.stream.as_mut()) {
                result = format.close(stream.get());
            }
            if let Some(ActiveStream::Owned(mut stream)) = self.stream.take() {
                let flushed = stream.flush().map_err(Error::from);
                if result.is_ok() {
                    result = flushed;
                }
            }
        }

        self.state = WriterState::New;
        self.stream = None;
        result
    }

    /// Produces a header prefilled with the format's defaults, restricted
    /// to the fields the format can store. Does not advance the session.
    pub fn get_header(&mut self) -> Result<Header> {
        self.ensure_state(&[WriterState::Header])?;
        let (format, stream) = self.parts()?;
        format.get_header(stream)
    }

    /// Writes the image header. Fields the format does not support are
    /// dropped silently rather than rejected.
    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        self.ensure_state(&[WriterState::Header])?;
        let (format, stream) = self.parts()?;
        format.write_header(stream, header)?;
        self.state = WriterState::Entry;
        Ok(())
    }

    /// Fetches the next entry to write, finishing the current entry first
    /// when its payload was in progress. Returns [`Error::EndOfEntries`]
    /// once the format's entry sequence is exhausted.
    pub fn get_entry(&mut self) -> Result<Entry> {
        self.ensure_state(&[WriterState::Entry, WriterState::Data])?;

        if self.state == WriterState::Data {
            let (format, stream) = self.parts()?;
            format.finish_entry(stream)?;
            self.state = WriterState::Entry;
        }

        let (format, stream) = self.parts()?;
        let entry = format.get_entry(stream)?;
        self.state = WriterState::Entry;
        Ok(entry)
    }

    /// Begins the payload region for `entry`. The entry's type must match
    /// the most recently fetched descriptor; the format rejects
    /// mismatches.
    pub fn write_entry(&mut self, entry: &Entry) -> Result<()> {
        self.ensure_state(&[WriterState::Entry])?;
        let (format, stream) = self.parts()?;
        format.write_entry(stream, entry)?;
        self.state = WriterState::Data;
        Ok(())
    }

    /// Streams payload bytes for the current entry and returns how many
    /// were written. The whole buffer is written or an error is returned;
    /// a short write is never reported as success.
    pub fn write_data(&mut self, buf: &[u8]) -> Result<usize> {
        self.ensure_state(&[WriterState::Data])?;
        let (format, stream) = self.parts()?;
        format.write_data(stream, buf)
    }

    /// Moves the whole session out, leaving this writer as new with no
    /// format selected. Dropping the returned writer, or assigning it
    /// over another open one, closes the carried session with the result
    /// discarded.
    pub fn take(&mut self) -> Writer<'s> {
        mem::replace(self, Writer::new())
    }

    fn ensure_state(&self, allowed: &[WriterState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState(self.state))
        }
    }

    fn parts(&mut self) -> Result<(&mut dyn FormatWriter, &mut (dyn Stream + 's))> {
        match (self.format.as_mut(), self.stream.as_mut()) {
            (Some(format), Some(stream)) => Ok((format.as_mut(), stream.get())),
            _ => Err(Error::InvalidState(self.state)),
        }
    }
}

impl Default for Writer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Writer<'_> {
    /// Best-effort close with the result discarded. Close explicitly to
    /// observe failures.
    fn drop(&mut self) {
        let _ = self.close();
    }
}
