use crate::entry::{Entry, EntryType};
use crate::errors::{Error, Result};
use crate::util::{align_up, write_zeros};
use crate::writer::Stream;

/// One payload slot of a boot image, in layout order.
#[derive(Debug)]
pub struct Segment {
    /// Type of entry this slot stores.
    pub entry_type: EntryType,
    /// Boundary the payload is zero-padded to, or 0 for none.
    pub align: u64,
    /// Stream offset the payload starts at. Valid once written.
    pub offset: u64,
    /// Number of payload bytes written so far.
    pub size: u64,
    /// Whether the slot was ever opened for writing.
    pub written: bool,
}

impl Segment {
    fn new(entry_type: EntryType, align: u64) -> Self {
        Self {
            entry_type,
            align,
            offset: 0,
            size: 0,
            written: false,
        }
    }
}

/// Hands out a fixed sequence of entry slots and tracks the payload
/// regions written into them.
///
/// Formats with one payload region per entry share this bookkeeping: it
/// enforces the slot order, rejects entries of the wrong type without
/// losing the caller's place, and records where each payload landed so
/// the format can patch sizes and checksums when it closes.
#[derive(Debug)]
pub struct SegmentWriter {
    segments: Vec<Segment>,
    pos: usize,
    fetched: Option<usize>,
    open: Option<usize>,
}

impl SegmentWriter {
    /// Creates a sequencer over `layout`, a list of entry types with the
    /// boundary each payload is padded to.
    pub fn new(layout: &[(EntryType, u64)]) -> Self {
        Self {
            segments: layout
                .iter()
                .map(|&(entry_type, align)| Segment::new(entry_type, align))
                .collect(),
            pos: 0,
            fetched: None,
            open: None,
        }
    }

    /// The slots in layout order, with whatever has been recorded into
    /// them so far.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Describes the next slot to fill. Fetching again without writing
    /// skips the previously fetched slot for good.
    pub fn get_entry(&mut self) -> Result<Entry> {
        let index = self.pos;
        if index >= self.segments.len() {
            self.fetched = None;
            return Err(Error::EndOfEntries);
        }
        self.fetched = Some(index);
        self.pos = index + 1;
        Ok(Entry::new(self.segments[index].entry_type))
    }

    /// Binds `entry` to the fetched slot (or the next unfetched one) and
    /// stamps the slot's payload offset. An entry of the wrong type is
    /// rejected without consuming the slot, so the caller may retry.
    pub fn write_entry(&mut self, stream: &mut dyn Stream, entry: &Entry) -> Result<()> {
        let index = self.fetched.unwrap_or(self.pos);
        if index >= self.segments.len() {
            return Err(Error::EndOfEntries);
        }

        let expected = self.segments[index].entry_type;
        if entry.entry_type != expected {
            return Err(Error::UnexpectedEntryType {
                expected,
                actual: entry.entry_type,
            });
        }

        if self.fetched.take().is_none() {
            self.pos = index + 1;
        }

        let segment = &mut self.segments[index];
        segment.offset = stream.stream_position()?;
        segment.size = 0;
        segment.written = true;
        self.open = Some(index);
        Ok(())
    }

    /// Appends payload bytes to the open slot.
    pub fn write_data(&mut self, stream: &mut dyn Stream, buf: &[u8]) -> Result<usize> {
        let Some(index) = self.open else {
            return Err(Error::InvalidData("No entry is open to write data to"));
        };
        stream.write_all(buf)?;
        self.segments[index].size += buf.len() as u64;
        Ok(buf.len())
    }

    /// Closes the open slot, padding its payload to the slot's boundary,
    /// and returns the index of the slot that was closed.
    pub fn finish_entry(&mut self, stream: &mut dyn Stream) -> Result<Option<usize>> {
        let Some(index) = self.open.take() else {
            return Ok(None);
        };
        let segment = &self.segments[index];
        if segment.align > 0 {
            write_zeros(stream, align_up(segment.size, segment.align) - segment.size)?;
        }
        Ok(Some(index))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn layout() -> SegmentWriter {
        SegmentWriter::new(&[(EntryType::Kernel, 4), (EntryType::Ramdisk, 0)])
    }

    #[test]
    fn slots_are_dealt_in_layout_order() {
        let mut segments = layout();
        assert_eq!(segments.get_entry().unwrap().entry_type, EntryType::Kernel);
        assert_eq!(segments.get_entry().unwrap().entry_type, EntryType::Ramdisk);
        assert!(matches!(segments.get_entry(), Err(Error::EndOfEntries)));
    }

    #[test]
    fn fetching_again_skips_the_unwritten_slot() {
        let mut stream = Cursor::new(Vec::new());
        let mut segments = layout();

        segments.get_entry().unwrap();
        let entry = segments.get_entry().unwrap();
        assert_eq!(entry.entry_type, EntryType::Ramdisk);
        segments.write_entry(&mut stream, &entry).unwrap();

        assert!(!segments.segments()[0].written);
        assert!(segments.segments()[1].written);
    }

    #[test]
    fn rejected_entries_do_not_consume_the_slot() {
        let mut stream = Cursor::new(Vec::new());
        let mut segments = layout();

        segments.get_entry().unwrap();
        let error = segments
            .write_entry(&mut stream, &Entry::new(EntryType::Ramdisk))
            .unwrap_err();
        assert!(matches!(
            error,
            Error::UnexpectedEntryType {
                expected: EntryType::Kernel,
                actual: EntryType::Ramdisk,
            }
        ));

        // The same slot accepts the matching type on retry.
        segments
            .write_entry(&mut stream, &Entry::new(EntryType::Kernel))
            .unwrap();
        assert!(segments.segments()[0].written);
    }

    #[test]
    fn writing_without_fetching_binds_the_next_slot() {
        let mut stream = Cursor::new(Vec::new());
        let mut segments = layout();

        segments
            .write_entry(&mut stream, &Entry::new(EntryType::Kernel))
            .unwrap();
        segments
            .write_entry(&mut stream, &Entry::new(EntryType::Ramdisk))
            .unwrap();
        assert!(matches!(
            segments.write_entry(&mut stream, &Entry::new(EntryType::Ramdisk)),
            Err(Error::EndOfEntries)
        ));
    }

    #[test]
    fn payloads_are_recorded_and_padded() {
        let mut stream = Cursor::new(Vec::new());
        let mut segments = layout();

        let entry = segments.get_entry().unwrap();
        segments.write_entry(&mut stream, &entry).unwrap();
        segments.write_data(&mut stream, b"abcde").unwrap();
        segments.write_data(&mut stream, b"f").unwrap();
        let closed = segments.finish_entry(&mut stream).unwrap();

        assert_eq!(closed, Some(0));
        assert_eq!(segments.segments()[0].offset, 0);
        assert_eq!(segments.segments()[0].size, 6);
        // Six payload bytes padded to the next multiple of four.
        assert_eq!(stream.into_inner().len(), 8);
    }

    #[test]
    fn unaligned_slots_are_not_padded() {
        let mut stream = Cursor::new(Vec::new());
        let mut segments = layout();

        segments.get_entry().unwrap();
        let entry = segments.get_entry().unwrap();
        segments.write_entry(&mut stream, &entry).unwrap();
        segments.write_data(&mut stream, b"abc").unwrap();
        segments.finish_entry(&mut stream).unwrap();

        assert_eq!(stream.into_inner().len(), 3);
    }

    #[test]
    fn finishing_with_nothing_open_is_harmless() {
        let mut stream = Cursor::new(Vec::new());
        let mut segments = layout();
        assert_eq!(segments.finish_entry(&mut stream).unwrap(), None);
    }
}
