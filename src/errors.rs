use std::io::Error as IoError;
use thiserror::Error;

use crate::entry::EntryType;
use crate::writer::WriterState;

/// Alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Operation is not allowed in the {0:?} state.")]
    InvalidState(WriterState),
    #[error("No boot image format registered.")]
    NoFormatRegistered,
    #[error("Unknown format writer option '{0}'.")]
    UnknownOption(String),
    #[error("No entries left to write.")]
    EndOfEntries,
    #[error("Unknown boot image format '{0}'.")]
    UnknownFormat(String),
    #[error("Expected an entry of type '{expected}', got '{actual}'.")]
    UnexpectedEntryType {
        expected: EntryType,
        actual: EntryType,
    },
    #[error("Unsupported page size: {0}.")]
    InvalidPageSize(u32),
    #[error("Value of the '{0}' field is too long for the selected format.")]
    FieldTooLong(&'static str),
    #[error("{0}.")]
    InvalidData(&'static str),
    #[error("IO error whilst writing boot image.")]
    Io(#[from] IoError),
}
