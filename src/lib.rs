//! Lightweight library for writing Android boot images (including Bump,
//! Loki, MediaTek and Sony ELF flavours!)
#![deny(
    // warnings,
    unused_imports,
    missing_debug_implementations,
    // missing_docs,
    clippy::all,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications,
    variant_size_differences
)]

pub mod entry;
pub mod errors;
pub mod format;
pub mod header;
pub mod writer;

mod util;

pub use crate::entry::{Entry, EntryType};
pub use crate::errors::{Error, Result};
pub use crate::format::Format;
pub use crate::header::{Header, HeaderFields};
pub use crate::writer::{Stream, Writer, WriterState};
