use std::fmt;

/// Identifies the kind of payload an [`Entry`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// Kernel image.
    Kernel,
    /// Ramdisk image.
    Ramdisk,
    /// Optional second stage bootloader.
    SecondBoot,
    /// Device tree blob.
    DeviceTree,
    /// Device aboot image, consumed while building Loki images.
    Aboot,
    /// Sony initial program loader.
    Ipl,
    /// Sony RPM firmware.
    Rpm,
    /// Sony applications bootloader.
    Appsbl,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryType::Kernel => "kernel",
            EntryType::Ramdisk => "ramdisk",
            EntryType::SecondBoot => "second",
            EntryType::DeviceTree => "device tree",
            EntryType::Aboot => "aboot",
            EntryType::Ipl => "ipl",
            EntryType::Rpm => "rpm",
            EntryType::Appsbl => "appsbl",
        })
    }
}

/// Describes a single payload unit of a boot image.
///
/// Descriptors are produced by the writer when fetching the next payload
/// slot, and handed back when beginning that payload's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The kind of payload this entry describes.
    pub entry_type: EntryType,
    /// Name of the payload, for formats that store one.
    pub name: Option<String>,
    /// Payload size in bytes, where known ahead of time.
    pub size: Option<u64>,
}

impl Entry {
    /// Creates an entry of the given type with no further metadata.
    pub fn new(entry_type: EntryType) -> Self {
        Self {
            entry_type,
            name: None,
            size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_types_have_readable_names() {
        assert_eq!(EntryType::Kernel.to_string(), "kernel");
        assert_eq!(EntryType::DeviceTree.to_string(), "device tree");
        assert_eq!(EntryType::Appsbl.to_string(), "appsbl");
    }

    #[test]
    fn new_entry_carries_no_metadata() {
        let entry = Entry::new(EntryType::Ramdisk);
        assert_eq!(entry.entry_type, EntryType::Ramdisk);
        assert!(entry.name.is_none());
        assert!(entry.size.is_none());
    }
}
