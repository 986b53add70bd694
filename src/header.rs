use bitflags::bitflags;

bitflags! {
    /// Set of header fields a boot image format is able to store.
    ///
    /// Returned as part of the header a format prepares, so callers can
    /// tell which fields will survive the write. Fields outside the set
    /// are dropped silently.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFields: u32 {
        const KERNEL_ADDRESS = 1 << 0;
        const RAMDISK_ADDRESS = 1 << 1;
        const SECOND_ADDRESS = 1 << 2;
        const TAGS_ADDRESS = 1 << 3;
        const IPL_ADDRESS = 1 << 4;
        const RPM_ADDRESS = 1 << 5;
        const APPSBL_ADDRESS = 1 << 6;
        const ENTRYPOINT = 1 << 7;
        const PAGE_SIZE = 1 << 8;
        const BOARD_NAME = 1 << 9;
        const CMDLINE = 1 << 10;
    }
}

/// Whole-image metadata written ahead of the payloads.
///
/// Every field is optional; a format fills in its own defaults for fields
/// left unset and ignores fields it cannot store. Payload sizes and the
/// image checksum are derived while writing and are deliberately absent
/// here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    supported: HeaderFields,
    /// Address the kernel should be loaded to.
    pub kernel_address: Option<u32>,
    /// Address the ramdisk should be loaded to.
    pub ramdisk_address: Option<u32>,
    /// Address the optional second stage bootloader should be loaded to.
    pub second_address: Option<u32>,
    /// Physical address of the kernel tags.
    pub tags_address: Option<u32>,
    /// Address the Sony initial program loader should be loaded to.
    pub ipl_address: Option<u32>,
    /// Address the Sony RPM firmware should be loaded to.
    pub rpm_address: Option<u32>,
    /// Address the Sony applications bootloader should be loaded to.
    pub appsbl_address: Option<u32>,
    /// Address execution starts from.
    pub entrypoint: Option<u32>,
    /// The page size.
    pub page_size: Option<u32>,
    /// Name of the product this image boots on.
    pub board_name: Option<String>,
    /// Arguments to pass to the kernel during boot.
    pub cmdline: Option<String>,
}

impl Header {
    /// Creates an empty header that advertises every field as supported.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_supported(supported: HeaderFields) -> Self {
        Self {
            supported,
            ..Self::default()
        }
    }

    /// The set of fields the producing format is able to store.
    pub fn supported_fields(&self) -> HeaderFields {
        self.supported
    }

    /// Whether the producing format is able to store all given fields.
    pub fn supports(&self, fields: HeaderFields) -> bool {
        self.supported.contains(fields)
    }
}

impl Default for Header {
    fn default() -> Self {
        Self {
            supported: HeaderFields::all(),
            kernel_address: None,
            ramdisk_address: None,
            second_address: None,
            tags_address: None,
            ipl_address: None,
            rpm_address: None,
            appsbl_address: None,
            entrypoint: None,
            page_size: None,
            board_name: None,
            cmdline: None,
        }
    }
}
