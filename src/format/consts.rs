//! Fixed constants of the supported boot image layouts.

/// Constants of the Android boot image layout, shared by the Bump, Loki
/// and MediaTek variations.
pub mod android {
    /// Magic number at the start of every Android boot image.
    pub const BOOT_MAGIC: &[u8; 8] = b"ANDROID!";
    /// Size of an Android boot image header on disk.
    pub const HEADER_SIZE: u64 = 608;
    /// Size of the board name field.
    pub const NAME_SIZE: usize = 16;
    /// Size of the kernel command line field.
    pub const CMDLINE_SIZE: usize = 512;
    /// Size of the checksum field.
    pub const ID_SIZE: usize = 32;

    /// Page sizes boot images are known to be broken up in.
    pub const PAGE_SIZES: &[u32] = &[2048, 4096, 8192, 16384, 32768, 65536, 131072];

    /// Address the kernel should be loaded to.
    pub const DEFAULT_KERNEL_ADDRESS: u32 = 0x1000_8000;
    /// Address the ramdisk should be loaded to.
    pub const DEFAULT_RAMDISK_ADDRESS: u32 = 0x1100_0000;
    /// Address the second stage bootloader should be loaded to.
    pub const DEFAULT_SECOND_ADDRESS: u32 = 0x100f_0000;
    /// Address the kernel tags should be loaded to.
    pub const DEFAULT_TAGS_ADDRESS: u32 = 0x1000_0100;
    /// Page size used when the header does not request one.
    pub const DEFAULT_PAGE_SIZE: u32 = 2048;

    /// Magic number appended to an image to mark it as bumped.
    pub const BUMP_MAGIC: &[u8; 16] = &[
        0x41, 0xa9, 0xe4, 0x67, 0x74, 0x4d, 0x1d, 0x1b, 0xa4, 0x29, 0xf2, 0xec, 0xea, 0x65, 0x52,
        0x79,
    ];
}

/// Constants of the Loki patch applied to Android boot images.
pub mod loki {
    /// Magic number at the start of a Loki patch record.
    pub const LOKI_MAGIC: &[u8; 4] = b"LOKI";
    /// Offset of the patch record within the image.
    pub const LOKI_MAGIC_OFFSET: u64 = 0x400;
    /// Size of the build string field in the patch record.
    pub const LOKI_BUILD_SIZE: usize = 128;
    /// Size of a Loki patch record on disk.
    pub const LOKI_HEADER_SIZE: u64 = 148;

    /// Smallest aboot image the patcher accepts.
    pub const ABOOT_MIN_SIZE: usize = 4096;
    /// Offset within aboot of the word the load base is read from.
    pub const ABOOT_BASE_OFFSET: usize = 12;
    /// Amount the word read from aboot exceeds the load base by.
    pub const ABOOT_BASE_BIAS: u32 = 0x28;
}

/// Constants of the MediaTek headers wrapped around image sections.
pub mod mtk {
    /// Magic number at the start of a MediaTek section header.
    pub const MTK_MAGIC: &[u8; 4] = &[0x88, 0x16, 0x88, 0x58];
    /// Size of a MediaTek section header on disk.
    pub const MTK_HEADER_SIZE: u64 = 512;
    /// Size of the section label field.
    pub const MTK_NAME_SIZE: usize = 32;

    /// Section label for the kernel.
    pub const MTK_LABEL_KERNEL: &[u8] = b"KERNEL";
    /// Section label for the ramdisk.
    pub const MTK_LABEL_RAMDISK: &[u8] = b"ROOTFS";
}

/// Constants of the ELF boot images used by Sony devices.
pub mod sony_elf {
    /// Magic number at the start of every ELF image.
    pub const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
    /// Size of the ELF file header on disk.
    pub const EHDR_SIZE: u64 = 52;
    /// Size of one program header on disk.
    pub const PHDR_SIZE: u64 = 32;
    /// Number of program header slots reserved in the image.
    pub const MAX_PHDRS: u64 = 6;

    /// ELF type of a bootable image.
    pub const ET_EXEC: u16 = 2;
    /// ELF machine number for ARM.
    pub const EM_ARM: u16 = 40;
    /// Program header type of a loadable segment.
    pub const PT_LOAD: u32 = 1;
    /// Program header type of the command line note.
    pub const PT_NOTE: u32 = 4;

    /// Flags word marking a ramdisk segment.
    pub const FLAGS_RAMDISK: u32 = 0x8000_0000;
    /// Flags word marking an IPL segment.
    pub const FLAGS_IPL: u32 = 0x4000_0000;
    /// Flags word marking an RPM segment.
    pub const FLAGS_RPM: u32 = 0x0100_0000;
    /// Flags word marking an appsbl segment.
    pub const FLAGS_APPSBL: u32 = 0x0200_0000;

    /// Address the kernel should be loaded to.
    pub const DEFAULT_KERNEL_ADDRESS: u32 = 0x0020_8000;
    /// Address the ramdisk should be loaded to.
    pub const DEFAULT_RAMDISK_ADDRESS: u32 = 0x0200_0000;
}
