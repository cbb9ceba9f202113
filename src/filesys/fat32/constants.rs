//! FAT32 filesystem constants

/// Size of a directory entry in bytes
pub const DIR_ENTRY_SIZE: usize = 32;

/// Directory entries per sector
pub const ENTRIES_PER_SECTOR: usize = super::super::SECTOR_SIZE / DIR_ENTRY_SIZE;

/// Size of FAT entry in bytes (32-bit)
pub const FAT_ENTRY_SIZE: usize = 4;

/// Maximum length of a path component in characters
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Maximum number of components in a path
pub const MAX_PATH_COMPONENTS: usize = 16;

/// Length of the 8.3 name main part
pub const SFN_NAME_SIZE: usize = 8;

/// Length of the 8.3 name extension part
pub const SFN_EXT_SIZE: usize = 3;

/// Mask for the 28 significant bits of a FAT entry
pub const CLUSTER_MASK: u32 = 0x0FFF_FFFF;

/// End of cluster chain marker (any masked value at or above this)
pub const END_OF_CHAIN: u32 = 0x0FFF_FFF8;

/// Bad cluster marker
pub const BAD_CLUSTER: u32 = 0x0FFF_FFF7;

/// Free cluster marker
pub const FREE_CLUSTER: u32 = 0x0000_0000;

/// First valid data cluster number
pub const FIRST_DATA_CLUSTER: u32 = 2;

/// Extended boot signature expected at BPB offset 66
pub const BOOT_SIGNATURE: u8 = 0x29;

/// File system type string at BPB offset 82
pub const FS_TYPE: &[u8; 8] = b"FAT32   ";

/// FSInfo lead signature at offset 0
pub const FSINFO_LEAD_SIGNATURE: u32 = 0x4161_5252;

/// FSInfo structure signature at offset 484
pub const FSINFO_STRUCT_SIGNATURE: u32 = 0x6141_7272;

/// FSInfo trail signature at offset 508
pub const FSINFO_TRAIL_SIGNATURE: u32 = 0xAA55_0000;

/// File attribute: Read-only
pub const ATTR_READ_ONLY: u8 = 0x01;

/// File attribute: Hidden
pub const ATTR_HIDDEN: u8 = 0x02;

/// File attribute: System
pub const ATTR_SYSTEM: u8 = 0x04;

/// File attribute: Volume label
pub const ATTR_VOLUME_ID: u8 = 0x08;

/// File attribute: Directory
pub const ATTR_DIRECTORY: u8 = 0x10;

/// File attribute: Archive
pub const ATTR_ARCHIVE: u8 = 0x20;

/// Attribute value marking a VFAT long-name entry
pub const ATTR_LONG_NAME: u8 = 0x0F;

/// Mask applied before testing for a long-name entry
pub const ATTR_LONG_NAME_MASK: u8 = 0x3F;

/// Marker for deleted directory entries
pub const DELETED_ENTRY_MARKER: u8 = 0xE5;

/// Name byte marking the end of a directory
pub const END_OF_DIRECTORY_MARKER: u8 = 0x00;

/// Minimum cluster count for a volume to be valid FAT32
pub const MIN_FAT32_CLUSTERS: u32 = 65_525;
