//! FAT32 directory entry structure and operations

use alloc::string::String;

use super::constants::*;

/// 8.3 format directory entry (32 bytes on disk)
#[derive(Debug, Clone, Copy)]
pub struct DirEntry83 {
    /// Packed 8.3 name: 8 name bytes then 3 extension bytes, space padded
    pub name: [u8; 11],

    /// File attributes (read-only, directory, etc)
    pub attributes: u8,

    /// Creation time, tenths of a second component
    pub creation_time_tenths: u8,

    /// Creation time
    pub creation_time: u16,

    /// Creation date
    pub creation_date: u16,

    /// Last access date
    pub last_access_date: u16,

    /// Last modification time
    pub modify_time: u16,

    /// Last modification date
    pub modify_date: u16,

    /// First cluster of the entry's chain (0 for an empty file)
    pub first_cluster: u32,

    /// File size in bytes (0 for directories)
    pub size: u32,
}

impl DirEntry83 {
    /// Decodes one 32-byte record. `buf` must be at least 32 bytes.
    pub fn decode(buf: &[u8]) -> Self {
        let mut name = [0u8; 11];
        name.copy_from_slice(&buf[0..11]);

        let cluster_high = u16::from_le_bytes([buf[20], buf[21]]);
        let cluster_low = u16::from_le_bytes([buf[26], buf[27]]);

        Self {
            name,
            attributes: buf[11],
            creation_time_tenths: buf[13],
            creation_time: u16::from_le_bytes([buf[14], buf[15]]),
            creation_date: u16::from_le_bytes([buf[16], buf[17]]),
            last_access_date: u16::from_le_bytes([buf[18], buf[19]]),
            modify_time: u16::from_le_bytes([buf[22], buf[23]]),
            modify_date: u16::from_le_bytes([buf[24], buf[25]]),
            first_cluster: ((cluster_high as u32) << 16) | cluster_low as u32,
            size: u32::from_le_bytes([buf[28], buf[29], buf[30], buf[31]]),
        }
    }

    /// Encodes this record into 32 bytes of `buf`.
    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..11].copy_from_slice(&self.name);
        buf[11] = self.attributes;
        buf[12] = 0; // NT reserved
        buf[13] = self.creation_time_tenths;
        buf[14..16].copy_from_slice(&self.creation_time.to_le_bytes());
        buf[16..18].copy_from_slice(&self.creation_date.to_le_bytes());
        buf[18..20].copy_from_slice(&self.last_access_date.to_le_bytes());
        buf[20..22].copy_from_slice(&((self.first_cluster >> 16) as u16).to_le_bytes());
        buf[22..24].copy_from_slice(&self.modify_time.to_le_bytes());
        buf[24..26].copy_from_slice(&self.modify_date.to_le_bytes());
        buf[26..28].copy_from_slice(&(self.first_cluster as u16).to_le_bytes());
        buf[28..32].copy_from_slice(&self.size.to_le_bytes());
    }

    /// Creates a zero-size file entry with no allocated cluster.
    pub fn new_file(name: [u8; 11]) -> Self {
        Self {
            name,
            attributes: ATTR_ARCHIVE,
            creation_time_tenths: 0,
            creation_time: 0,
            creation_date: 0,
            last_access_date: 0,
            modify_time: 0,
            modify_date: 0,
            first_cluster: 0,
            size: 0,
        }
    }

    /// Creates a directory entry pointing at `first_cluster`.
    pub fn new_directory(name: [u8; 11], first_cluster: u32) -> Self {
        let mut entry = Self::new_file(name);
        entry.attributes = ATTR_DIRECTORY;
        entry.first_cluster = first_cluster;
        entry
    }

    /// Returns true if entry is marked as deleted
    pub fn is_deleted(&self) -> bool {
        self.name[0] == DELETED_ENTRY_MARKER
    }

    /// Returns true if this slot marks the end of the directory
    pub fn is_end_marker(&self) -> bool {
        self.name[0] == END_OF_DIRECTORY_MARKER
    }

    /// Returns true if entry is a VFAT long-name record
    pub fn is_long_name(&self) -> bool {
        self.attributes & ATTR_LONG_NAME_MASK == ATTR_LONG_NAME
    }

    /// Returns true if entry is the volume label
    pub fn is_volume_label(&self) -> bool {
        !self.is_long_name() && self.attributes & ATTR_VOLUME_ID != 0
    }

    /// Returns true if entry is a directory
    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    /// Returns the filename in display form, including the extension
    /// when present (`"README  TXT"` becomes `"README.TXT"`).
    pub fn display_name(&self) -> String {
        super::path::name_from_83(&self.name)
    }
}
