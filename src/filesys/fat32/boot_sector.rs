//! FAT32 boot sector (BIOS Parameter Block) decoding and encoding
//!
//! Field offsets and byte order (little-endian) are the on-disk contract,
//! so all access goes through explicit decode/encode over the raw sector
//! rather than reinterpreting the buffer in place.

use super::super::{FsError, SECTOR_SIZE};
use super::constants::*;

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Parsed FAT32 boot sector fields
#[derive(Debug, Clone)]
pub struct BootSector {
    /// Bytes per sector (must be 512)
    pub bytes_per_sector: u16,

    /// Sectors per cluster (power of two, 1-128)
    pub sectors_per_cluster: u8,

    /// Sectors before the first FAT
    pub reserved_sectors: u16,

    /// Number of FAT copies
    pub num_fats: u8,

    /// Media descriptor byte
    pub media_type: u8,

    /// Total sectors on the volume
    pub total_sectors: u32,

    /// Size of one FAT copy in sectors
    pub sectors_per_fat: u32,

    /// First cluster of the root directory
    pub root_cluster: u32,

    /// Sector number of the FSInfo sector (0 = none)
    pub fs_info_sector: u16,

    /// Sector number of the backup boot sector (0 = none)
    pub backup_boot_sector: u16,

    /// Extended boot signature (0x29 when the extended fields are valid)
    pub boot_signature: u8,

    /// Volume serial number
    pub volume_id: u32,

    /// Volume label, space padded
    pub volume_label: [u8; 11],

    /// File system type string, expected "FAT32   "
    pub fs_type: [u8; 8],
}

impl BootSector {
    /// Decodes the boot sector from a raw sector buffer.
    pub fn decode(buf: &[u8; SECTOR_SIZE]) -> Self {
        let mut volume_label = [0u8; 11];
        volume_label.copy_from_slice(&buf[71..82]);
        let mut fs_type = [0u8; 8];
        fs_type.copy_from_slice(&buf[82..90]);

        Self {
            bytes_per_sector: read_u16(buf, 11),
            sectors_per_cluster: buf[13],
            reserved_sectors: read_u16(buf, 14),
            num_fats: buf[16],
            media_type: buf[21],
            total_sectors: read_u32(buf, 32),
            sectors_per_fat: read_u32(buf, 36),
            root_cluster: read_u32(buf, 44),
            fs_info_sector: read_u16(buf, 48),
            backup_boot_sector: read_u16(buf, 50),
            boot_signature: buf[66],
            volume_id: read_u32(buf, 67),
            volume_label,
            fs_type,
        }
    }

    /// Encodes the boot sector into a raw sector buffer, filling in the
    /// fixed FAT32 fields (jump code, OEM name, geometry, 0x55AA marker).
    pub fn encode(&self, buf: &mut [u8; SECTOR_SIZE]) {
        buf.fill(0);

        buf[0] = 0xEB;
        buf[1] = 0x58;
        buf[2] = 0x90;
        buf[3..11].copy_from_slice(b"MSWIN4.1");

        write_u16(buf, 11, self.bytes_per_sector);
        buf[13] = self.sectors_per_cluster;
        write_u16(buf, 14, self.reserved_sectors);
        buf[16] = self.num_fats;
        // root_entry_count, total_sectors_16, sectors_per_fat_16 stay 0 on FAT32
        buf[21] = self.media_type;
        write_u16(buf, 24, 63); // sectors per track
        write_u16(buf, 26, 255); // heads
        write_u32(buf, 32, self.total_sectors);
        write_u32(buf, 36, self.sectors_per_fat);
        write_u32(buf, 44, self.root_cluster);
        write_u16(buf, 48, self.fs_info_sector);
        write_u16(buf, 50, self.backup_boot_sector);
        buf[64] = 0x80; // BIOS drive number for a hard disk
        buf[66] = self.boot_signature;
        write_u32(buf, 67, self.volume_id);
        buf[71..82].copy_from_slice(&self.volume_label);
        buf[82..90].copy_from_slice(&self.fs_type);

        buf[510] = 0x55;
        buf[511] = 0xAA;
    }

    /// Validates the extended boot signature and type string.
    pub fn is_fat32(&self) -> bool {
        self.boot_signature == BOOT_SIGNATURE && &self.fs_type == FS_TYPE
    }

    /// Checks the geometry fields a mount relies on.
    pub fn validate_geometry(&self) -> Result<(), FsError> {
        if self.bytes_per_sector as usize != SECTOR_SIZE {
            return Err(FsError::InvalidParameter);
        }
        let spc = self.sectors_per_cluster;
        if spc == 0 || spc > 128 || !spc.is_power_of_two() {
            return Err(FsError::InvalidParameter);
        }
        if self.num_fats == 0 || self.sectors_per_fat == 0 {
            return Err(FsError::InvalidParameter);
        }
        if self.root_cluster < FIRST_DATA_CLUSTER {
            return Err(FsError::InvalidCluster);
        }
        Ok(())
    }
}
