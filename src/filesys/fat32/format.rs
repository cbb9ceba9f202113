//! FAT32 volume formatting

use log::debug;

use super::super::{BlockDevice, FsError, SECTOR_SIZE};
use super::boot_sector::BootSector;
use super::constants::*;
use super::fs_info::FsInfo;

/// Reserved sectors ahead of the first FAT.
const RESERVED_SECTORS: u16 = 32;

/// Sector of the backup boot sector.
const BACKUP_BOOT_SECTOR: u16 = 6;

/// Picks a cluster size by volume size tier: 4 KiB clusters below
/// 8 GiB, scaling to 32 KiB clusters above 32 GiB.
fn sectors_per_cluster_for(total_sectors: u32) -> u8 {
    const SECTORS_PER_GIB: u32 = 2 * 1024 * 1024;
    if total_sectors <= 8 * SECTORS_PER_GIB {
        8
    } else if total_sectors <= 16 * SECTORS_PER_GIB {
        16
    } else if total_sectors <= 32 * SECTORS_PER_GIB {
        32
    } else {
        64
    }
}

/// Formats the device as an empty FAT32 volume: boot sector and
/// backup, FSInfo and backup, both FAT copies with the three reserved
/// entries, a zeroed root directory cluster, and a zeroed data region.
///
/// Volumes that would yield fewer than 65,525 clusters are not valid
/// FAT32 and are rejected with `InvalidParameter`.
pub fn format_volume<D: BlockDevice>(device: &mut D, label: &str) -> Result<(), FsError> {
    let total_sectors = device.total_sectors();
    let sectors_per_cluster = sectors_per_cluster_for(total_sectors);
    let num_fats: u8 = 2;

    if total_sectors <= RESERVED_SECTORS as u32 {
        return Err(FsError::InvalidParameter);
    }

    // Size each FAT from an estimate of the cluster count, four bytes
    // per entry plus the two reserved entries.
    let cluster_estimate = (total_sectors - RESERVED_SECTORS as u32) / sectors_per_cluster as u32;
    let fat_size =
        ((cluster_estimate + 2) * FAT_ENTRY_SIZE as u32).div_ceil(SECTOR_SIZE as u32);

    let cluster_begin_lba = RESERVED_SECTORS as u32 + num_fats as u32 * fat_size;
    if total_sectors <= cluster_begin_lba {
        return Err(FsError::InvalidParameter);
    }
    let total_clusters = (total_sectors - cluster_begin_lba) / sectors_per_cluster as u32;
    if total_clusters < MIN_FAT32_CLUSTERS {
        return Err(FsError::InvalidParameter);
    }

    debug!(
        "formatting FAT32 volume: {total_sectors} sectors, \
         {sectors_per_cluster} sectors/cluster, {total_clusters} clusters"
    );

    let mut volume_label = [b' '; 11];
    for (dst, src) in volume_label.iter_mut().zip(label.bytes()) {
        *dst = src;
    }

    let boot = BootSector {
        bytes_per_sector: SECTOR_SIZE as u16,
        sectors_per_cluster,
        reserved_sectors: RESERVED_SECTORS,
        num_fats,
        media_type: 0xF8, // fixed disk
        total_sectors,
        sectors_per_fat: fat_size,
        root_cluster: FIRST_DATA_CLUSTER,
        fs_info_sector: 1,
        backup_boot_sector: BACKUP_BOOT_SECTOR,
        boot_signature: BOOT_SIGNATURE,
        volume_id: total_sectors ^ 0x2077_1115,
        volume_label,
        fs_type: *FS_TYPE,
    };

    let mut sector = [0u8; SECTOR_SIZE];
    boot.encode(&mut sector);
    device.write_sector(0, &sector)?;
    device.write_sector(BACKUP_BOOT_SECTOR as u32, &sector)?;

    // Root directory occupies one cluster from the start.
    let fs_info = FsInfo {
        free_clusters: total_clusters - 1,
        next_free: 3,
    };
    fs_info.encode(&mut sector);
    device.write_sector(1, &sector)?;
    device.write_sector(BACKUP_BOOT_SECTOR as u32 + 1, &sector)?;

    // First FAT sector: media descriptor, the reserved cluster 1, and
    // the root directory's end-of-chain entry.
    sector.fill(0);
    sector[0..4].copy_from_slice(&0x0FFF_FFF8u32.to_le_bytes());
    sector[4..8].copy_from_slice(&CLUSTER_MASK.to_le_bytes());
    sector[8..12].copy_from_slice(&CLUSTER_MASK.to_le_bytes());

    for copy in 0..num_fats as u32 {
        let fat_begin = RESERVED_SECTORS as u32 + copy * fat_size;
        device.write_sector(fat_begin, &sector)?;
    }

    sector.fill(0);
    for copy in 0..num_fats as u32 {
        let fat_begin = RESERVED_SECTORS as u32 + copy * fat_size;
        for i in 1..fat_size {
            device.write_sector(fat_begin + i, &sector)?;
        }
    }

    // Zero the root directory cluster and the rest of the data region.
    for lba in cluster_begin_lba..total_sectors {
        device.write_sector(lba, &sector)?;
    }

    debug!("FAT32 format completed");
    Ok(())
}
