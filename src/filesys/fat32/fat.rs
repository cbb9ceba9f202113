//! FAT table manager: cluster chain primitives and the write-through
//! single-sector FAT cache

use log::warn;

use super::super::{BlockDevice, FsError, SECTOR_SIZE};
use super::constants::*;
use super::Fat32;

/// One FAT sector's worth of entries, tagged by LBA. Mutations write
/// through immediately, so the cache is never dirty; reads are served
/// from it when the tag matches.
pub(super) struct FatCache {
    pub(super) buf: [u8; SECTOR_SIZE],
    pub(super) lba: Option<u32>,
}

impl FatCache {
    pub(super) fn new() -> Self {
        Self {
            buf: [0; SECTOR_SIZE],
            lba: None,
        }
    }

    pub(super) fn invalidate(&mut self) {
        self.lba = None;
    }
}

/// Bounded cluster chain traversal. Yields each cluster of a chain in
/// order and fails with `InvalidCluster` if the chain is longer than
/// the volume has clusters, which can only mean a loop or cross-link.
pub(super) struct ChainWalker {
    next: u32,
    steps: u32,
    limit: u32,
}

impl ChainWalker {
    pub(super) fn new(start: u32, total_clusters: u32) -> Self {
        Self {
            next: start,
            steps: 0,
            limit: total_clusters + 1,
        }
    }

    /// Returns the next cluster of the chain, or `None` past the end.
    pub(super) fn advance<D: BlockDevice>(
        &mut self,
        fs: &mut Fat32<D>,
    ) -> Result<Option<u32>, FsError> {
        if self.next >= END_OF_CHAIN {
            return Ok(None);
        }
        if self.next < FIRST_DATA_CLUSTER || self.next == BAD_CLUSTER {
            return Err(FsError::InvalidCluster);
        }
        self.steps += 1;
        if self.steps > self.limit {
            return Err(FsError::InvalidCluster);
        }
        let current = self.next;
        self.next = fs.next_cluster(current)?;
        Ok(Some(current))
    }
}

impl<D: BlockDevice> Fat32<D> {
    /// Maps a cluster number to the FAT sector holding its entry and
    /// the byte offset within that sector.
    fn fat_position(&self, cluster: u32) -> (u32, usize) {
        let byte_offset = cluster as u64 * FAT_ENTRY_SIZE as u64;
        let sector = (byte_offset / SECTOR_SIZE as u64) as u32;
        let offset = (byte_offset % SECTOR_SIZE as u64) as usize;
        (sector, offset)
    }

    /// Loads the given FAT sector (relative to the first FAT) into the
    /// cache unless it is already resident.
    fn load_fat_sector(&mut self, fat_sector: u32) -> Result<(), FsError> {
        let lba = self.volume.fat_begin_lba + fat_sector;
        if self.fat_cache.lba != Some(lba) {
            self.device.read_sector(lba, &mut self.fat_cache.buf)?;
            self.fat_cache.lba = Some(lba);
        }
        Ok(())
    }

    /// Reads the raw 28-bit FAT entry for `cluster`.
    fn fat_entry(&mut self, cluster: u32) -> Result<u32, FsError> {
        let (fat_sector, offset) = self.fat_position(cluster);
        self.load_fat_sector(fat_sector)?;
        let buf = &self.fat_cache.buf;
        let raw = u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]]);
        Ok(raw & CLUSTER_MASK)
    }

    /// Returns the cluster following `cluster` in its chain, or an
    /// end-of-chain marker if the input is out of range or the chain
    /// ends there.
    pub fn next_cluster(&mut self, cluster: u32) -> Result<u32, FsError> {
        if cluster < FIRST_DATA_CLUSTER || cluster >= self.volume.total_clusters + 2 {
            return Ok(END_OF_CHAIN);
        }
        let value = self.fat_entry(cluster)?;
        Ok(if value >= END_OF_CHAIN {
            END_OF_CHAIN
        } else {
            value
        })
    }

    /// Links `cluster` to `value` in the FAT, preserving the reserved
    /// top 4 bits of the existing entry. The updated sector is written
    /// through to the primary FAT and mirrored to every other copy;
    /// mirror failures are logged but do not fail the operation.
    pub fn set_next_cluster(&mut self, cluster: u32, value: u32) -> Result<(), FsError> {
        if cluster < FIRST_DATA_CLUSTER || cluster >= self.volume.total_clusters + 2 {
            return Err(FsError::InvalidCluster);
        }

        let (fat_sector, offset) = self.fat_position(cluster);
        self.load_fat_sector(fat_sector)?;

        let buf = &mut self.fat_cache.buf;
        let old = u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]]);
        let new = (old & !CLUSTER_MASK) | (value & CLUSTER_MASK);
        buf[offset..offset + 4].copy_from_slice(&new.to_le_bytes());

        let primary_lba = self.volume.fat_begin_lba + fat_sector;
        self.device.write_sector(primary_lba, &self.fat_cache.buf)?;

        for copy in 1..self.volume.num_fats as u32 {
            let mirror_lba = primary_lba + copy * self.volume.fat_size;
            if self
                .device
                .write_sector(mirror_lba, &self.fat_cache.buf)
                .is_err()
            {
                warn!("failed to update FAT mirror {copy} at LBA {mirror_lba}");
            }
        }

        Ok(())
    }

    /// Finds and claims a free cluster, marking it end-of-chain.
    ///
    /// Probes linearly from the free-cluster hint, wrapping past the
    /// last cluster back to 2; if the probe returns to where it
    /// started the volume is full.
    pub fn allocate_cluster(&mut self) -> Result<u32, FsError> {
        let limit = self.volume.total_clusters + 2;
        let start = self.volume.next_free.clamp(FIRST_DATA_CLUSTER, limit - 1);

        let mut cluster = start;
        loop {
            if self.fat_entry(cluster)? == FREE_CLUSTER {
                break;
            }
            cluster += 1;
            if cluster >= limit {
                cluster = FIRST_DATA_CLUSTER;
            }
            if cluster == start {
                return Err(FsError::DiskFull);
            }
        }

        self.set_next_cluster(cluster, CLUSTER_MASK)?;

        self.volume.next_free = if cluster + 1 >= limit {
            FIRST_DATA_CLUSTER
        } else {
            cluster + 1
        };
        self.volume.free_clusters = self.volume.free_clusters.saturating_sub(1);

        Ok(cluster)
    }

    /// Frees every cluster of the chain starting at `start`, walking at
    /// most `total_clusters` links before declaring the chain corrupt.
    pub fn free_chain(&mut self, start: u32) -> Result<(), FsError> {
        if start < FIRST_DATA_CLUSTER || start >= self.volume.total_clusters + 2 {
            return Err(FsError::InvalidCluster);
        }

        let mut walker = ChainWalker::new(start, self.volume.total_clusters);
        while let Some(cluster) = walker.advance(self)? {
            self.set_next_cluster(cluster, FREE_CLUSTER)?;
            self.volume.free_clusters = self.volume.free_clusters.saturating_add(1);
        }

        if start < self.volume.next_free {
            self.volume.next_free = start;
        }

        Ok(())
    }

    /// Counts free FAT entries by scanning the whole table. Used when
    /// the FSInfo free count is absent or implausible.
    pub(super) fn count_free_clusters(&mut self) -> Result<u32, FsError> {
        let mut free = 0;
        for cluster in FIRST_DATA_CLUSTER..self.volume.total_clusters + 2 {
            if self.fat_entry(cluster)? == FREE_CLUSTER {
                free += 1;
            }
        }
        Ok(free)
    }
}
