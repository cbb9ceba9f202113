//! FAT32 filesystem implementation
//!
//! One [`Fat32`] instance owns one block device and all the mutable
//! volume state: the parsed volume descriptor, the write-through FAT
//! sector cache, and the single-slot cluster cache. Callers in a
//! multi-tasking host are responsible for serializing access.

pub mod boot_sector;
pub mod constants;
pub mod dir_entry;
pub mod fat;
pub mod file;
pub mod format;
pub mod fs_info;
pub mod path;

#[cfg(test)]
pub(crate) mod testing;

use alloc::string::String;
use alloc::vec;
use log::debug;

use super::{BlockDevice, FsError, SECTOR_SIZE};
use boot_sector::BootSector;
use constants::*;
use dir_entry::DirEntry83;
use fat::{ChainWalker, FatCache};
use fs_info::FsInfo;

pub use file::{DirectoryEntryInfo, FileHandle};

/// Geometry and allocation state of a mounted volume, derived from the
/// boot sector and FSInfo at mount time.
#[derive(Debug, Clone)]
pub struct VolumeDescriptor {
    /// Bytes per sector (always 512)
    pub bytes_per_sector: u16,

    /// Sectors per cluster
    pub sectors_per_cluster: u8,

    /// Number of FAT copies
    pub num_fats: u8,

    /// Size of one FAT copy in sectors
    pub fat_size: u32,

    /// LBA of the first FAT
    pub fat_begin_lba: u32,

    /// LBA of the first data cluster
    pub cluster_begin_lba: u32,

    /// First cluster of the root directory
    pub root_cluster: u32,

    /// Total sectors on the volume
    pub total_sectors: u32,

    /// Sectors in the data region
    pub data_sectors: u32,

    /// Clusters in the data region
    pub total_clusters: u32,

    /// Free cluster count, kept in sync with every allocate/free
    pub free_clusters: u32,

    /// Next-free allocation hint
    pub next_free: u32,

    /// Sector number of the FSInfo sector (0 = none)
    pub fs_info_sector: u16,

    /// Volume serial number
    pub volume_id: u32,

    /// Volume label, space padded
    pub volume_label: [u8; 11],
}

impl VolumeDescriptor {
    /// Bytes in one cluster.
    pub fn bytes_per_cluster(&self) -> u32 {
        self.sectors_per_cluster as u32 * self.bytes_per_sector as u32
    }

    /// Volume label with trailing padding removed.
    pub fn label(&self) -> String {
        let end = self
            .volume_label
            .iter()
            .rposition(|&c| c != b' ')
            .map_or(0, |p| p + 1);
        self.volume_label[..end]
            .iter()
            .map(|&c| c as char)
            .collect()
    }
}

/// Single-slot read cache for whole data clusters, tagged by cluster
/// number. Strictly a performance optimization.
struct ClusterCache {
    buf: alloc::vec::Vec<u8>,
    cluster: Option<u32>,
}

impl ClusterCache {
    fn new(bytes_per_cluster: usize) -> Self {
        Self {
            buf: vec![0; bytes_per_cluster],
            cluster: None,
        }
    }

    fn invalidate(&mut self) {
        self.cluster = None;
    }
}

/// On-disk position of a directory entry: the data cluster holding it
/// and the byte offset within that cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryLocation {
    pub(crate) cluster: u32,
    pub(crate) offset: usize,
}

/// A mounted FAT32 volume
pub struct Fat32<D: BlockDevice> {
    pub(crate) device: D,
    pub(crate) volume: VolumeDescriptor,
    pub(crate) fat_cache: FatCache,
    cluster_cache: ClusterCache,
    current_directory: u32,
    initialized: bool,
}

impl<D: BlockDevice> Fat32<D> {
    /// Mounts the volume: reads and validates the boot sector, derives
    /// the volume descriptor, and adopts the FSInfo free-cluster count
    /// and allocation hint when they check out. Media without a FAT32
    /// signature fails with `NotFound`.
    pub fn mount(mut device: D) -> Result<Self, FsError> {
        let mut sector = [0u8; SECTOR_SIZE];
        device.read_sector(0, &mut sector)?;

        let boot = BootSector::decode(&sector);
        if !boot.is_fat32() {
            return Err(FsError::NotFound);
        }
        boot.validate_geometry()?;

        let fat_begin_lba = boot.reserved_sectors as u32;
        let cluster_begin_lba = fat_begin_lba + boot.num_fats as u32 * boot.sectors_per_fat;
        if boot.total_sectors <= cluster_begin_lba {
            return Err(FsError::InvalidParameter);
        }
        let data_sectors = boot.total_sectors - cluster_begin_lba;
        let total_clusters = data_sectors / boot.sectors_per_cluster as u32;

        let volume = VolumeDescriptor {
            bytes_per_sector: boot.bytes_per_sector,
            sectors_per_cluster: boot.sectors_per_cluster,
            num_fats: boot.num_fats,
            fat_size: boot.sectors_per_fat,
            fat_begin_lba,
            cluster_begin_lba,
            root_cluster: boot.root_cluster,
            total_sectors: boot.total_sectors,
            data_sectors,
            total_clusters,
            free_clusters: 0,
            next_free: FIRST_DATA_CLUSTER,
            fs_info_sector: boot.fs_info_sector,
            volume_id: boot.volume_id,
            volume_label: boot.volume_label,
        };

        let bytes_per_cluster = volume.bytes_per_cluster() as usize;
        let root = volume.root_cluster;
        let mut fs = Self {
            device,
            volume,
            fat_cache: FatCache::new(),
            cluster_cache: ClusterCache::new(bytes_per_cluster),
            current_directory: root,
            initialized: true,
        };

        let mut counters_adopted = false;
        let fs_info_sector = fs.volume.fs_info_sector;
        if fs_info_sector != 0 && fs_info_sector != 0xFFFF {
            if fs.device.read_sector(fs_info_sector as u32, &mut sector).is_ok() {
                if let Some(info) = FsInfo::decode(&sector) {
                    let hint_range = FIRST_DATA_CLUSTER..fs.volume.total_clusters + 2;
                    if hint_range.contains(&info.next_free) {
                        fs.volume.next_free = info.next_free;
                        if info.free_clusters <= fs.volume.total_clusters {
                            fs.volume.free_clusters = info.free_clusters;
                            counters_adopted = true;
                        }
                    }
                }
            }
        }
        if !counters_adopted {
            fs.volume.free_clusters = fs.count_free_clusters()?;
        }

        debug!(
            "mounted FAT32 volume '{}': {} clusters, {} free",
            fs.volume.label(),
            fs.volume.total_clusters,
            fs.volume.free_clusters
        );

        Ok(fs)
    }

    /// Unmounts the volume: persists the free-cluster count and hint to
    /// the FSInfo sector, drops the caches, and rejects every later
    /// operation with `NotInitialized`.
    pub fn unmount(&mut self) -> Result<(), FsError> {
        self.ensure_mounted()?;

        let fs_info_sector = self.volume.fs_info_sector;
        if fs_info_sector != 0 && fs_info_sector != 0xFFFF {
            let mut sector = [0u8; SECTOR_SIZE];
            let lba = fs_info_sector as u32;
            if self.device.read_sector(lba, &mut sector).is_ok()
                && FsInfo::decode(&sector).is_some()
            {
                FsInfo {
                    free_clusters: self.volume.free_clusters,
                    next_free: self.volume.next_free,
                }
                .encode(&mut sector);
                self.device.write_sector(lba, &sector)?;
            }
        }

        self.fat_cache.invalidate();
        self.cluster_cache.invalidate();
        self.initialized = false;
        debug!("FAT32 volume unmounted");
        Ok(())
    }

    /// Probes whether the device carries a FAT32 filesystem without
    /// mounting it.
    pub fn check_filesystem(device: &mut D) -> Result<(), FsError> {
        let mut sector = [0u8; SECTOR_SIZE];
        device.read_sector(0, &mut sector)?;
        if BootSector::decode(&sector).is_fat32() {
            Ok(())
        } else {
            Err(FsError::NotFound)
        }
    }

    /// Consumes the engine and returns the underlying device.
    pub fn into_device(self) -> D {
        self.device
    }

    pub(crate) fn ensure_mounted(&self) -> Result<(), FsError> {
        if self.initialized {
            Ok(())
        } else {
            Err(FsError::NotInitialized)
        }
    }

    /// The mounted volume's descriptor.
    pub fn volume_info(&self) -> Result<&VolumeDescriptor, FsError> {
        self.ensure_mounted()?;
        Ok(&self.volume)
    }

    /// Free space on the volume in bytes.
    pub fn free_space(&self) -> Result<u64, FsError> {
        self.ensure_mounted()?;
        Ok(self.volume.free_clusters as u64 * self.volume.bytes_per_cluster() as u64)
    }

    /// Total data-region capacity of the volume in bytes.
    pub fn total_space(&self) -> Result<u64, FsError> {
        self.ensure_mounted()?;
        Ok(self.volume.total_clusters as u64 * self.volume.bytes_per_cluster() as u64)
    }

    // ------------------------------------------------------------------
    // Cluster I/O

    /// Maps a data cluster number to its first sector.
    pub fn cluster_to_lba(&self, cluster: u32) -> Result<u32, FsError> {
        if cluster < FIRST_DATA_CLUSTER {
            return Err(FsError::InvalidCluster);
        }
        Ok(self.volume.cluster_begin_lba
            + (cluster - FIRST_DATA_CLUSTER) * self.volume.sectors_per_cluster as u32)
    }

    /// Reads a whole cluster into `buf`, serving it from the cluster
    /// cache when the tag matches. `buf` must be one cluster long.
    pub(crate) fn read_cluster(&mut self, cluster: u32, buf: &mut [u8]) -> Result<(), FsError> {
        debug_assert_eq!(buf.len(), self.volume.bytes_per_cluster() as usize);

        if self.cluster_cache.cluster == Some(cluster) {
            buf.copy_from_slice(&self.cluster_cache.buf);
            return Ok(());
        }

        let lba = self.cluster_to_lba(cluster)?;
        let mut sector = [0u8; SECTOR_SIZE];
        for i in 0..self.volume.sectors_per_cluster as u32 {
            self.device.read_sector(lba + i, &mut sector)?;
            let start = i as usize * SECTOR_SIZE;
            buf[start..start + SECTOR_SIZE].copy_from_slice(&sector);
        }

        self.cluster_cache.buf.copy_from_slice(buf);
        self.cluster_cache.cluster = Some(cluster);
        Ok(())
    }

    /// Writes a whole cluster from `buf`, updating the cached copy if
    /// this cluster is resident.
    pub(crate) fn write_cluster(&mut self, cluster: u32, buf: &[u8]) -> Result<(), FsError> {
        debug_assert_eq!(buf.len(), self.volume.bytes_per_cluster() as usize);

        let lba = self.cluster_to_lba(cluster)?;
        let mut sector = [0u8; SECTOR_SIZE];
        for i in 0..self.volume.sectors_per_cluster as u32 {
            let start = i as usize * SECTOR_SIZE;
            sector.copy_from_slice(&buf[start..start + SECTOR_SIZE]);
            self.device.write_sector(lba + i, &sector)?;
        }

        if self.cluster_cache.cluster == Some(cluster) {
            self.cluster_cache.buf.copy_from_slice(buf);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Directory engine

    /// First cluster an entry points at, mapping the conventional 0 in
    /// `..` entries back to the root cluster.
    pub(crate) fn entry_cluster(&self, entry: &DirEntry83) -> u32 {
        if entry.first_cluster == 0 && entry.is_directory() {
            self.volume.root_cluster
        } else {
            entry.first_cluster
        }
    }

    /// Scans a directory's cluster chain for a live entry with the
    /// given packed 8.3 name, skipping deleted and long-name records.
    pub(crate) fn find_entry_in_dir(
        &mut self,
        dir_cluster: u32,
        name: &[u8; 11],
    ) -> Result<(DirEntry83, EntryLocation), FsError> {
        let bpc = self.volume.bytes_per_cluster() as usize;
        let mut data = vec![0u8; bpc];

        let mut walker = ChainWalker::new(dir_cluster, self.volume.total_clusters);
        while let Some(cluster) = walker.advance(self)? {
            self.read_cluster(cluster, &mut data)?;
            for offset in (0..bpc).step_by(DIR_ENTRY_SIZE) {
                let entry = DirEntry83::decode(&data[offset..offset + DIR_ENTRY_SIZE]);
                if entry.is_end_marker() {
                    return Err(FsError::NotFound);
                }
                if entry.is_deleted() || entry.is_long_name() {
                    continue;
                }
                if entry.name == *name {
                    return Ok((entry, EntryLocation { cluster, offset }));
                }
            }
        }

        Err(FsError::NotFound)
    }

    /// Resolves all but the last component of `path` from the root,
    /// returning the parent directory's cluster and the packed final
    /// component.
    pub(crate) fn resolve_parent(&mut self, p: &str) -> Result<(u32, [u8; 11]), FsError> {
        let components = path::parse_path(p)?;
        let Some((last, dirs)) = components.split_last() else {
            return Err(FsError::InvalidPath);
        };

        let mut parent = self.volume.root_cluster;
        for component in dirs {
            let (entry, _) = self.find_entry_in_dir(parent, component)?;
            if !entry.is_directory() {
                return Err(FsError::NotDirectory);
            }
            parent = self.entry_cluster(&entry);
        }

        Ok((parent, *last))
    }

    /// Resolves `path` to its directory entry and on-disk location.
    pub(crate) fn resolve_entry(
        &mut self,
        p: &str,
    ) -> Result<(DirEntry83, EntryLocation), FsError> {
        let (parent, name) = self.resolve_parent(p)?;
        self.find_entry_in_dir(parent, &name)
    }

    /// Fails with `FileExists` if `name` is already present in the
    /// directory; I/O errors short of `NotFound` propagate.
    fn ensure_absent(&mut self, dir_cluster: u32, name: &[u8; 11]) -> Result<(), FsError> {
        match self.find_entry_in_dir(dir_cluster, name) {
            Ok(_) => Err(FsError::FileExists),
            Err(FsError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Writes `entry` into the first free or deleted slot of the
    /// directory, extending the directory's cluster chain with a fresh
    /// zeroed cluster when no slot is left.
    pub(crate) fn insert_entry(
        &mut self,
        dir_cluster: u32,
        entry: &DirEntry83,
    ) -> Result<EntryLocation, FsError> {
        let bpc = self.volume.bytes_per_cluster() as usize;
        let mut data = vec![0u8; bpc];

        let mut last = dir_cluster;
        let mut walker = ChainWalker::new(dir_cluster, self.volume.total_clusters);
        while let Some(cluster) = walker.advance(self)? {
            last = cluster;
            self.read_cluster(cluster, &mut data)?;
            for offset in (0..bpc).step_by(DIR_ENTRY_SIZE) {
                let first = data[offset];
                if first == END_OF_DIRECTORY_MARKER || first == DELETED_ENTRY_MARKER {
                    entry.encode(&mut data[offset..offset + DIR_ENTRY_SIZE]);
                    self.write_cluster(cluster, &data)?;
                    return Ok(EntryLocation { cluster, offset });
                }
            }
        }

        // Directory is packed; grow the chain by one cluster.
        let new_cluster = self.allocate_cluster()?;
        self.set_next_cluster(last, new_cluster)?;
        data.fill(0);
        entry.encode(&mut data[..DIR_ENTRY_SIZE]);
        self.write_cluster(new_cluster, &data)?;
        Ok(EntryLocation {
            cluster: new_cluster,
            offset: 0,
        })
    }

    /// Rewrites the directory entry at `loc`.
    pub(crate) fn update_entry(
        &mut self,
        loc: EntryLocation,
        entry: &DirEntry83,
    ) -> Result<(), FsError> {
        let bpc = self.volume.bytes_per_cluster() as usize;
        let mut data = vec![0u8; bpc];
        self.read_cluster(loc.cluster, &mut data)?;
        entry.encode(&mut data[loc.offset..loc.offset + DIR_ENTRY_SIZE]);
        self.write_cluster(loc.cluster, &data)
    }

    /// Tombstones the directory entry at `loc`. Entries are never
    /// physically compacted.
    fn mark_deleted(&mut self, loc: EntryLocation) -> Result<(), FsError> {
        let bpc = self.volume.bytes_per_cluster() as usize;
        let mut data = vec![0u8; bpc];
        self.read_cluster(loc.cluster, &mut data)?;
        data[loc.offset] = DELETED_ENTRY_MARKER;
        self.write_cluster(loc.cluster, &data)
    }

    /// Checks the directory's entire chain for live entries other than
    /// `.` and `..`.
    fn is_directory_empty(&mut self, dir_cluster: u32) -> Result<bool, FsError> {
        let bpc = self.volume.bytes_per_cluster() as usize;
        let mut data = vec![0u8; bpc];

        let mut walker = ChainWalker::new(dir_cluster, self.volume.total_clusters);
        while let Some(cluster) = walker.advance(self)? {
            self.read_cluster(cluster, &mut data)?;
            for offset in (0..bpc).step_by(DIR_ENTRY_SIZE) {
                let entry = DirEntry83::decode(&data[offset..offset + DIR_ENTRY_SIZE]);
                if entry.is_end_marker() {
                    return Ok(true);
                }
                if entry.is_deleted() || entry.is_long_name() || entry.name[0] == b'.' {
                    continue;
                }
                return Ok(false);
            }
        }

        Ok(true)
    }

    // ------------------------------------------------------------------
    // Path operations

    /// Deletes a file, freeing its cluster chain and tombstoning its
    /// directory entry. Directories fail with `IsDirectory`.
    pub fn delete_file(&mut self, p: &str) -> Result<(), FsError> {
        self.ensure_mounted()?;

        let (entry, loc) = self.resolve_entry(p)?;
        if entry.is_directory() {
            return Err(FsError::IsDirectory);
        }

        if entry.first_cluster != 0 {
            self.free_chain(entry.first_cluster)?;
        }
        self.mark_deleted(loc)
    }

    /// Creates a directory: allocates and zeroes its first cluster,
    /// writes the `.` and `..` entries, and inserts the entry into the
    /// parent. The allocated cluster is released again on any failure.
    pub fn create_directory(&mut self, p: &str) -> Result<(), FsError> {
        self.ensure_mounted()?;

        let (parent, name) = self.resolve_parent(p)?;
        self.ensure_absent(parent, &name)?;

        let dir_cluster = self.allocate_cluster()?;

        let bpc = self.volume.bytes_per_cluster() as usize;
        let mut data = vec![0u8; bpc];
        let dot = DirEntry83::new_directory(path::filename_to_83("."), dir_cluster);
        dot.encode(&mut data[..DIR_ENTRY_SIZE]);
        let dotdot = DirEntry83::new_directory(path::filename_to_83(".."), parent);
        dotdot.encode(&mut data[DIR_ENTRY_SIZE..2 * DIR_ENTRY_SIZE]);

        if let Err(e) = self.write_cluster(dir_cluster, &data) {
            let _ = self.free_chain(dir_cluster);
            return Err(e);
        }

        let entry = DirEntry83::new_directory(name, dir_cluster);
        if let Err(e) = self.insert_entry(parent, &entry) {
            let _ = self.free_chain(dir_cluster);
            return Err(e);
        }

        Ok(())
    }

    /// Deletes a directory. The target must contain no live entries
    /// beyond `.` and `..` anywhere in its chain, else `AccessDenied`.
    pub fn delete_directory(&mut self, p: &str) -> Result<(), FsError> {
        self.ensure_mounted()?;

        let (entry, loc) = self.resolve_entry(p)?;
        if !entry.is_directory() {
            return Err(FsError::NotDirectory);
        }

        let dir_cluster = self.entry_cluster(&entry);
        if dir_cluster == self.volume.root_cluster {
            return Err(FsError::AccessDenied);
        }
        if !self.is_directory_empty(dir_cluster)? {
            return Err(FsError::AccessDenied);
        }

        self.free_chain(dir_cluster)?;
        self.mark_deleted(loc)
    }

    /// Renames an entry within its directory. The old and new paths
    /// must share every component but the last; the new name must not
    /// already exist.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), FsError> {
        self.ensure_mounted()?;

        let old_components = path::parse_path(old)?;
        let new_components = path::parse_path(new)?;
        if old_components.is_empty() || new_components.is_empty() {
            return Err(FsError::InvalidPath);
        }
        if old_components.len() != new_components.len()
            || old_components[..old_components.len() - 1]
                != new_components[..new_components.len() - 1]
        {
            return Err(FsError::InvalidParameter);
        }

        let (parent, old_name) = self.resolve_parent(old)?;
        let new_name = new_components[new_components.len() - 1];
        self.ensure_absent(parent, &new_name)?;

        let (mut entry, loc) = self.find_entry_in_dir(parent, &old_name)?;
        entry.name = new_name;
        self.update_entry(loc, &entry)
    }

    /// Size of the file at `path` in bytes.
    pub fn file_size(&mut self, p: &str) -> Result<u32, FsError> {
        self.ensure_mounted()?;
        let (entry, _) = self.resolve_entry(p)?;
        Ok(entry.size)
    }

    /// Attribute byte of the entry at `path`.
    pub fn attributes(&mut self, p: &str) -> Result<u8, FsError> {
        self.ensure_mounted()?;
        let (entry, _) = self.resolve_entry(p)?;
        Ok(entry.attributes)
    }

    /// Overwrites the attribute byte of the entry at `path`.
    pub fn set_attributes(&mut self, p: &str, attributes: u8) -> Result<(), FsError> {
        self.ensure_mounted()?;
        let (mut entry, loc) = self.resolve_entry(p)?;
        entry.attributes = attributes;
        self.update_entry(loc, &entry)
    }

    /// Changes the current directory. Absolute paths resolve from the
    /// root, relative ones from the current directory; `.` is a no-op
    /// and `..` at the root stays at the root.
    pub fn change_directory(&mut self, p: &str) -> Result<(), FsError> {
        self.ensure_mounted()?;

        let mut cluster = if path::is_absolute(p) {
            self.volume.root_cluster
        } else {
            self.current_directory
        };

        for component in &path::parse_path(p)? {
            if component == &path::filename_to_83(".") {
                continue;
            }
            if component == &path::filename_to_83("..") && cluster == self.volume.root_cluster {
                continue;
            }
            let (entry, _) = self.find_entry_in_dir(cluster, component)?;
            if !entry.is_directory() {
                return Err(FsError::NotDirectory);
            }
            cluster = self.entry_cluster(&entry);
        }

        self.current_directory = cluster;
        Ok(())
    }

    /// First cluster of the current directory.
    pub fn current_directory_cluster(&self) -> u32 {
        self.current_directory
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{fatfs_read, fatfs_volume, RamDisk};
    use super::*;

    fn mounted() -> Fat32<RamDisk> {
        Fat32::mount(fatfs_volume()).unwrap()
    }

    fn chain_of(fs: &mut Fat32<RamDisk>, first: u32) -> Vec<u32> {
        let mut clusters = vec![first];
        let mut current = first;
        loop {
            current = fs.next_cluster(current).unwrap();
            if current == END_OF_CHAIN {
                return clusters;
            }
            clusters.push(current);
        }
    }

    #[test]
    fn mount_rejects_blank_media() {
        assert_eq!(
            Fat32::mount(RamDisk::new(1024)).err(),
            Some(FsError::NotFound)
        );
        assert_eq!(
            Fat32::check_filesystem(&mut RamDisk::new(1024)),
            Err(FsError::NotFound)
        );
        assert!(Fat32::check_filesystem(&mut fatfs_volume()).is_ok());
    }

    #[test]
    fn mount_derives_consistent_geometry() {
        let fs = mounted();
        let v = fs.volume_info().unwrap();
        assert_eq!(v.bytes_per_sector as usize, SECTOR_SIZE);
        assert_eq!(
            v.cluster_begin_lba,
            v.fat_begin_lba + v.num_fats as u32 * v.fat_size
        );
        assert_eq!(
            v.total_clusters,
            v.data_sectors / v.sectors_per_cluster as u32
        );
        assert!(v.root_cluster >= FIRST_DATA_CLUSTER);
    }

    #[test]
    fn mount_adopts_fsinfo_counters() {
        let mut fs = mounted();
        let adopted = fs.volume.free_clusters;
        let counted = fs.count_free_clusters().unwrap();
        assert_eq!(adopted, counted);
    }

    #[test]
    fn mount_defaults_out_of_range_allocation_hint() {
        let mut data = fatfs_volume().into_data();
        // FSInfo next-free field, sector 1 offset 492
        data[SECTOR_SIZE + 492..SECTOR_SIZE + 496]
            .copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());

        let fs = Fat32::mount(RamDisk::from_data(data)).unwrap();
        assert_eq!(fs.volume_info().unwrap().next_free, FIRST_DATA_CLUSTER);
    }

    #[test]
    fn cluster_to_lba_rejects_reserved_clusters() {
        let fs = mounted();
        assert_eq!(fs.cluster_to_lba(0), Err(FsError::InvalidCluster));
        assert_eq!(fs.cluster_to_lba(1), Err(FsError::InvalidCluster));
        assert_eq!(
            fs.cluster_to_lba(2),
            Ok(fs.volume_info().unwrap().cluster_begin_lba)
        );
    }

    #[test]
    fn allocation_exhaustion_returns_disk_full() {
        let mut fs = mounted();
        let free = fs.volume_info().unwrap().free_clusters;

        let mut first = 0;
        for i in 0..free {
            let cluster = fs.allocate_cluster().unwrap();
            if i == 0 {
                first = cluster;
            }
        }
        assert_eq!(fs.volume_info().unwrap().free_clusters, 0);
        assert_eq!(fs.allocate_cluster(), Err(FsError::DiskFull));
        // the failed probe must not have touched the table
        assert_eq!(fs.count_free_clusters().unwrap(), 0);

        fs.free_chain(first).unwrap();
        assert_eq!(fs.allocate_cluster().unwrap(), first);
    }

    #[test]
    fn free_chain_releases_whole_chain_and_moves_hint() {
        let mut fs = mounted();
        let free_before = fs.volume_info().unwrap().free_clusters;

        let first = fs.allocate_cluster().unwrap();
        let mut tail = first;
        for _ in 0..4 {
            let next = fs.allocate_cluster().unwrap();
            fs.set_next_cluster(tail, next).unwrap();
            tail = next;
        }
        assert_eq!(chain_of(&mut fs, first).len(), 5);
        assert_eq!(fs.volume_info().unwrap().free_clusters, free_before - 5);

        fs.free_chain(first).unwrap();
        assert_eq!(fs.volume_info().unwrap().free_clusters, free_before);
        assert!(fs.volume_info().unwrap().next_free <= first);
    }

    #[test]
    fn free_chain_fails_on_corrupt_links() {
        let mut fs = mounted();
        let a = fs.allocate_cluster().unwrap();
        let b = fs.allocate_cluster().unwrap();
        fs.set_next_cluster(a, b).unwrap();
        fs.set_next_cluster(b, a).unwrap(); // cycle

        assert_eq!(fs.free_chain(a), Err(FsError::InvalidCluster));
        assert_eq!(
            fs.free_chain(fs.volume.total_clusters + 100),
            Err(FsError::InvalidCluster)
        );
    }

    #[test]
    fn set_next_cluster_preserves_reserved_bits() {
        let mut fs = mounted();
        let cluster = fs.allocate_cluster().unwrap();

        // plant reserved bits directly in the cached FAT sector
        let byte_offset = cluster as usize * FAT_ENTRY_SIZE;
        let lba = fs.volume.fat_begin_lba + (byte_offset / SECTOR_SIZE) as u32;
        let offset = byte_offset % SECTOR_SIZE;
        let mut sector = [0u8; SECTOR_SIZE];
        fs.device.read_sector(lba, &mut sector).unwrap();
        sector[offset + 3] |= 0xF0;
        fs.device.write_sector(lba, &sector).unwrap();
        fs.fat_cache.invalidate();

        fs.set_next_cluster(cluster, 0x0000_1234).unwrap();
        fs.device.read_sector(lba, &mut sector).unwrap();
        let raw = u32::from_le_bytes([
            sector[offset],
            sector[offset + 1],
            sector[offset + 2],
            sector[offset + 3],
        ]);
        assert_eq!(raw & CLUSTER_MASK, 0x0000_1234);
        assert_eq!(raw & !CLUSTER_MASK, 0xF000_0000);
    }

    #[test]
    fn deleting_missing_paths_leaves_counters_alone() {
        let mut fs = mounted();
        let free = fs.volume_info().unwrap().free_clusters;

        assert_eq!(fs.delete_file("/ghost.txt"), Err(FsError::NotFound));
        assert_eq!(fs.delete_directory("/ghost"), Err(FsError::NotFound));
        assert_eq!(fs.volume_info().unwrap().free_clusters, free);
    }

    #[test]
    fn delete_file_restores_free_space() {
        let mut fs = mounted();
        let free = fs.volume_info().unwrap().free_clusters;
        let bpc = fs.volume_info().unwrap().bytes_per_cluster() as usize;

        let mut handle = fs.create("/big.bin").unwrap();
        fs.write(&mut handle, &vec![9u8; 4 * bpc]).unwrap();
        fs.close(&mut handle).unwrap();
        assert_eq!(fs.volume_info().unwrap().free_clusters, free - 4);

        fs.delete_file("/big.bin").unwrap();
        assert_eq!(fs.volume_info().unwrap().free_clusters, free);
        assert_eq!(fs.open("/big.bin").err(), Some(FsError::NotFound));
    }

    #[test]
    fn reallocated_clusters_stay_disjoint_from_live_chains() {
        let mut fs = mounted();
        let bpc = fs.volume_info().unwrap().bytes_per_cluster() as usize;

        let mut a = fs.create("/a.bin").unwrap();
        fs.write(&mut a, &vec![1u8; 3 * bpc]).unwrap();
        fs.close(&mut a).unwrap();
        let mut b = fs.create("/b.bin").unwrap();
        fs.write(&mut b, &vec![2u8; 3 * bpc]).unwrap();
        fs.close(&mut b).unwrap();

        let (b_entry, _) = fs.resolve_entry("/b.bin").unwrap();
        let b_chain = chain_of(&mut fs, b_entry.first_cluster);

        fs.delete_file("/a.bin").unwrap();
        for _ in 0..3 {
            let cluster = fs.allocate_cluster().unwrap();
            assert!(!b_chain.contains(&cluster));
        }
    }

    #[test]
    fn directory_emptiness_guard() {
        let mut fs = mounted();
        let free = fs.volume_info().unwrap().free_clusters;

        fs.create_directory("/work").unwrap();
        let mut handle = fs.create("/work/note.txt").unwrap();
        fs.close(&mut handle).unwrap();

        assert_eq!(fs.delete_directory("/work"), Err(FsError::AccessDenied));

        fs.delete_file("/work/note.txt").unwrap();
        fs.delete_directory("/work").unwrap();
        assert_eq!(fs.open_directory("/work").err(), Some(FsError::NotFound));
        assert_eq!(fs.volume_info().unwrap().free_clusters, free);
    }

    #[test]
    fn delete_directory_rejects_files_and_protects_root() {
        let mut fs = mounted();
        let mut handle = fs.create("/plain.txt").unwrap();
        fs.close(&mut handle).unwrap();

        assert_eq!(fs.delete_directory("/plain.txt"), Err(FsError::NotDirectory));
        assert_eq!(fs.delete_file("/"), Err(FsError::InvalidPath));
    }

    #[test]
    fn rename_within_a_directory() {
        let mut fs = mounted();
        fs.create_directory("/docs").unwrap();
        let mut handle = fs.create("/docs/draft.txt").unwrap();
        fs.write(&mut handle, b"contents").unwrap();
        fs.close(&mut handle).unwrap();

        fs.rename("/docs/draft.txt", "/docs/final.txt").unwrap();
        assert_eq!(fs.open("/docs/draft.txt").err(), Some(FsError::NotFound));
        assert_eq!(fs.file_size("/docs/final.txt").unwrap(), 8);
    }

    #[test]
    fn rename_conflicts_and_cross_directory_moves_fail() {
        let mut fs = mounted();
        fs.create_directory("/src").unwrap();
        fs.create_directory("/dst").unwrap();
        for p in ["/src/a.txt", "/src/b.txt"] {
            let mut handle = fs.create(p).unwrap();
            fs.close(&mut handle).unwrap();
        }

        assert_eq!(
            fs.rename("/src/a.txt", "/src/b.txt"),
            Err(FsError::FileExists)
        );
        assert_eq!(
            fs.rename("/src/a.txt", "/dst/a.txt"),
            Err(FsError::InvalidParameter)
        );
        assert_eq!(
            fs.rename("/src/missing", "/src/c.txt"),
            Err(FsError::NotFound)
        );
    }

    #[test]
    fn attribute_round_trip() {
        let mut fs = mounted();
        let mut handle = fs.create("/flags.txt").unwrap();
        fs.close(&mut handle).unwrap();

        assert_eq!(fs.attributes("/flags.txt").unwrap(), ATTR_ARCHIVE);
        fs.set_attributes("/flags.txt", ATTR_READ_ONLY | ATTR_HIDDEN)
            .unwrap();
        assert_eq!(
            fs.attributes("/flags.txt").unwrap(),
            ATTR_READ_ONLY | ATTR_HIDDEN
        );
    }

    #[test]
    fn change_directory_tracks_clusters() {
        let mut fs = mounted();
        let root = fs.volume_info().unwrap().root_cluster;
        fs.create_directory("/sub").unwrap();
        fs.create_directory("/sub/inner").unwrap();
        let (entry, _) = fs.resolve_entry("/sub/inner").unwrap();
        let inner = entry.first_cluster;

        fs.change_directory("sub").unwrap();
        fs.change_directory("inner").unwrap();
        assert_eq!(fs.current_directory_cluster(), inner);

        fs.change_directory("..").unwrap();
        fs.change_directory("..").unwrap();
        assert_eq!(fs.current_directory_cluster(), root);

        // `..` at the root stays put, `.` is a no-op
        fs.change_directory("..").unwrap();
        fs.change_directory(".").unwrap();
        assert_eq!(fs.current_directory_cluster(), root);

        fs.change_directory("/sub/inner").unwrap();
        fs.change_directory("/").unwrap();
        assert_eq!(fs.current_directory_cluster(), root);

        assert_eq!(fs.change_directory("/missing"), Err(FsError::NotFound));
    }

    #[test]
    fn path_errors_surface_from_operations() {
        let mut fs = mounted();
        let mut handle = fs.create("/file.txt").unwrap();
        fs.close(&mut handle).unwrap();

        assert_eq!(fs.open("/bad|name").err(), Some(FsError::InvalidPath));
        assert_eq!(
            fs.open("/file.txt/below").err(),
            Some(FsError::NotDirectory)
        );
        assert_eq!(fs.create("/file.txt").err(), Some(FsError::FileExists));
    }

    #[test]
    fn space_queries_reflect_the_fat() {
        let mut fs = mounted();
        let v = fs.volume_info().unwrap();
        let bpc = v.bytes_per_cluster() as u64;
        let total = v.total_clusters as u64 * bpc;
        let free = v.free_clusters as u64 * bpc;
        assert_eq!(fs.total_space().unwrap(), total);
        assert_eq!(fs.free_space().unwrap(), free);

        let mut handle = fs.create("/space.bin").unwrap();
        fs.write(&mut handle, &vec![0u8; bpc as usize]).unwrap();
        fs.close(&mut handle).unwrap();
        assert_eq!(fs.free_space().unwrap(), free - bpc);
    }

    #[test]
    fn unmount_persists_counters_and_blocks_operations() {
        let mut fs = mounted();
        let mut handle = fs.create("/persist.bin").unwrap();
        fs.write(&mut handle, &[3u8; 2000]).unwrap();
        fs.close(&mut handle).unwrap();

        let free = fs.volume_info().unwrap().free_clusters;
        let hint = fs.volume_info().unwrap().next_free;
        fs.unmount().unwrap();

        assert_eq!(fs.open("/persist.bin").err(), Some(FsError::NotInitialized));
        assert_eq!(fs.free_space(), Err(FsError::NotInitialized));
        assert_eq!(fs.unmount(), Err(FsError::NotInitialized));

        let fs = Fat32::mount(fs.into_device()).unwrap();
        assert_eq!(fs.volume_info().unwrap().free_clusters, free);
        assert_eq!(fs.volume_info().unwrap().next_free, hint);
    }

    #[test]
    fn formatted_volume_round_trips_through_fatfs() {
        // smallest tier with headroom over the 65,525-cluster floor
        let mut disk = RamDisk::new(540_000);
        format::format_volume(&mut disk, "KERNEL").unwrap();

        let mut fs = Fat32::mount(disk).unwrap();
        let v = fs.volume_info().unwrap();
        assert_eq!(v.label(), "KERNEL");
        assert!(v.total_clusters >= MIN_FAT32_CLUSTERS);
        assert_eq!(v.free_clusters, v.total_clusters - 1);

        // freshly formatted root is empty
        let mut root = fs.open_directory("/").unwrap();
        assert_eq!(fs.read_directory(&mut root).err(), Some(FsError::Eof));

        let payload: Vec<u8> = (0..50_000).map(|b| (b % 239) as u8).collect();
        let mut handle = fs.create("/boot.cfg").unwrap();
        fs.write(&mut handle, &payload).unwrap();
        fs.close(&mut handle).unwrap();
        fs.unmount().unwrap();

        let data = fs.into_device().into_data();
        assert_eq!(fatfs_read(data, "boot.cfg"), payload);
    }
}
