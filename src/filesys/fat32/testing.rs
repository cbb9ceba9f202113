//! In-memory block device and `fatfs` interop helpers shared by the
//! unit tests.

use std::io::{Read, Write};

use super::super::{BlockDevice, FsError, SECTOR_SIZE};

/// A block device backed by a `Vec<u8>`.
pub(crate) struct RamDisk {
    data: Vec<u8>,
}

impl RamDisk {
    pub(crate) fn new(sectors: u32) -> Self {
        Self {
            data: vec![0u8; sectors as usize * SECTOR_SIZE],
        }
    }

    pub(crate) fn from_data(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub(crate) fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl BlockDevice for RamDisk {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), FsError> {
        let start = lba as usize * SECTOR_SIZE;
        let end = start + SECTOR_SIZE;
        if end > self.data.len() {
            return Err(FsError::ReadFailed);
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> Result<(), FsError> {
        let start = lba as usize * SECTOR_SIZE;
        let end = start + SECTOR_SIZE;
        if end > self.data.len() {
            return Err(FsError::WriteFailed);
        }
        self.data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn total_sectors(&self) -> u32 {
        (self.data.len() / SECTOR_SIZE) as u32
    }
}

const TEST_VOLUME_BYTES: usize = 40 * 1024 * 1024;

/// A FAT32 volume formatted by the `fatfs` crate.
pub(crate) fn fatfs_volume() -> RamDisk {
    let mut data = vec![0u8; TEST_VOLUME_BYTES];
    let cursor = std::io::Cursor::new(&mut data);
    fatfs::format_volume(
        cursor,
        fatfs::FormatVolumeOptions::new().fat_type(fatfs::FatType::Fat32),
    )
    .unwrap();
    RamDisk::from_data(data)
}

/// A `fatfs`-formatted volume carrying one file in the root directory.
pub(crate) fn fatfs_volume_with_file(name: &str, contents: &[u8]) -> RamDisk {
    let mut data = fatfs_volume().into_data();
    {
        let cursor = std::io::Cursor::new(&mut data);
        let fs = fatfs::FileSystem::new(cursor, fatfs::FsOptions::new()).unwrap();
        let mut file = fs.root_dir().create_file(name).unwrap();
        file.write_all(contents).unwrap();
    }
    RamDisk::from_data(data)
}

/// Reads a root-directory file back through `fatfs`.
pub(crate) fn fatfs_read(data: Vec<u8>, name: &str) -> Vec<u8> {
    let cursor = std::io::Cursor::new(data);
    let fs = fatfs::FileSystem::new(cursor, fatfs::FsOptions::new()).unwrap();
    let mut file = fs.root_dir().open_file(name).unwrap();
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    out
}
