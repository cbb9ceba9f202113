//! Filesystem abstractions shared by on-disk filesystem implementations.

use core::result::Result;

pub mod fat32;

/// Errors returned by filesystem operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Volume has not been mounted, or has been unmounted
    NotInitialized,
    /// Underlying drive did not respond
    DriveNotReady,
    /// Sector read failed
    ReadFailed,
    /// Sector write failed
    WriteFailed,
    /// File, directory, or path component does not exist
    NotFound,
    /// Argument out of range, or operation on a closed handle
    InvalidParameter,
    /// Read past the end of a file or directory
    Eof,
    /// Cluster number out of range, or a corrupt cluster chain
    InvalidCluster,
    /// FAT probe found no free entry
    NoFreeCluster,
    /// Operation not permitted (e.g. deleting a non-empty directory)
    AccessDenied,
    /// An entry with this name already exists
    FileExists,
    /// Path component is not a directory
    NotDirectory,
    /// Target is a directory where a file was expected
    IsDirectory,
    /// No free clusters remain on the volume
    DiskFull,
    /// Path is malformed (too deep, bad characters, oversized component)
    InvalidPath,
    /// Handle is already open
    AlreadyOpen,
}

impl FsError {
    /// Human-readable message for shells and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FsError::NotInitialized => "File system not initialized",
            FsError::DriveNotReady => "Drive not ready",
            FsError::ReadFailed => "Read operation failed",
            FsError::WriteFailed => "Write operation failed",
            FsError::NotFound => "File or directory not found",
            FsError::InvalidParameter => "Invalid parameter",
            FsError::Eof => "End of file",
            FsError::InvalidCluster => "Invalid cluster number",
            FsError::NoFreeCluster => "No free clusters available",
            FsError::AccessDenied => "Access denied",
            FsError::FileExists => "File already exists",
            FsError::NotDirectory => "Not a directory",
            FsError::IsDirectory => "Is a directory",
            FsError::DiskFull => "Disk is full",
            FsError::InvalidPath => "Invalid path",
            FsError::AlreadyOpen => "File is already open",
        }
    }
}

impl core::fmt::Display for FsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size of a disk sector in bytes
pub const SECTOR_SIZE: usize = 512;

/// Represents a block device that can be read from and written to
/// one 512-byte sector at a time
pub trait BlockDevice {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), FsError>;
    fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> Result<(), FsError>;
    fn total_sectors(&self) -> u32;
}
