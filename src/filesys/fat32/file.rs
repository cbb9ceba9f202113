//! File and directory handles with cluster-chain based I/O
//!
//! A handle is a small open/closed state machine owned by the caller;
//! every I/O operation goes through the engine, which owns the device
//! and caches. Operations on a closed handle fail with
//! `InvalidParameter`.

use alloc::string::String;
use alloc::vec;
use core::cmp::{max, min};

use super::super::{BlockDevice, FsError};
use super::constants::*;
use super::dir_entry::DirEntry83;
use super::fat::ChainWalker;
use super::path;
use super::{EntryLocation, Fat32};

/// An open file or directory on a FAT32 volume
pub struct FileHandle {
    open: bool,
    directory: bool,
    first_cluster: u32,
    current_cluster: u32,
    position: u32,
    size: u32,
    name: String,
    /// Where the directory entry lives; `None` only for the root
    /// directory, which has no entry of its own.
    location: Option<EntryLocation>,
}

impl FileHandle {
    /// Whether the handle is still open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Whether the handle refers to a directory.
    pub fn is_directory(&self) -> bool {
        self.directory
    }

    /// Current byte offset into the file, or entry offset times 32 for
    /// a directory.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// File size in bytes; always 0 for directories.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Display-form name of the entry this handle was opened from.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn ensure_open(&self) -> Result<(), FsError> {
        if self.open {
            Ok(())
        } else {
            Err(FsError::InvalidParameter)
        }
    }
}

/// One decoded entry yielded by directory iteration
#[derive(Debug, Clone)]
pub struct DirectoryEntryInfo {
    /// Display-form 8.3 name
    pub name: String,

    /// Attribute byte
    pub attributes: u8,

    /// File size in bytes (0 for directories)
    pub size: u32,

    /// First cluster of the entry's chain
    pub first_cluster: u32,
}

impl DirectoryEntryInfo {
    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }
}

impl<D: BlockDevice> Fat32<D> {
    /// Opens an existing file. Every non-final path component must be
    /// a directory; the final one must not be (else `IsDirectory`).
    pub fn open(&mut self, p: &str) -> Result<FileHandle, FsError> {
        self.ensure_mounted()?;

        let (entry, location) = self.resolve_entry(p)?;
        if entry.is_directory() {
            return Err(FsError::IsDirectory);
        }

        Ok(FileHandle {
            open: true,
            directory: false,
            first_cluster: entry.first_cluster,
            current_cluster: entry.first_cluster,
            position: 0,
            size: entry.size,
            name: entry.display_name(),
            location: Some(location),
        })
    }

    /// Creates a new zero-size file with no allocated cluster and
    /// returns an open handle to it. Fails with `FileExists` if the
    /// name is already taken.
    pub fn create(&mut self, p: &str) -> Result<FileHandle, FsError> {
        self.ensure_mounted()?;

        let (parent, name) = self.resolve_parent(p)?;
        match self.find_entry_in_dir(parent, &name) {
            Ok(_) => return Err(FsError::FileExists),
            Err(FsError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let entry = DirEntry83::new_file(name);
        let location = self.insert_entry(parent, &entry)?;

        Ok(FileHandle {
            open: true,
            directory: false,
            first_cluster: 0,
            current_cluster: 0,
            position: 0,
            size: 0,
            name: entry.display_name(),
            location: Some(location),
        })
    }

    /// Opens a directory for iteration. An empty path or `/` opens the
    /// root; every path component must be a directory.
    pub fn open_directory(&mut self, p: &str) -> Result<FileHandle, FsError> {
        self.ensure_mounted()?;

        let components = path::parse_path(p)?;
        let mut cluster = self.volume.root_cluster;
        let mut name = String::from("/");
        let mut location = None;

        for component in &components {
            let (entry, loc) = self.find_entry_in_dir(cluster, component)?;
            if !entry.is_directory() {
                return Err(FsError::NotDirectory);
            }
            cluster = self.entry_cluster(&entry);
            name = entry.display_name();
            location = Some(loc);
        }

        Ok(FileHandle {
            open: true,
            directory: true,
            first_cluster: cluster,
            current_cluster: cluster,
            position: 0,
            size: 0, // directories have no stored size
            name,
            location,
        })
    }

    /// Closes the handle. Any further operation on it fails with
    /// `InvalidParameter`.
    pub fn close(&self, handle: &mut FileHandle) -> Result<(), FsError> {
        self.ensure_mounted()?;
        handle.ensure_open()?;
        handle.open = false;
        Ok(())
    }

    /// Reads from the current position into `buf`, clipped to the
    /// remaining bytes of the file. Fails with `Eof` when the position
    /// is already at the end.
    pub fn read(&mut self, handle: &mut FileHandle, buf: &mut [u8]) -> Result<usize, FsError> {
        self.ensure_mounted()?;
        handle.ensure_open()?;
        if handle.directory {
            return Err(FsError::IsDirectory);
        }
        if handle.position >= handle.size {
            return Err(FsError::Eof);
        }

        let bpc = self.volume.bytes_per_cluster();
        let mut data = vec![0u8; bpc as usize];
        let to_read = min(buf.len(), (handle.size - handle.position) as usize);
        let mut read = 0;

        while read < to_read && handle.current_cluster != END_OF_CHAIN {
            self.read_cluster(handle.current_cluster, &mut data)?;

            let offset = (handle.position % bpc) as usize;
            let chunk = min(bpc as usize - offset, to_read - read);
            buf[read..read + chunk].copy_from_slice(&data[offset..offset + chunk]);

            read += chunk;
            handle.position += chunk as u32;

            if handle.position % bpc == 0 {
                handle.current_cluster = self.next_cluster(handle.current_cluster)?;
            }
        }

        Ok(read)
    }

    /// Writes `buf` at the current position, allocating the first
    /// cluster lazily and extending the chain as boundaries are
    /// crossed. Partial-cluster writes read-modify-write the cluster.
    ///
    /// On a mid-operation failure the clusters already written stay
    /// written: the byte count transferred so far is returned as a
    /// short write, and a following call reports the error itself.
    pub fn write(&mut self, handle: &mut FileHandle, buf: &[u8]) -> Result<usize, FsError> {
        self.ensure_mounted()?;
        handle.ensure_open()?;
        if handle.directory {
            return Err(FsError::IsDirectory);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let bpc = self.volume.bytes_per_cluster();
        let mut data = vec![0u8; bpc as usize];

        // An empty file, or a position at the end of the last cluster,
        // needs a fresh cluster before anything can be written.
        if handle.first_cluster == 0 || handle.current_cluster == END_OF_CHAIN {
            let new_cluster = self.allocate_cluster()?;
            if handle.first_cluster == 0 {
                handle.first_cluster = new_cluster;
            } else {
                let mut last = handle.first_cluster;
                let mut walker = ChainWalker::new(last, self.volume.total_clusters);
                while let Some(cluster) = walker.advance(self)? {
                    last = cluster;
                }
                self.set_next_cluster(last, new_cluster)?;
            }
            handle.current_cluster = new_cluster;
        }

        let mut written = 0;
        while written < buf.len() {
            let offset = (handle.position % bpc) as usize;
            let chunk = min(bpc as usize - offset, buf.len() - written);

            // Preserve the untouched bytes of a partially written cluster.
            if offset != 0 || chunk < bpc as usize {
                if let Err(e) = self.read_cluster(handle.current_cluster, &mut data) {
                    return self.finish_short_write(handle, written, e);
                }
            }
            data[offset..offset + chunk].copy_from_slice(&buf[written..written + chunk]);
            if let Err(e) = self.write_cluster(handle.current_cluster, &data) {
                return self.finish_short_write(handle, written, e);
            }

            written += chunk;
            handle.position += chunk as u32;
            handle.size = max(handle.size, handle.position);

            if handle.position % bpc == 0 && written < buf.len() {
                let next = match self.next_cluster(handle.current_cluster) {
                    Ok(next) => next,
                    Err(e) => return self.finish_short_write(handle, written, e),
                };
                if next == END_OF_CHAIN {
                    let new_cluster = match self.allocate_cluster() {
                        Ok(c) => c,
                        Err(e) => return self.finish_short_write(handle, written, e),
                    };
                    if let Err(e) = self.set_next_cluster(handle.current_cluster, new_cluster) {
                        return self.finish_short_write(handle, written, e);
                    }
                    handle.current_cluster = new_cluster;
                } else {
                    handle.current_cluster = next;
                }
            }
        }

        self.persist_handle_entry(handle)?;
        Ok(written)
    }

    fn finish_short_write(
        &mut self,
        handle: &mut FileHandle,
        written: usize,
        err: FsError,
    ) -> Result<usize, FsError> {
        if written == 0 {
            return Err(err);
        }
        let _ = self.persist_handle_entry(handle);
        Ok(written)
    }

    /// Writes the handle's size and first cluster back into its
    /// directory entry.
    fn persist_handle_entry(&mut self, handle: &FileHandle) -> Result<(), FsError> {
        let Some(loc) = handle.location else {
            return Err(FsError::InvalidParameter);
        };

        let bpc = self.volume.bytes_per_cluster() as usize;
        let mut data = vec![0u8; bpc];
        self.read_cluster(loc.cluster, &mut data)?;

        let mut entry = DirEntry83::decode(&data[loc.offset..loc.offset + DIR_ENTRY_SIZE]);
        entry.first_cluster = handle.first_cluster;
        entry.size = handle.size;
        entry.encode(&mut data[loc.offset..loc.offset + DIR_ENTRY_SIZE]);

        self.write_cluster(loc.cluster, &data)
    }

    /// Repositions the handle, rejecting positions past the end of the
    /// file. The containing cluster is recomputed by walking the chain
    /// from the first cluster.
    pub fn seek(&mut self, handle: &mut FileHandle, position: u32) -> Result<(), FsError> {
        self.ensure_mounted()?;
        handle.ensure_open()?;
        if position > handle.size {
            return Err(FsError::InvalidParameter);
        }

        handle.position = 0;
        handle.current_cluster = handle.first_cluster;
        if position == 0 {
            return Ok(());
        }

        let bpc = self.volume.bytes_per_cluster();
        let steps = position / bpc;
        for _ in 0..steps {
            handle.current_cluster = self.next_cluster(handle.current_cluster)?;
        }

        // Landing exactly on a cluster boundary at EOF leaves the
        // handle one past the chain; anywhere else that is corruption.
        if handle.current_cluster == END_OF_CHAIN
            && !(position == handle.size && position % bpc == 0)
        {
            return Err(FsError::InvalidCluster);
        }

        handle.position = position;
        Ok(())
    }

    /// Yields the next live entry of an open directory, skipping
    /// deleted, long-name, and volume-label records. Fails with `Eof`
    /// at the end-of-directory marker or the end of the chain.
    pub fn read_directory(
        &mut self,
        handle: &mut FileHandle,
    ) -> Result<DirectoryEntryInfo, FsError> {
        self.ensure_mounted()?;
        handle.ensure_open()?;
        if !handle.directory {
            return Err(FsError::NotDirectory);
        }

        let bpc = self.volume.bytes_per_cluster();
        let mut data = vec![0u8; bpc as usize];

        // Corruption guard: never visit more entries than the volume
        // can hold.
        let max_entries =
            (self.volume.total_clusters as u64 + 1) * (bpc as u64 / DIR_ENTRY_SIZE as u64);
        let mut visited = 0u64;

        loop {
            if handle.current_cluster == END_OF_CHAIN {
                return Err(FsError::Eof);
            }
            if visited >= max_entries {
                return Err(FsError::InvalidCluster);
            }
            visited += 1;

            self.read_cluster(handle.current_cluster, &mut data)?;
            let offset = (handle.position % bpc) as usize;
            let entry = DirEntry83::decode(&data[offset..offset + DIR_ENTRY_SIZE]);

            if entry.is_end_marker() {
                return Err(FsError::Eof);
            }

            handle.position += DIR_ENTRY_SIZE as u32;
            if handle.position % bpc == 0 {
                handle.current_cluster = self.next_cluster(handle.current_cluster)?;
            }

            if entry.is_deleted() || entry.is_long_name() || entry.is_volume_label() {
                continue;
            }

            return Ok(DirectoryEntryInfo {
                name: entry.display_name(),
                attributes: entry.attributes,
                size: entry.size,
                first_cluster: entry.first_cluster,
            });
        }
    }
}
