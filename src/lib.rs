//! FAT32 filesystem engine for a freestanding kernel.
//!
//! Implements the FAT32 on-disk format directly against a raw block
//! device: cluster allocation, FAT chain maintenance, directory entry
//! management, path resolution, and caching of hot metadata. The block
//! device driver itself lives outside this crate and is consumed through
//! the [`filesys::BlockDevice`] trait.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod filesys;
