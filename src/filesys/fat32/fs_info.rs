//! FSInfo sector decoding and encoding
//!
//! The FSInfo sector carries the free cluster count and the next-free
//! allocation hint. Both are advisory; they are accepted on mount only
//! when every signature checks out and the hint is in range.

use super::super::SECTOR_SIZE;
use super::constants::*;

/// Parsed FSInfo sector
#[derive(Debug, Clone, Copy)]
pub struct FsInfo {
    /// Free cluster count, 0xFFFFFFFF when unknown
    pub free_clusters: u32,

    /// Allocation hint: first cluster to probe for a free entry
    pub next_free: u32,
}

impl FsInfo {
    /// Decodes an FSInfo sector; `None` if any of the three
    /// signatures does not match.
    pub fn decode(buf: &[u8; SECTOR_SIZE]) -> Option<Self> {
        let lead = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let structure = u32::from_le_bytes([buf[484], buf[485], buf[486], buf[487]]);
        let trail = u32::from_le_bytes([buf[508], buf[509], buf[510], buf[511]]);

        if lead != FSINFO_LEAD_SIGNATURE
            || structure != FSINFO_STRUCT_SIGNATURE
            || trail != FSINFO_TRAIL_SIGNATURE
        {
            return None;
        }

        Some(Self {
            free_clusters: u32::from_le_bytes([buf[488], buf[489], buf[490], buf[491]]),
            next_free: u32::from_le_bytes([buf[492], buf[493], buf[494], buf[495]]),
        })
    }

    /// Encodes a fresh FSInfo sector.
    pub fn encode(&self, buf: &mut [u8; SECTOR_SIZE]) {
        buf.fill(0);
        buf[0..4].copy_from_slice(&FSINFO_LEAD_SIGNATURE.to_le_bytes());
        buf[484..488].copy_from_slice(&FSINFO_STRUCT_SIGNATURE.to_le_bytes());
        buf[488..492].copy_from_slice(&self.free_clusters.to_le_bytes());
        buf[492..496].copy_from_slice(&self.next_free.to_le_bytes());
        buf[508..512].copy_from_slice(&FSINFO_TRAIL_SIGNATURE.to_le_bytes());
    }
}
