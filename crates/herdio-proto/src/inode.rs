//! VDI inode — the per-image metadata object
//!
//! The inode is stored as a single fixed-layout object in the cluster and
//! fetched/overwritten whole. Its dominant part is the `data_vdi_id` table
//! mapping every data-object index to the vdi id that currently owns that
//! object: an entry equal to the inode's own id means the image may
//! overwrite the object in place, any other non-zero id means the object is
//! inherited from an ancestor and must be copied before mutation, and zero
//! means the object was never written.

use bytes::{Buf, BufMut};

use crate::error::ProtoError;
use crate::{MAX_CHILDREN, MAX_DATA_OBJS, MAX_VDI_NAME_LEN, MAX_VDI_TAG_LEN};

/// Wire size of an inode object
pub const INODE_SIZE: usize =
    MAX_VDI_NAME_LEN + MAX_VDI_TAG_LEN + 40 + 4 + 12 + 4 * MAX_CHILDREN + 4 * MAX_DATA_OBJS;

/// Per-image metadata
#[derive(Debug, Clone)]
pub struct Inode {
    /// Image name
    pub name: String,
    /// Snapshot tag
    pub tag: String,
    /// Creation timestamp (epoch seconds)
    pub create_time: u64,
    /// Snapshot creation timestamp, non-zero for snapshots
    pub snap_ctime: u64,
    /// VM clock in nanoseconds
    pub vm_clock_nsec: u64,
    /// Virtual image size in bytes
    pub vdi_size: u64,
    /// VM state size in bytes
    pub vm_state_size: u64,
    /// Copy policy (0 = replicate)
    pub copy_policy: u16,
    /// Replica count
    pub nr_copies: u8,
    /// log2 of the data object size
    pub block_size_shift: u8,
    /// Snapshot id
    pub snap_id: u32,
    /// Own vdi id
    pub vdi_id: u32,
    /// Parent vdi id, 0 for base images
    pub parent_vdi_id: u32,
    /// Child vdi ids, zero-terminated ([`MAX_CHILDREN`] entries)
    pub child_vdi_id: Vec<u32>,
    /// Data object ownership table ([`MAX_DATA_OBJS`] entries)
    pub data_vdi_id: Vec<u32>,
}

impl Inode {
    /// New empty inode
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: String::new(),
            tag: String::new(),
            create_time: 0,
            snap_ctime: 0,
            vm_clock_nsec: 0,
            vdi_size: 0,
            vm_state_size: 0,
            copy_policy: 0,
            nr_copies: 0,
            block_size_shift: 22,
            snap_id: 0,
            vdi_id: 0,
            parent_vdi_id: 0,
            child_vdi_id: vec![0; MAX_CHILDREN],
            data_vdi_id: vec![0; MAX_DATA_OBJS],
        }
    }

    /// Decode an inode object fetched from the cluster
    pub fn decode(raw: &[u8]) -> Result<Self, ProtoError> {
        if raw.len() != INODE_SIZE {
            return Err(ProtoError::InodeLength {
                expected: INODE_SIZE,
                actual: raw.len(),
            });
        }

        let name = fixed_str(&raw[..MAX_VDI_NAME_LEN]);
        let tag = fixed_str(&raw[MAX_VDI_NAME_LEN..MAX_VDI_NAME_LEN + MAX_VDI_TAG_LEN]);

        let mut buf = &raw[MAX_VDI_NAME_LEN + MAX_VDI_TAG_LEN..];
        let create_time = buf.get_u64_le();
        let snap_ctime = buf.get_u64_le();
        let vm_clock_nsec = buf.get_u64_le();
        let vdi_size = buf.get_u64_le();
        let vm_state_size = buf.get_u64_le();
        let copy_policy = buf.get_u16_le();
        let nr_copies = buf.get_u8();
        let block_size_shift = buf.get_u8();
        let snap_id = buf.get_u32_le();
        let vdi_id = buf.get_u32_le();
        let parent_vdi_id = buf.get_u32_le();

        let mut child_vdi_id = vec![0u32; MAX_CHILDREN];
        for child in &mut child_vdi_id {
            *child = buf.get_u32_le();
        }
        let mut data_vdi_id = vec![0u32; MAX_DATA_OBJS];
        for entry in &mut data_vdi_id {
            *entry = buf.get_u32_le();
        }

        Ok(Self {
            name,
            tag,
            create_time,
            snap_ctime,
            vm_clock_nsec,
            vdi_size,
            vm_state_size,
            copy_policy,
            nr_copies,
            block_size_shift,
            snap_id,
            vdi_id,
            parent_vdi_id,
            child_vdi_id,
            data_vdi_id,
        })
    }

    /// Encode into the fixed wire layout for a whole-object overwrite
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        assert!(self.name.len() <= MAX_VDI_NAME_LEN);
        assert!(self.tag.len() <= MAX_VDI_TAG_LEN);
        assert_eq!(self.child_vdi_id.len(), MAX_CHILDREN);
        assert_eq!(self.data_vdi_id.len(), MAX_DATA_OBJS);

        let mut raw = Vec::with_capacity(INODE_SIZE);
        put_fixed_str(&mut raw, &self.name, MAX_VDI_NAME_LEN);
        put_fixed_str(&mut raw, &self.tag, MAX_VDI_TAG_LEN);
        raw.put_u64_le(self.create_time);
        raw.put_u64_le(self.snap_ctime);
        raw.put_u64_le(self.vm_clock_nsec);
        raw.put_u64_le(self.vdi_size);
        raw.put_u64_le(self.vm_state_size);
        raw.put_u16_le(self.copy_policy);
        raw.put_u8(self.nr_copies);
        raw.put_u8(self.block_size_shift);
        raw.put_u32_le(self.snap_id);
        raw.put_u32_le(self.vdi_id);
        raw.put_u32_le(self.parent_vdi_id);
        for &child in &self.child_vdi_id {
            raw.put_u32_le(child);
        }
        for &entry in &self.data_vdi_id {
            raw.put_u32_le(entry);
        }
        debug_assert_eq!(raw.len(), INODE_SIZE);
        raw
    }

    /// True when this image exclusively owns (may overwrite) the data
    /// object at `idx`
    #[must_use]
    pub fn is_owned(&self, idx: u32) -> bool {
        self.data_vdi_id[idx as usize] == self.vdi_id
    }

    /// True for snapshot inodes
    #[must_use]
    pub const fn is_snapshot(&self) -> bool {
        self.snap_ctime != 0
    }

    /// Number of data objects covering the image size
    #[must_use]
    pub const fn object_count(&self) -> u64 {
        self.vdi_size.div_ceil(crate::DATA_OBJECT_SIZE)
    }
}

impl Default for Inode {
    fn default() -> Self {
        Self::new()
    }
}

fn fixed_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn put_fixed_str(raw: &mut Vec<u8>, s: &str, width: usize) {
    raw.extend_from_slice(s.as_bytes());
    raw.resize(raw.len() + width - s.len(), 0);
}
