//! HerdIO wire protocol
//!
//! This crate defines the request/response wire protocol spoken between a
//! HerdIO client and the storage cluster: the 64-bit object addressing
//! scheme, fixed-layout message headers, opcodes, result codes, and the
//! binary layout of the VDI inode (per-image metadata object).
//!
//! All multi-byte fields are encoded little-endian on the wire.

pub mod error;
pub mod inode;
pub mod oid;
pub mod result;
pub mod wire;

pub use error::ProtoError;
pub use inode::{INODE_SIZE, Inode};
pub use oid::ObjectId;
pub use result::ResultCode;
pub use wire::{
    HEADER_LEN, ObjectRequest, Opcode, Request, RequestBody, Response, VdiRequest,
};

/// Protocol version carried in every request header
pub const PROTO_VERSION: u8 = 0x01;

/// Default cluster address
pub const DEFAULT_ADDR: &str = "localhost";

/// Default cluster port
pub const DEFAULT_PORT: u16 = 7000;

/// Size of one data object: 4 MB
pub const DATA_OBJECT_SIZE: u64 = 1 << 22;

/// Maximum number of data objects per image (20-bit index space)
pub const MAX_DATA_OBJS: usize = 1 << 20;

/// Maximum number of child images recorded in an inode
pub const MAX_CHILDREN: usize = 1024;

/// Maximum image name length in bytes
pub const MAX_VDI_NAME_LEN: usize = 256;

/// Maximum snapshot tag length in bytes
pub const MAX_VDI_TAG_LEN: usize = 256;

/// Size of the vdi-id space (24 bits)
pub const NR_VDIS: usize = 1 << 24;

/// Maximum virtual size of one image
pub const MAX_VDI_SIZE: u64 = DATA_OBJECT_SIZE * MAX_DATA_OBJS as u64;

/// Snapshot id that resolves to the current (writable) image
pub const CURRENT_VDI_ID: u32 = 0;

// Request flags, combinable
pub const FLAG_CMD_WRITE: u16 = 0x01;
pub const FLAG_CMD_COW: u16 = 0x02;
/// Writeback mode for the server-side object cache
pub const FLAG_CMD_CACHE: u16 = 0x04;
/// Bypass the server-side object cache
pub const FLAG_CMD_DIRECT: u16 = 0x08;
