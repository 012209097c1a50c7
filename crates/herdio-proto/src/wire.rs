//! Fixed-layout request/response headers
//!
//! Both directions use a 48-byte header: version, opcode, flags, epoch,
//! request id, payload length, and 32 bytes of opcode-specific fields.
//! Responses replace the first opcode-specific word with a result code.
//! The protocol is strictly request-then-response; a header is followed by
//! `data_length` payload bytes in the direction given by the write flag.

use bytes::{Buf, BufMut};

use crate::error::ProtoError;
use crate::oid::ObjectId;
use crate::result::ResultCode;
use crate::{MAX_VDI_NAME_LEN, MAX_VDI_TAG_LEN, PROTO_VERSION};

/// Size of a request or response header on the wire
pub const HEADER_LEN: usize = 48;

/// Request opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    CreateAndWriteObj = 0x01,
    ReadObj = 0x02,
    WriteObj = 0x03,
    // 0x04 is used internally by the cluster
    DiscardObj = 0x05,

    NewVdi = 0x11,
    LockVdi = 0x12,
    ReleaseVdi = 0x13,
    GetVdiInfo = 0x14,
    ReadVdis = 0x15,
    FlushVdi = 0x16,
    DelVdi = 0x17,
}

/// Opcode-specific fields of an object request
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectRequest {
    /// Target object id
    pub oid: ObjectId,
    /// COW source object id, [`ObjectId::NONE`] when not copying
    pub cow_oid: ObjectId,
    /// Replica count, 0 lets the server infer it from the object
    pub copies: u32,
    /// Byte offset within the object
    pub offset: u64,
}

/// Opcode-specific fields of a vdi request
#[derive(Debug, Clone, Copy, Default)]
pub struct VdiRequest {
    /// Image size in bytes (creation)
    pub vdi_size: u64,
    /// Target vdi id (release)
    pub vdi_id: u32,
    /// Replica count (creation)
    pub copies: u32,
    /// Snapshot id, [`crate::CURRENT_VDI_ID`] for the current image
    pub snap_id: u32,
}

/// Opcode-specific portion of a request header
#[derive(Debug, Clone, Copy, Default)]
pub enum RequestBody {
    /// No opcode-specific fields
    #[default]
    None,
    Object(ObjectRequest),
    Vdi(VdiRequest),
}

/// A request header
#[derive(Debug, Clone, Copy)]
pub struct Request {
    pub opcode: Opcode,
    pub flags: u16,
    pub epoch: u32,
    pub id: u32,
    /// Payload length: outbound bytes following the header for writes,
    /// requested inbound bytes for reads
    pub data_length: u32,
    pub body: RequestBody,
}

impl Request {
    /// New request with all fields zeroed
    #[must_use]
    pub const fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            flags: 0,
            epoch: 0,
            id: 0,
            data_length: 0,
            body: RequestBody::None,
        }
    }

    /// Encode into the fixed wire layout
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut raw = [0u8; HEADER_LEN];
        let mut buf = &mut raw[..];
        buf.put_u8(PROTO_VERSION);
        buf.put_u8(self.opcode as u8);
        buf.put_u16_le(self.flags);
        buf.put_u32_le(self.epoch);
        buf.put_u32_le(self.id);
        buf.put_u32_le(self.data_length);
        match self.body {
            RequestBody::None => {}
            RequestBody::Object(obj) => {
                buf.put_u64_le(obj.oid.raw());
                buf.put_u64_le(obj.cow_oid.raw());
                buf.put_u32_le(obj.copies);
                buf.put_u32_le(0); // reserved
                buf.put_u64_le(obj.offset);
            }
            RequestBody::Vdi(vdi) => {
                buf.put_u64_le(vdi.vdi_size);
                buf.put_u32_le(vdi.vdi_id);
                buf.put_u32_le(vdi.copies);
                buf.put_u32_le(vdi.snap_id);
            }
        }
        raw
    }
}

/// A response header
#[derive(Debug, Clone, Copy)]
pub struct Response {
    pub proto_ver: u8,
    pub opcode: u8,
    pub flags: u16,
    pub epoch: u32,
    pub id: u32,
    /// Length of the payload following this header
    pub data_length: u32,
    pub result: ResultCode,
    words: [u32; 7],
}

impl Response {
    /// Decode from the fixed wire layout
    #[must_use]
    pub fn decode(raw: &[u8; HEADER_LEN]) -> Self {
        let mut buf = &raw[..];
        let proto_ver = buf.get_u8();
        let opcode = buf.get_u8();
        let flags = buf.get_u16_le();
        let epoch = buf.get_u32_le();
        let id = buf.get_u32_le();
        let data_length = buf.get_u32_le();
        let result = ResultCode::from_wire(buf.get_u32_le());
        let mut words = [0u32; 7];
        for word in &mut words {
            *word = buf.get_u32_le();
        }
        Self {
            proto_ver,
            opcode,
            flags,
            epoch,
            id,
            data_length,
            result,
            words,
        }
    }

    /// Replica count of the target object (object responses)
    #[must_use]
    pub const fn copies(&self) -> u32 {
        self.words[0]
    }

    /// Resolved vdi id (vdi responses)
    #[must_use]
    pub const fn vdi_id(&self) -> u32 {
        self.words[1]
    }
}

/// Build the fixed name+tag payload carried by vdi lookup requests
pub fn vdi_name_payload(
    name: &str,
    tag: &str,
) -> Result<[u8; MAX_VDI_NAME_LEN + MAX_VDI_TAG_LEN], ProtoError> {
    if name.len() > MAX_VDI_NAME_LEN {
        return Err(ProtoError::NameTooLong {
            len: name.len(),
            max: MAX_VDI_NAME_LEN,
        });
    }
    if tag.len() > MAX_VDI_TAG_LEN {
        return Err(ProtoError::TagTooLong {
            len: tag.len(),
            max: MAX_VDI_TAG_LEN,
        });
    }
    let mut payload = [0u8; MAX_VDI_NAME_LEN + MAX_VDI_TAG_LEN];
    payload[..name.len()].copy_from_slice(name.as_bytes());
    payload[MAX_VDI_NAME_LEN..MAX_VDI_NAME_LEN + tag.len()].copy_from_slice(tag.as_bytes());
    Ok(payload)
}
