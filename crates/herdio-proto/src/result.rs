//! Protocol result codes
//!
//! Every response header carries one of these codes in place of the first
//! opcode-specific word. Each code has a fixed human-readable description
//! used for diagnostics.

use std::fmt;

/// Result code returned by the cluster in every response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    /// Success
    Success,
    /// Unknown error
    Unknown,
    /// No object found
    NoObject,
    /// I/O error
    Eio,
    /// Vdi exists already
    VdiExists,
    /// Invalid parameters
    InvalidParams,
    /// System error
    SystemError,
    /// Vdi is locked
    VdiLocked,
    /// No vdi found
    NoVdi,
    /// No base vdi found
    NoBaseVdi,
    /// Cannot read requested vdi
    VdiRead,
    /// Cannot write requested vdi
    VdiWrite,
    /// Cannot read base vdi
    BaseVdiRead,
    /// Cannot write base vdi
    BaseVdiWrite,
    /// Requested tag is not found
    NoTag,
    /// Cluster is starting up
    Startup,
    /// Vdi is not locked
    VdiNotLocked,
    /// Cluster is shutting down
    Shutdown,
    /// Out of memory on the server
    NoMem,
    /// Maximum number of vdis reached
    FullVdi,
    /// Protocol version mismatch
    VersionMismatch,
    /// Server has no space for new objects
    NoSpace,
    /// Waiting for a format operation
    WaitForFormat,
    /// Waiting for other nodes to join
    WaitForJoin,
    /// Node failed to join the cluster
    JoinFailed,
    /// Cluster has stopped serving I/O
    Halt,
    /// Object is read-only
    ReadOnly,
    /// Any code this client does not know
    Unrecognized(u32),
}

impl ResultCode {
    /// Decode a result code from its wire value
    #[must_use]
    pub const fn from_wire(value: u32) -> Self {
        match value {
            0x00 => Self::Success,
            0x01 => Self::Unknown,
            0x02 => Self::NoObject,
            0x03 => Self::Eio,
            0x04 => Self::VdiExists,
            0x05 => Self::InvalidParams,
            0x06 => Self::SystemError,
            0x07 => Self::VdiLocked,
            0x08 => Self::NoVdi,
            0x09 => Self::NoBaseVdi,
            0x0A => Self::VdiRead,
            0x0B => Self::VdiWrite,
            0x0C => Self::BaseVdiRead,
            0x0D => Self::BaseVdiWrite,
            0x0E => Self::NoTag,
            0x0F => Self::Startup,
            0x10 => Self::VdiNotLocked,
            0x11 => Self::Shutdown,
            0x12 => Self::NoMem,
            0x13 => Self::FullVdi,
            0x14 => Self::VersionMismatch,
            0x15 => Self::NoSpace,
            0x16 => Self::WaitForFormat,
            0x17 => Self::WaitForJoin,
            0x18 => Self::JoinFailed,
            0x19 => Self::Halt,
            0x1A => Self::ReadOnly,
            other => Self::Unrecognized(other),
        }
    }

    /// Wire value of this code
    #[must_use]
    pub const fn to_wire(self) -> u32 {
        match self {
            Self::Success => 0x00,
            Self::Unknown => 0x01,
            Self::NoObject => 0x02,
            Self::Eio => 0x03,
            Self::VdiExists => 0x04,
            Self::InvalidParams => 0x05,
            Self::SystemError => 0x06,
            Self::VdiLocked => 0x07,
            Self::NoVdi => 0x08,
            Self::NoBaseVdi => 0x09,
            Self::VdiRead => 0x0A,
            Self::VdiWrite => 0x0B,
            Self::BaseVdiRead => 0x0C,
            Self::BaseVdiWrite => 0x0D,
            Self::NoTag => 0x0E,
            Self::Startup => 0x0F,
            Self::VdiNotLocked => 0x10,
            Self::Shutdown => 0x11,
            Self::NoMem => 0x12,
            Self::FullVdi => 0x13,
            Self::VersionMismatch => 0x14,
            Self::NoSpace => 0x15,
            Self::WaitForFormat => 0x16,
            Self::WaitForJoin => 0x17,
            Self::JoinFailed => 0x18,
            Self::Halt => 0x19,
            Self::ReadOnly => 0x1A,
            Self::Unrecognized(other) => other,
        }
    }

    /// True for [`ResultCode::Success`]
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Fixed human-readable description
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Unknown => "Unknown error",
            Self::NoObject => "No object found",
            Self::Eio => "I/O error",
            Self::VdiExists => "VDI exists already",
            Self::InvalidParams => "Invalid parameters",
            Self::SystemError => "System error",
            Self::VdiLocked => "VDI is already locked",
            Self::NoVdi => "No vdi found",
            Self::NoBaseVdi => "No base VDI found",
            Self::VdiRead => "Failed to read the requested VDI",
            Self::VdiWrite => "Failed to write the requested VDI",
            Self::BaseVdiRead => "Failed to read the base VDI",
            Self::BaseVdiWrite => "Failed to write the base VDI",
            Self::NoTag => "Failed to find the requested tag",
            Self::Startup => "The system is still booting",
            Self::VdiNotLocked => "VDI isn't locked",
            Self::Shutdown => "The system is shutting down",
            Self::NoMem => "Out of memory on the server",
            Self::FullVdi => "We already have the maximum vdis",
            Self::VersionMismatch => "Protocol version mismatch",
            Self::NoSpace => "Server has no space for new objects",
            Self::WaitForFormat => "Cluster is waiting for a format operation",
            Self::WaitForJoin => "Cluster is waiting for other nodes joining",
            Self::JoinFailed => "Target node had failed to join the cluster",
            Self::Halt => "Cluster is stopped serving IO request",
            Self::ReadOnly => "Object is read-only",
            Self::Unrecognized(_) => "Invalid error code",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unrecognized(code) => write!(f, "{} ({code:#x})", self.description()),
            _ => f.write_str(self.description()),
        }
    }
}
