//! VDI session lifecycle
//!
//! A session resolves an image name to its owning vdi id, takes the
//! cluster-side exclusive lock, and keeps the image's inode in memory on a
//! long-lived connection. Name resolution always happens on a short-lived
//! connection of its own, so a failed lookup never disturbs the session's
//! data path.

use herdio_proto::{
    CURRENT_VDI_ID, FLAG_CMD_WRITE, INODE_SIZE, Inode, MAX_VDI_NAME_LEN, NR_VDIS, ObjectId,
    Opcode, Request, RequestBody, ResultCode, VdiRequest, wire,
};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::io::read_object;
use crate::transport::Connection;

/// An open session against one virtual disk image
#[derive(Debug)]
pub struct VdiSession {
    pub(crate) conn: Connection,
    pub(crate) config: ClientConfig,
    pub(crate) inode: Inode,
    pub(crate) min_dirty_idx: u32,
    pub(crate) max_dirty_idx: u32,
    pub(crate) read_only: bool,
}

impl VdiSession {
    /// Open the current (writable) image named `name`.
    ///
    /// Resolves the name, takes the exclusive lock, opens the session
    /// connection, and fetches the inode. No connection is left open on
    /// failure.
    pub async fn open(config: &ClientConfig, name: &str) -> Result<Self> {
        let vid = find_vdi(config, name, CURRENT_VDI_ID, "", true).await?;
        let mut conn = Connection::connect(config).await?;
        // Replica count 0: the server infers it from the object itself.
        let inode = fetch_inode(&mut conn, vid, 0).await?;
        debug!("opened {name} (vdi {vid:#x}, {} bytes)", inode.vdi_size);
        Ok(Self {
            conn,
            config: config.clone(),
            inode,
            min_dirty_idx: u32::MAX,
            max_dirty_idx: 0,
            read_only: false,
        })
    }

    /// Open a snapshot of `name` read-only, addressed by snapshot id
    /// and/or tag. No lock is taken.
    pub async fn open_snapshot(
        config: &ClientConfig,
        name: &str,
        snap_id: u32,
        tag: &str,
    ) -> Result<Self> {
        let vid = find_vdi(config, name, snap_id, tag, false).await?;
        let mut conn = Connection::connect(config).await?;
        let inode = fetch_inode(&mut conn, vid, 0).await?;
        debug!("opened snapshot {name}:{snap_id} (vdi {vid:#x})");
        Ok(Self {
            conn,
            config: config.clone(),
            inode,
            min_dirty_idx: u32::MAX,
            max_dirty_idx: 0,
            read_only: true,
        })
    }

    /// Re-resolve the image and replace the in-memory inode.
    ///
    /// Invoked when a write is answered with a read-only result, which
    /// signals that the inode went stale (a snapshot was taken under us).
    pub(crate) async fn reload_inode(&mut self) -> Result<()> {
        let vid = find_vdi(&self.config, &self.inode.name, CURRENT_VDI_ID, "", true).await?;
        let copies = u32::from(self.inode.nr_copies);
        self.inode = fetch_inode(&mut self.conn, vid, copies).await?;
        debug!("reloaded inode for {} (vdi {vid:#x})", self.inode.name);
        Ok(())
    }

    /// Release the image lock and close the connection.
    ///
    /// A "not locked" answer counts as success (release is idempotent);
    /// any other failure is logged but never blocks teardown.
    pub async fn close(mut self) {
        if !self.read_only {
            let mut req = Request::new(Opcode::ReleaseVdi);
            req.body = RequestBody::Vdi(VdiRequest {
                vdi_id: self.inode.vdi_id,
                ..VdiRequest::default()
            });
            match self.conn.exchange(&mut req, &[], &mut []).await {
                Ok((rsp, _))
                    if rsp.result.is_success() || rsp.result == ResultCode::VdiNotLocked => {}
                Ok((rsp, _)) => warn!("release of {} failed: {}", self.inode.name, rsp.result),
                Err(e) => warn!("release of {} failed: {e}", self.inode.name),
            }
        }
        debug!("closed session for {}", self.inode.name);
    }

    /// Image name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inode.name
    }

    /// Virtual image size in bytes
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.inode.vdi_size
    }

    /// Owning vdi id
    #[must_use]
    pub const fn vdi_id(&self) -> u32 {
        self.inode.vdi_id
    }

    /// True for snapshot sessions
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// The current in-memory inode
    #[must_use]
    pub const fn inode(&self) -> &Inode {
        &self.inode
    }

    /// Data-object indices claimed since the session opened, if any
    #[must_use]
    pub const fn dirty_range(&self) -> Option<(u32, u32)> {
        if self.min_dirty_idx <= self.max_dirty_idx {
            Some((self.min_dirty_idx, self.max_dirty_idx))
        } else {
            None
        }
    }
}

/// Resolve an image name (+ optional tag/snapshot id) to its vdi id.
///
/// With `lock` the request doubles as the exclusive-lock acquisition;
/// snapshot lookups pass `lock = false` and only read the info. Uses a
/// transient connection that is closed before returning.
pub(crate) async fn find_vdi(
    config: &ClientConfig,
    name: &str,
    snap_id: u32,
    tag: &str,
    lock: bool,
) -> Result<u32> {
    let payload = wire::vdi_name_payload(name, tag)?;
    let mut conn = Connection::connect(config).await?;

    let opcode = if lock {
        Opcode::LockVdi
    } else {
        Opcode::GetVdiInfo
    };
    let mut req = Request::new(opcode);
    req.flags = FLAG_CMD_WRITE;
    req.data_length = payload.len() as u32;
    req.body = RequestBody::Vdi(VdiRequest {
        snap_id,
        ..VdiRequest::default()
    });

    let (rsp, _) = conn.exchange(&mut req, &payload, &mut []).await?;
    if !rsp.result.is_success() {
        warn!("cannot resolve {name} (snap {snap_id}, tag {tag:?}): {}", rsp.result);
        return Err(ClientError::Server(rsp.result));
    }
    Ok(rsp.vdi_id())
}

async fn fetch_inode(conn: &mut Connection, vid: u32, copies: u32) -> Result<Inode> {
    let mut raw = vec![0u8; INODE_SIZE];
    read_object(conn, ObjectId::vdi(vid), copies, &mut raw, 0).await?;
    Ok(Inode::decode(&raw)?)
}

/// Create a new image of `size` bytes and return its vdi id
pub async fn create_image(
    config: &ClientConfig,
    name: &str,
    size: u64,
    copies: u32,
) -> Result<u32> {
    if size > herdio_proto::MAX_VDI_SIZE {
        return Err(ClientError::InvalidArgument(format!(
            "image size {size} exceeds maximum {}",
            herdio_proto::MAX_VDI_SIZE
        )));
    }
    let payload = wire::vdi_name_payload(name, "")?;
    let mut conn = Connection::connect(config).await?;

    let mut req = Request::new(Opcode::NewVdi);
    req.flags = FLAG_CMD_WRITE;
    req.data_length = MAX_VDI_NAME_LEN as u32;
    req.body = RequestBody::Vdi(VdiRequest {
        vdi_size: size,
        copies,
        ..VdiRequest::default()
    });

    let (rsp, _) = conn
        .exchange(&mut req, &payload[..MAX_VDI_NAME_LEN], &mut [])
        .await?;
    if !rsp.result.is_success() {
        warn!("cannot create {name}: {}", rsp.result);
        return Err(ClientError::Server(rsp.result));
    }
    debug!("created {name} (vdi {:#x}, {size} bytes)", rsp.vdi_id());
    Ok(rsp.vdi_id())
}

/// Delete the image named `name`
pub async fn delete_image(config: &ClientConfig, name: &str) -> Result<()> {
    let payload = wire::vdi_name_payload(name, "")?;
    let mut conn = Connection::connect(config).await?;

    let mut req = Request::new(Opcode::DelVdi);
    req.flags = FLAG_CMD_WRITE;
    req.data_length = payload.len() as u32;
    req.body = RequestBody::Vdi(VdiRequest::default());

    let (rsp, _) = conn.exchange(&mut req, &payload, &mut []).await?;
    if !rsp.result.is_success() {
        warn!("cannot delete {name}: {}", rsp.result);
        return Err(ClientError::Server(rsp.result));
    }
    Ok(())
}

/// List the vdi ids currently in use on the cluster
pub async fn list_images(config: &ClientConfig) -> Result<Vec<u32>> {
    let mut conn = Connection::connect(config).await?;

    let mut bitmap = vec![0u8; NR_VDIS / 8];
    let mut req = Request::new(Opcode::ReadVdis);
    req.data_length = bitmap.len() as u32;

    let (rsp, rlen) = conn.exchange(&mut req, &[], &mut bitmap).await?;
    if !rsp.result.is_success() {
        warn!("cannot list images: {}", rsp.result);
        return Err(ClientError::Server(rsp.result));
    }

    let mut vids = Vec::new();
    for (byte_idx, &byte) in bitmap[..rlen].iter().enumerate() {
        if byte == 0 {
            continue;
        }
        for bit in 0..8 {
            if byte & (1 << bit) != 0 {
                vids.push((byte_idx * 8 + bit) as u32);
            }
        }
    }
    Ok(vids)
}
