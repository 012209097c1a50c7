//! Block-to-object I/O translation
//!
//! A byte-range operation is split into per-object segments and carried
//! out strictly in order over the session's connection. Writes to objects
//! the image does not yet own become create-and-write operations, copying
//! from the ancestor's object when one exists (COW). Reads of never-written
//! objects are satisfied locally with zeroes. When a transfer claimed new
//! objects, the updated inode is persisted as one whole-object overwrite
//! at the end.

use herdio_proto::{
    DATA_OBJECT_SIZE, FLAG_CMD_CACHE, FLAG_CMD_COW, FLAG_CMD_WRITE, MAX_VDI_SIZE, ObjectId,
    ObjectRequest, Opcode, Request, RequestBody, ResultCode,
};
use tracing::{debug, error};

use crate::error::{ClientError, Result};
use crate::session::VdiSession;
use crate::transport::Connection;

/// One object's share of a byte-range transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    /// Data object index
    idx: u32,
    /// Byte offset within the object
    offset: u64,
    /// Start of this segment in the transfer buffer
    buf_start: usize,
    /// Bytes transferred for this object
    len: usize,
}

/// Split `[offset, offset + length)` into per-object segments.
///
/// Segments cover the range exactly, in index order, with no gaps or
/// overlaps; only the first can start inside an object. A transfer ending
/// exactly on an object boundary produces no zero-size tail segment.
fn segments(offset: u64, length: usize) -> Vec<Segment> {
    if length == 0 {
        return Vec::new();
    }

    let end = offset + length as u64;
    let first = offset / DATA_OBJECT_SIZE;
    let last = (end - 1) / DATA_OBJECT_SIZE;

    let mut out = Vec::with_capacity((last - first + 1) as usize);
    for idx in first..=last {
        let obj_start = idx * DATA_OBJECT_SIZE;
        let start = offset.max(obj_start);
        let stop = end.min(obj_start + DATA_OBJECT_SIZE);
        out.push(Segment {
            idx: idx as u32,
            offset: start - obj_start,
            buf_start: (start - offset) as usize,
            len: (stop - start) as usize,
        });
    }
    out
}

/// Outcome of an object write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    Done,
    /// The server answered read-only: our inode went stale and must be
    /// reloaded before retrying
    StaleInode,
}

/// Read `buf.len()` bytes from `oid` at `offset`
pub(crate) async fn read_object(
    conn: &mut Connection,
    oid: ObjectId,
    copies: u32,
    buf: &mut [u8],
    offset: u64,
) -> Result<()> {
    let mut req = Request::new(Opcode::ReadObj);
    req.data_length = buf.len() as u32;
    req.body = RequestBody::Object(ObjectRequest {
        oid,
        cow_oid: ObjectId::NONE,
        copies,
        offset,
    });

    let (rsp, _) = conn.exchange(&mut req, &[], buf).await?;
    if rsp.result.is_success() {
        Ok(())
    } else {
        error!("read of {oid} failed: {}", rsp.result);
        Err(ClientError::Object {
            code: rsp.result,
            oid,
            cow_oid: ObjectId::NONE,
        })
    }
}

/// Write `data` to `oid` at `offset`, creating the object when `create`
/// is set (with `cow_oid` as the copy source when non-null)
pub(crate) async fn write_object(
    conn: &mut Connection,
    oid: ObjectId,
    copies: u32,
    data: &[u8],
    offset: u64,
    create: bool,
    cow_oid: ObjectId,
    flags: u16,
) -> Result<WriteOutcome> {
    let mut req = Request::new(if create {
        Opcode::CreateAndWriteObj
    } else {
        Opcode::WriteObj
    });
    req.flags = flags | FLAG_CMD_WRITE;
    req.data_length = data.len() as u32;
    req.body = RequestBody::Object(ObjectRequest {
        oid,
        cow_oid,
        copies,
        offset,
    });

    let (rsp, _) = conn.exchange(&mut req, data, &mut []).await?;
    match rsp.result {
        ResultCode::Success => Ok(WriteOutcome::Done),
        ResultCode::ReadOnly => Ok(WriteOutcome::StaleInode),
        code => {
            error!("write of {oid} failed: {code} (cow oid: {cow_oid})");
            Err(ClientError::Object { code, oid, cow_oid })
        }
    }
}

impl VdiSession {
    /// Read `buf.len()` bytes starting at byte `offset` of the image
    pub async fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        self.check_bounds(buf.len() as u64, offset)?;
        let nr_copies = u32::from(self.inode.nr_copies);

        for seg in segments(offset, buf.len()) {
            let current = self.inode.data_vdi_id[seg.idx as usize];
            let data = &mut buf[seg.buf_start..seg.buf_start + seg.len];
            if current == 0 {
                // Never written: no object to fetch
                data.fill(0);
                continue;
            }
            read_object(
                &mut self.conn,
                ObjectId::data(current, seg.idx),
                nr_copies,
                data,
                seg.offset,
            )
            .await?;
        }
        Ok(())
    }

    /// Write `buf` starting at byte `offset` of the image.
    ///
    /// A failed write leaves the in-memory ownership table possibly ahead
    /// of what the cluster has persisted; the session should be closed
    /// rather than reused after an error.
    pub async fn write(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        if self.read_only {
            return Err(ClientError::ReadOnlySession);
        }
        self.check_bounds(buf.len() as u64, offset)?;
        let nr_copies = u32::from(self.inode.nr_copies);
        let base_flags = if self.config.writeback {
            FLAG_CMD_CACHE
        } else {
            0
        };
        let mut need_update = false;

        for seg in segments(offset, buf.len()) {
            let data = &buf[seg.buf_start..seg.buf_start + seg.len];
            let mut reloaded = false;
            loop {
                let vid = self.inode.vdi_id;
                let current = self.inode.data_vdi_id[seg.idx as usize];
                let oid = ObjectId::data(vid, seg.idx);
                let (create, cow_oid, flags) = if current == vid {
                    (false, ObjectId::NONE, base_flags)
                } else if current != 0 {
                    // Inherited from an ancestor: copy before mutating
                    (true, ObjectId::data(current, seg.idx), base_flags | FLAG_CMD_COW)
                } else {
                    (true, ObjectId::NONE, base_flags)
                };

                if create {
                    // Claim ownership before the request goes out. The claim
                    // is only persisted after the whole transfer succeeds.
                    self.inode.data_vdi_id[seg.idx as usize] = vid;
                    self.mark_dirty(seg.idx);
                }

                match write_object(
                    &mut self.conn,
                    oid,
                    nr_copies,
                    data,
                    seg.offset,
                    create,
                    cow_oid,
                    flags,
                )
                .await?
                {
                    WriteOutcome::Done => {
                        if create {
                            need_update = true;
                        }
                        break;
                    }
                    WriteOutcome::StaleInode => {
                        if reloaded {
                            return Err(ClientError::Server(ResultCode::ReadOnly));
                        }
                        debug!("stale inode for {}, reloading", self.inode.name);
                        self.reload_inode().await?;
                        reloaded = true;
                    }
                }
            }
        }

        if need_update {
            self.update_inode().await?;
        }
        Ok(())
    }

    /// Flush the server-side object cache for this image.
    ///
    /// An invalid-parameters answer means the server runs without a cache
    /// layer and counts as success.
    pub async fn flush(&mut self) -> Result<()> {
        let mut req = Request::new(Opcode::FlushVdi);
        req.body = RequestBody::Object(ObjectRequest {
            oid: ObjectId::vdi(self.inode.vdi_id),
            ..ObjectRequest::default()
        });

        let (rsp, _) = self.conn.exchange(&mut req, &[], &mut []).await?;
        match rsp.result {
            ResultCode::Success | ResultCode::InvalidParams => Ok(()),
            code => {
                error!("flush of {} failed: {code}", self.inode.name);
                Err(ClientError::Server(code))
            }
        }
    }

    /// Release the data objects fully covered by `[offset, offset + length)`.
    ///
    /// Only objects owned by this image are discarded; inherited objects
    /// and partially covered objects are left untouched. The cleared
    /// mappings are persisted once at the end.
    pub async fn discard(&mut self, length: u64, offset: u64) -> Result<()> {
        if self.read_only {
            return Err(ClientError::ReadOnlySession);
        }
        self.check_bounds(length, offset)?;

        let vid = self.inode.vdi_id;
        let copies = u32::from(self.inode.nr_copies);
        let first = offset.div_ceil(DATA_OBJECT_SIZE);
        let last = (offset + length) / DATA_OBJECT_SIZE;
        let mut released = false;

        for idx in first..last {
            let idx = idx as u32;
            if self.inode.data_vdi_id[idx as usize] != vid {
                continue;
            }
            let oid = ObjectId::data(vid, idx);
            let mut req = Request::new(Opcode::DiscardObj);
            req.body = RequestBody::Object(ObjectRequest {
                oid,
                copies,
                ..ObjectRequest::default()
            });

            let (rsp, _) = self.conn.exchange(&mut req, &[], &mut []).await?;
            match rsp.result {
                // NoObject: already gone, release the mapping anyway
                ResultCode::Success | ResultCode::NoObject => {
                    self.inode.data_vdi_id[idx as usize] = 0;
                    self.mark_dirty(idx);
                    released = true;
                }
                code => {
                    error!("discard of {oid} failed: {code}");
                    return Err(ClientError::Object {
                        code,
                        oid,
                        cow_oid: ObjectId::NONE,
                    });
                }
            }
        }

        if released {
            self.update_inode().await?;
        }
        Ok(())
    }

    /// Persist the in-memory inode as a whole-object overwrite
    async fn update_inode(&mut self) -> Result<()> {
        let oid = ObjectId::vdi(self.inode.vdi_id);
        debug!(
            "updating inode object {oid} (dirty {}..={})",
            self.min_dirty_idx, self.max_dirty_idx
        );
        let raw = self.inode.encode();
        match write_object(
            &mut self.conn,
            oid,
            u32::from(self.inode.nr_copies),
            &raw,
            0,
            false,
            ObjectId::NONE,
            0,
        )
        .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("inode update for {} failed: {e}", self.inode.name);
                Err(e)
            }
        }
    }

    fn check_bounds(&self, length: u64, offset: u64) -> Result<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.inode.vdi_size && end <= MAX_VDI_SIZE => Ok(()),
            _ => Err(ClientError::OutOfBounds {
                offset,
                length,
                size: self.inode.vdi_size,
            }),
        }
    }

    fn mark_dirty(&mut self, idx: u32) {
        self.min_dirty_idx = self.min_dirty_idx.min(idx);
        self.max_dirty_idx = self.max_dirty_idx.max(idx);
    }
}
