//! End-to-end client tests against a scripted in-process cluster.
//!
//! The mock speaks the wire protocol over a real TCP socket and parses
//! request headers byte by byte, independently of the client's encoder,
//! so these tests also pin the wire layout.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use herdio_client::{
    ClientConfig, ClientError, VdiSession, create_image, delete_image, list_images,
};
use herdio_proto::{DATA_OBJECT_SIZE, INODE_SIZE, Inode, ObjectId, ResultCode};
use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const OBJ: u64 = DATA_OBJECT_SIZE;

// Wire constants mirrored independently of the client crate
const OP_CREATE_AND_WRITE: u8 = 0x01;
const OP_READ_OBJ: u8 = 0x02;
const OP_WRITE_OBJ: u8 = 0x03;
const OP_DISCARD_OBJ: u8 = 0x05;
const OP_NEW_VDI: u8 = 0x11;
const OP_LOCK_VDI: u8 = 0x12;
const OP_RELEASE_VDI: u8 = 0x13;
const OP_GET_VDI_INFO: u8 = 0x14;
const OP_READ_VDIS: u8 = 0x15;
const OP_FLUSH_VDI: u8 = 0x16;
const OP_DEL_VDI: u8 = 0x17;

const FLAG_WRITE: u16 = 0x01;
const FLAG_COW: u16 = 0x02;
const FLAG_CACHE: u16 = 0x04;

const RES_SUCCESS: u32 = 0x00;
const RES_NO_OBJ: u32 = 0x02;
const RES_EIO: u32 = 0x03;
const RES_INVALID_PARMS: u32 = 0x05;
const RES_NO_VDI: u32 = 0x08;
const RES_VDI_NOT_LOCKED: u32 = 0x10;
const RES_READONLY: u32 = 0x1A;

/// Forced-result sentinel: drop the connection instead of answering
const DROP_CONNECTION: u32 = u32::MAX;

#[derive(Debug, Clone)]
struct RecordedOp {
    opcode: u8,
    flags: u16,
    oid: u64,
    cow_oid: u64,
    offset: u64,
    len: u32,
}

#[derive(Default)]
struct ClusterState {
    vdis: HashMap<String, u32>,
    objects: HashMap<u64, Vec<u8>>,
    /// Forced results for object writes, consumed front to back
    write_results: VecDeque<u32>,
    release_result: u32,
    flush_result: u32,
    next_vid: u32,
    ops: Vec<RecordedOp>,
}

struct MockCluster {
    state: Arc<Mutex<ClusterState>>,
    config: ClientConfig,
}

impl MockCluster {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(ClusterState {
            next_vid: 0xa1,
            ..ClusterState::default()
        }));

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve_conn(stream, Arc::clone(&accept_state)));
            }
        });

        let config = ClientConfig {
            address: "127.0.0.1".to_string(),
            port,
            ..ClientConfig::default()
        };
        Self { state, config }
    }

    /// Register an image whose inode object is served from `inode`
    fn install(&self, inode: &Inode) {
        let mut st = self.state.lock().unwrap();
        st.vdis.insert(inode.name.clone(), inode.vdi_id);
        st.objects
            .insert(ObjectId::vdi(inode.vdi_id).raw(), inode.encode());
    }

    fn add_image(&self, name: &str, vid: u32, size: u64) -> Inode {
        let mut inode = Inode::new();
        inode.name = name.to_string();
        inode.vdi_size = size;
        inode.nr_copies = 3;
        inode.vdi_id = vid;
        self.install(&inode);
        inode
    }

    fn force_write_results(&self, results: &[u32]) {
        let mut st = self.state.lock().unwrap();
        st.write_results.extend(results);
    }

    fn set_release_result(&self, result: u32) {
        self.state.lock().unwrap().release_result = result;
    }

    fn set_flush_result(&self, result: u32) {
        self.state.lock().unwrap().flush_result = result;
    }

    fn ops(&self, opcode: u8) -> Vec<RecordedOp> {
        self.state
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter(|op| op.opcode == opcode)
            .cloned()
            .collect()
    }

    /// Object writes addressed at data objects (metadata tag clear)
    fn data_writes(&self) -> Vec<RecordedOp> {
        self.state
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter(|op| {
                (op.opcode == OP_WRITE_OBJ || op.opcode == OP_CREATE_AND_WRITE)
                    && ObjectId::from_raw(op.oid).is_data()
            })
            .cloned()
            .collect()
    }

    /// Object reads addressed at data objects
    fn data_reads(&self) -> Vec<RecordedOp> {
        self.state
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter(|op| op.opcode == OP_READ_OBJ && ObjectId::from_raw(op.oid).is_data())
            .cloned()
            .collect()
    }

    /// Inode overwrites (object writes with the metadata tag set)
    fn inode_writes(&self) -> Vec<RecordedOp> {
        self.state
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter(|op| op.opcode == OP_WRITE_OBJ && !ObjectId::from_raw(op.oid).is_data())
            .cloned()
            .collect()
    }

    fn stored_inode(&self, vid: u32) -> Inode {
        let raw = self
            .state
            .lock()
            .unwrap()
            .objects
            .get(&ObjectId::vdi(vid).raw())
            .cloned()
            .expect("inode object missing");
        Inode::decode(&raw).unwrap()
    }
}

async fn serve_conn(mut stream: TcpStream, state: Arc<Mutex<ClusterState>>) {
    loop {
        let mut hdr = [0u8; 48];
        if stream.read_exact(&mut hdr).await.is_err() {
            return;
        }
        let opcode = hdr[1];
        let flags = le16(&hdr[2..4]);
        let data_length = le32(&hdr[12..16]);

        let mut payload = Vec::new();
        if flags & FLAG_WRITE != 0 && data_length > 0 {
            payload = vec![0u8; data_length as usize];
            if stream.read_exact(&mut payload).await.is_err() {
                return;
            }
        }

        let (result, vdi_id, data) = {
            let mut st = state.lock().unwrap();
            st.ops.push(RecordedOp {
                opcode,
                flags,
                oid: le64(&hdr[16..24]),
                cow_oid: le64(&hdr[24..32]),
                offset: le64(&hdr[40..48]),
                len: data_length,
            });
            dispatch(&mut st, opcode, &hdr, data_length, &payload)
        };

        if result == DROP_CONNECTION {
            return;
        }

        let mut rsp = [0u8; 48];
        rsp[0] = hdr[0];
        rsp[1] = opcode;
        rsp[4..8].copy_from_slice(&hdr[4..8]); // epoch
        rsp[8..12].copy_from_slice(&hdr[8..12]); // request id
        rsp[12..16].copy_from_slice(&(data.len() as u32).to_le_bytes());
        rsp[16..20].copy_from_slice(&result.to_le_bytes());
        rsp[24..28].copy_from_slice(&vdi_id.to_le_bytes());
        if stream.write_all(&rsp).await.is_err() {
            return;
        }
        if !data.is_empty() && stream.write_all(&data).await.is_err() {
            return;
        }
    }
}

fn dispatch(
    st: &mut ClusterState,
    opcode: u8,
    hdr: &[u8; 48],
    data_length: u32,
    payload: &[u8],
) -> (u32, u32, Vec<u8>) {
    match opcode {
        OP_LOCK_VDI | OP_GET_VDI_INFO => {
            let name = str_field(&payload[..256]);
            match st.vdis.get(&name) {
                Some(&vid) => (RES_SUCCESS, vid, Vec::new()),
                None => (RES_NO_VDI, 0, Vec::new()),
            }
        }

        OP_NEW_VDI => {
            let name = str_field(&payload[..256]);
            let vdi_size = le64(&hdr[16..24]);
            let copies = le32(&hdr[28..32]);
            let vid = st.next_vid;
            st.next_vid += 1;

            let mut inode = Inode::new();
            inode.name = name.clone();
            inode.vdi_size = vdi_size;
            inode.nr_copies = copies as u8;
            inode.vdi_id = vid;
            st.vdis.insert(name, vid);
            st.objects.insert(ObjectId::vdi(vid).raw(), inode.encode());
            (RES_SUCCESS, vid, Vec::new())
        }

        OP_DEL_VDI => {
            let name = str_field(&payload[..256]);
            match st.vdis.remove(&name) {
                Some(vid) => {
                    st.objects.remove(&ObjectId::vdi(vid).raw());
                    (RES_SUCCESS, vid, Vec::new())
                }
                None => (RES_NO_VDI, 0, Vec::new()),
            }
        }

        OP_READ_VDIS => {
            let mut bitmap = vec![0u8; (1 << 24) / 8];
            for &vid in st.vdis.values() {
                bitmap[(vid / 8) as usize] |= 1 << (vid % 8);
            }
            bitmap.truncate(data_length as usize);
            (RES_SUCCESS, 0, bitmap)
        }

        OP_READ_OBJ => {
            let oid = le64(&hdr[16..24]);
            let offset = le64(&hdr[40..48]) as usize;
            match st.objects.get(&oid) {
                Some(obj) => {
                    let end = (offset + data_length as usize).min(obj.len());
                    let data = if offset < end {
                        obj[offset..end].to_vec()
                    } else {
                        Vec::new()
                    };
                    (RES_SUCCESS, 0, data)
                }
                None => (RES_NO_OBJ, 0, Vec::new()),
            }
        }

        OP_WRITE_OBJ | OP_CREATE_AND_WRITE => {
            let oid = le64(&hdr[16..24]);
            let offset = le64(&hdr[40..48]) as usize;
            let result = st.write_results.pop_front().unwrap_or(RES_SUCCESS);
            if result == RES_SUCCESS {
                let obj = st.objects.entry(oid).or_default();
                let end = offset + payload.len();
                if obj.len() < end {
                    obj.resize(end, 0);
                }
                obj[offset..end].copy_from_slice(payload);
            }
            (result, 0, Vec::new())
        }

        OP_DISCARD_OBJ => {
            let oid = le64(&hdr[16..24]);
            st.objects.remove(&oid);
            (RES_SUCCESS, 0, Vec::new())
        }

        OP_RELEASE_VDI => (st.release_result, 0, Vec::new()),
        OP_FLUSH_VDI => (st.flush_result, 0, Vec::new()),

        _ => (RES_EIO, 0, Vec::new()),
    }
}

fn str_field(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn le16(raw: &[u8]) -> u16 {
    u16::from_le_bytes(raw.try_into().unwrap())
}

fn le32(raw: &[u8]) -> u32 {
    u32::from_le_bytes(raw.try_into().unwrap())
}

fn le64(raw: &[u8]) -> u64 {
    u64::from_le_bytes(raw.try_into().unwrap())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_open_reports_size() {
    let cluster = MockCluster::start().await;
    cluster.add_image("vol0", 0xa7, 16 << 20);

    let session = VdiSession::open(&cluster.config, "vol0").await.unwrap();
    assert_eq!(session.name(), "vol0");
    assert_eq!(session.size(), 16 << 20);
    assert_eq!(session.vdi_id(), 0xa7);
    assert!(!session.is_read_only());
    session.close().await;
}

#[tokio::test]
async fn test_open_unknown_image_fails() {
    let cluster = MockCluster::start().await;
    let err = VdiSession::open(&cluster.config, "nope").await.unwrap_err();
    assert!(matches!(err, ClientError::Server(ResultCode::NoVdi)));
}

#[tokio::test]
async fn test_sparse_read_zero_fills_without_exchanges() {
    let cluster = MockCluster::start().await;
    cluster.add_image("vol0", 0xa7, 16 << 20);

    let mut session = VdiSession::open(&cluster.config, "vol0").await.unwrap();
    let mut buf = vec![0xffu8; 4096];
    session.read(&mut buf, 0).await.unwrap();

    assert!(buf.iter().all(|&b| b == 0));
    assert!(cluster.data_reads().is_empty());
    session.close().await;
}

#[tokio::test]
async fn test_boundary_write_splits_and_persists() {
    let cluster = MockCluster::start().await;
    cluster.add_image("vol0", 0xa7, 16 << 20);

    let mut session = VdiSession::open(&cluster.config, "vol0").await.unwrap();
    session.write(&[0xabu8; 10], OBJ - 5).await.unwrap();

    let creates = cluster.ops(OP_CREATE_AND_WRITE);
    assert_eq!(creates.len(), 2);

    assert_eq!(creates[0].oid, ObjectId::data(0xa7, 0).raw());
    assert_eq!(creates[0].offset, OBJ - 5);
    assert_eq!(creates[0].len, 5);
    assert_eq!(creates[0].cow_oid, 0);
    assert_eq!(creates[0].flags & FLAG_COW, 0);
    assert_eq!(creates[0].flags & FLAG_CACHE, 0);

    assert_eq!(creates[1].oid, ObjectId::data(0xa7, 1).raw());
    assert_eq!(creates[1].offset, 0);
    assert_eq!(creates[1].len, 5);
    assert_eq!(creates[1].cow_oid, 0);

    let persists = cluster.inode_writes();
    assert_eq!(persists.len(), 1);
    assert_eq!(persists[0].oid, ObjectId::vdi(0xa7).raw());
    assert_eq!(persists[0].offset, 0);
    assert_eq!(persists[0].len as usize, INODE_SIZE);

    let stored = cluster.stored_inode(0xa7);
    assert_eq!(stored.data_vdi_id[0], 0xa7);
    assert_eq!(stored.data_vdi_id[1], 0xa7);
    assert_eq!(stored.data_vdi_id[2], 0);

    assert_eq!(session.dirty_range(), Some((0, 1)));
    session.close().await;
}

#[tokio::test]
async fn test_cow_write_sets_source_and_claims_ownership() {
    let cluster = MockCluster::start().await;
    let mut inode = cluster.add_image("vol0", 0xa7, 16 << 20);
    inode.data_vdi_id[3] = 0x99; // inherited from an ancestor
    cluster.install(&inode);

    let mut session = VdiSession::open(&cluster.config, "vol0").await.unwrap();
    session.write(&[1u8; 100], 3 * OBJ + 50).await.unwrap();

    let creates = cluster.ops(OP_CREATE_AND_WRITE);
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].oid, ObjectId::data(0xa7, 3).raw());
    assert_eq!(creates[0].cow_oid, ObjectId::data(0x99, 3).raw());
    assert_ne!(creates[0].flags & FLAG_COW, 0);

    let stored = cluster.stored_inode(0xa7);
    assert_eq!(stored.data_vdi_id[3], 0xa7);
    session.close().await;
}

#[tokio::test]
async fn test_write_owned_object_is_plain() {
    let cluster = MockCluster::start().await;
    let mut inode = cluster.add_image("vol0", 0xa7, 16 << 20);
    inode.data_vdi_id[0] = 0xa7; // already ours
    cluster.install(&inode);

    let mut session = VdiSession::open(&cluster.config, "vol0").await.unwrap();
    session.write(&[7u8; 512], 0).await.unwrap();

    assert!(cluster.ops(OP_CREATE_AND_WRITE).is_empty());
    assert_eq!(cluster.data_writes().len(), 1);
    // No new ownership: no inode persist
    assert!(cluster.inode_writes().is_empty());
    assert_eq!(session.dirty_range(), None);
    session.close().await;
}

#[tokio::test]
async fn test_readonly_reloads_once_and_retries() {
    let cluster = MockCluster::start().await;
    cluster.add_image("vol0", 0xa7, 16 << 20);

    let mut session = VdiSession::open(&cluster.config, "vol0").await.unwrap();
    cluster.force_write_results(&[RES_READONLY]);
    session.write(&[3u8; 512], 0).await.unwrap();

    // First attempt answered read-only, one reload, one retry, then persist
    assert_eq!(cluster.ops(OP_CREATE_AND_WRITE).len(), 2);
    assert_eq!(cluster.ops(OP_LOCK_VDI).len(), 2); // open + reload
    let inode_reads: Vec<_> = cluster
        .ops(OP_READ_OBJ)
        .into_iter()
        .filter(|op| !ObjectId::from_raw(op.oid).is_data())
        .collect();
    assert_eq!(inode_reads.len(), 2); // open + reload

    let stored = cluster.stored_inode(0xa7);
    assert_eq!(stored.data_vdi_id[0], 0xa7);
    session.close().await;
}

#[tokio::test]
async fn test_second_readonly_fails_the_transfer() {
    let cluster = MockCluster::start().await;
    cluster.add_image("vol0", 0xa7, 16 << 20);

    let mut session = VdiSession::open(&cluster.config, "vol0").await.unwrap();
    cluster.force_write_results(&[RES_READONLY, RES_READONLY]);
    let err = session.write(&[3u8; 512], 0).await.unwrap_err();

    assert!(matches!(err, ClientError::Server(ResultCode::ReadOnly)));
    // Exactly one reload, no unbounded loop
    assert_eq!(cluster.ops(OP_LOCK_VDI).len(), 2);
    assert_eq!(cluster.ops(OP_CREATE_AND_WRITE).len(), 2);
    assert!(cluster.inode_writes().is_empty());
    session.close().await;
}

#[tokio::test]
async fn test_write_failure_carries_object_ids() {
    let cluster = MockCluster::start().await;
    let mut inode = cluster.add_image("vol0", 0xa7, 16 << 20);
    inode.data_vdi_id[0] = 0x99;
    cluster.install(&inode);

    let mut session = VdiSession::open(&cluster.config, "vol0").await.unwrap();
    cluster.force_write_results(&[RES_EIO]);
    let err = session.write(&[3u8; 512], 0).await.unwrap_err();

    match err {
        ClientError::Object { code, oid, cow_oid } => {
            assert_eq!(code, ResultCode::Eio);
            assert_eq!(oid, ObjectId::data(0xa7, 0));
            assert_eq!(cow_oid, ObjectId::data(0x99, 0));
        }
        other => panic!("unexpected error: {other}"),
    }
    session.close().await;
}

#[tokio::test]
async fn test_read_back_across_objects() {
    let cluster = MockCluster::start().await;
    cluster.add_image("vol0", 0xa7, 16 << 20);

    let mut data = vec![0u8; 8192];
    rand::thread_rng().fill_bytes(&mut data);

    let mut session = VdiSession::open(&cluster.config, "vol0").await.unwrap();
    session.write(&data, OBJ - 4096).await.unwrap();

    let mut back = vec![0u8; 8192];
    session.read(&mut back, OBJ - 4096).await.unwrap();
    assert_eq!(back, data);
    assert_eq!(cluster.data_reads().len(), 2);
    session.close().await;
}

#[tokio::test]
async fn test_flush_tolerates_missing_cache_layer() {
    let cluster = MockCluster::start().await;
    cluster.add_image("vol0", 0xa7, 16 << 20);

    let mut session = VdiSession::open(&cluster.config, "vol0").await.unwrap();
    session.flush().await.unwrap();

    cluster.set_flush_result(RES_INVALID_PARMS);
    session.flush().await.unwrap();

    cluster.set_flush_result(RES_EIO);
    let err = session.flush().await.unwrap_err();
    assert!(matches!(err, ClientError::Server(ResultCode::Eio)));
    session.close().await;
}

#[tokio::test]
async fn test_close_tolerates_not_locked() {
    let cluster = MockCluster::start().await;
    cluster.add_image("vol0", 0xa7, 16 << 20);

    let session = VdiSession::open(&cluster.config, "vol0").await.unwrap();
    cluster.set_release_result(RES_VDI_NOT_LOCKED);
    session.close().await;
    assert_eq!(cluster.ops(OP_RELEASE_VDI).len(), 1);

    // Any other failure is logged but still never blocks teardown
    let session = VdiSession::open(&cluster.config, "vol0").await.unwrap();
    cluster.set_release_result(RES_EIO);
    session.close().await;
}

#[tokio::test]
async fn test_writeback_sets_cache_flag() {
    let cluster = MockCluster::start().await;
    cluster.add_image("vol0", 0xa7, 16 << 20);

    let mut config = cluster.config.clone();
    config.writeback = true;
    let mut session = VdiSession::open(&config, "vol0").await.unwrap();
    session.write(&[1u8; 512], 0).await.unwrap();

    let creates = cluster.ops(OP_CREATE_AND_WRITE);
    assert_eq!(creates.len(), 1);
    assert_ne!(creates[0].flags & FLAG_CACHE, 0);
    session.close().await;
}

#[tokio::test]
async fn test_discard_releases_fully_covered_owned_objects() {
    let cluster = MockCluster::start().await;
    let mut inode = cluster.add_image("vol0", 0xa7, 16 << 20);
    inode.data_vdi_id[0] = 0xa7;
    inode.data_vdi_id[1] = 0xa7;
    inode.data_vdi_id[2] = 0x99; // inherited
    cluster.install(&inode);

    let mut session = VdiSession::open(&cluster.config, "vol0").await.unwrap();
    // Covers object 0 partially, objects 1 and 2 fully
    session.discard(3 * OBJ - 512, 512).await.unwrap();

    let discards = cluster.ops(OP_DISCARD_OBJ);
    assert_eq!(discards.len(), 1);
    assert_eq!(discards[0].oid, ObjectId::data(0xa7, 1).raw());

    let stored = cluster.stored_inode(0xa7);
    assert_eq!(stored.data_vdi_id[0], 0xa7); // partial coverage: untouched
    assert_eq!(stored.data_vdi_id[1], 0); // released
    assert_eq!(stored.data_vdi_id[2], 0x99); // inherited: untouched
    session.close().await;
}

#[tokio::test]
async fn test_out_of_bounds_rejected_before_any_exchange() {
    let cluster = MockCluster::start().await;
    cluster.add_image("vol0", 0xa7, 16 << 20);

    let mut session = VdiSession::open(&cluster.config, "vol0").await.unwrap();
    let mut buf = vec![0u8; 4096];
    let err = session.read(&mut buf, 16 << 20).await.unwrap_err();
    assert!(matches!(err, ClientError::OutOfBounds { .. }));

    let err = session.write(&buf, (16 << 20) - 1).await.unwrap_err();
    assert!(matches!(err, ClientError::OutOfBounds { .. }));

    assert!(cluster.data_reads().is_empty());
    assert!(cluster.data_writes().is_empty());
    session.close().await;
}

#[tokio::test]
async fn test_snapshot_session_is_read_only() {
    let cluster = MockCluster::start().await;
    let mut inode = cluster.add_image("vol0", 0xa7, 16 << 20);
    inode.snap_ctime = 1_700_000_000;
    inode.snap_id = 2;
    cluster.install(&inode);

    let mut session = VdiSession::open_snapshot(&cluster.config, "vol0", 2, "")
        .await
        .unwrap();
    assert!(session.is_read_only());
    assert_eq!(cluster.ops(OP_GET_VDI_INFO).len(), 1);
    assert!(cluster.ops(OP_LOCK_VDI).is_empty());

    let err = session.write(&[1u8; 512], 0).await.unwrap_err();
    assert!(matches!(err, ClientError::ReadOnlySession));

    let mut buf = vec![0xffu8; 512];
    session.read(&mut buf, 0).await.unwrap();
    assert!(buf.iter().all(|&b| b == 0));

    session.close().await;
    // No lock was taken, so no release is sent
    assert!(cluster.ops(OP_RELEASE_VDI).is_empty());
}

#[tokio::test]
async fn test_image_lifecycle() {
    let cluster = MockCluster::start().await;

    let vid = create_image(&cluster.config, "fresh", 8 << 20, 3)
        .await
        .unwrap();
    assert!(list_images(&cluster.config).await.unwrap().contains(&vid));

    let mut session = VdiSession::open(&cluster.config, "fresh").await.unwrap();
    assert_eq!(session.size(), 8 << 20);
    session.write(&[9u8; 512], 0).await.unwrap();
    session.close().await;

    delete_image(&cluster.config, "fresh").await.unwrap();
    assert!(!list_images(&cluster.config).await.unwrap().contains(&vid));

    let err = delete_image(&cluster.config, "fresh").await.unwrap_err();
    assert!(matches!(err, ClientError::Server(ResultCode::NoVdi)));
}

#[tokio::test]
async fn test_peer_close_mid_exchange_fails() {
    let cluster = MockCluster::start().await;
    cluster.add_image("vol0", 0xa7, 16 << 20);

    let mut session = VdiSession::open(&cluster.config, "vol0").await.unwrap();
    cluster.force_write_results(&[DROP_CONNECTION]);
    let err = session.write(&[1u8; 512], 0).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::ConnectionClosed { .. } | ClientError::Io(_)
    ));
}
