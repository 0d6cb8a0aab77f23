mod frame;
mod stream;

pub use frame::MAX_FRAME_DATA;
pub use stream::MuxStream;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
};

use log::{error, trace};
use parking_lot::Mutex as SyncMutex;
use smol::lock::Mutex;

use hyphae_core::{
    async_util::{CondWait, TaskGroup},
    Executor,
};
use hyphae_net::{Connection, Endpoint};

use crate::{secure::SecureConn, Error, PeerID, Result};

use frame::{read_frame, Frame, FrameType};
use stream::StreamState;

/// Protocol id of the stream multiplexer, negotiated over the secured conn.
pub const MUX_PROTO: &str = "/mux/1.0";

/// A stream multiplexer over one secured connection.
///
/// Streams opened by the connection initiator carry odd ids, streams opened
/// by the acceptor even ids. Each stream has its own receive buffer, so a
/// slow reader on one stream never blocks the others.
///
/// A MuxConn must be [`start`](Self::start)ed before any stream operation;
/// starting spawns the demux read loop on the connection's task group.
pub struct MuxConn {
    conn: SecureConn,
    peer_id: PeerID,
    is_initiator: bool,
    started: AtomicBool,
    closed: AtomicBool,
    next_stream_id: AtomicU32,
    streams: SyncMutex<HashMap<u32, Arc<StreamState>>>,
    accept_tx: async_channel::Sender<Arc<StreamState>>,
    accept_rx: async_channel::Receiver<Arc<StreamState>>,
    /// Serializes frame writes so frames never interleave on the wire.
    write_lock: Mutex<()>,
    closed_signal: CondWait,
    task_group: TaskGroup,
}

impl std::fmt::Debug for MuxConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxConn")
            .field("peer_id", &self.peer_id)
            .field("is_initiator", &self.is_initiator)
            .finish()
    }
}

impl MuxConn {
    pub fn new(conn: SecureConn, executor: Executor) -> Arc<Self> {
        let (accept_tx, accept_rx) = async_channel::unbounded();
        let is_initiator = conn.is_initiator();
        Arc::new(Self {
            peer_id: conn.remote_id().clone(),
            is_initiator,
            conn,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            next_stream_id: AtomicU32::new(if is_initiator { 1 } else { 2 }),
            streams: SyncMutex::new(HashMap::new()),
            accept_tx,
            accept_rx,
            write_lock: Mutex::new(()),
            closed_signal: CondWait::new(),
            task_group: TaskGroup::with_executor(executor),
        })
    }

    pub fn peer_id(&self) -> &PeerID {
        &self.peer_id
    }

    pub fn is_initiator(&self) -> bool {
        self.is_initiator
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn peer_endpoint(&self) -> hyphae_net::Result<Endpoint> {
        self.conn.peer_endpoint()
    }

    pub fn local_endpoint(&self) -> hyphae_net::Result<Endpoint> {
        self.conn.local_endpoint()
    }

    /// Ids of the currently open streams.
    pub fn streams(&self) -> Vec<u32> {
        self.streams.lock().keys().copied().collect()
    }

    /// Starts the demux read loop. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = self.clone();
        self.task_group.spawn(
            async move { this.read_loop().await },
            |res| async move {
                trace!("mux read loop: {}", res);
            },
        );
    }

    /// Opens a new outgoing stream, announcing it to the remote side.
    pub async fn open_stream(self: &Arc<Self>) -> Result<MuxStream> {
        self.check_running()?;

        let id = self.next_stream_id.fetch_add(2, Ordering::SeqCst);
        let state = StreamState::new(id);
        self.streams.lock().insert(id, state.clone());

        if let Err(err) = self.send_frame(&Frame::open(id)).await {
            self.streams.lock().remove(&id);
            return Err(err);
        }

        trace!("opened stream {id} to {}", self.peer_id);
        Ok(MuxStream {
            conn: self.clone(),
            state,
        })
    }

    /// Waits for the next stream opened by the remote side.
    pub async fn accept_stream(self: &Arc<Self>) -> Result<MuxStream> {
        self.check_running()?;

        let state = self
            .accept_rx
            .recv()
            .await
            .map_err(|_| Error::ConnClosed)?;

        trace!("accepted stream {} from {}", state.id, self.peer_id);
        Ok(MuxStream {
            conn: self.clone(),
            state,
        })
    }

    /// Closes the connection and all of its streams. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let streams: Vec<(u32, Arc<StreamState>)> = self.streams.lock().drain().collect();
        for (_, state) in &streams {
            state.mark_closed().await;
        }
        // Best effort; the remote side may already be gone.
        for (id, _) in &streams {
            let _ = self.write_frame(&Frame::close(*id)).await;
        }

        self.accept_tx.close();
        let _ = self.conn.close().await;
        self.task_group.cancel().await;
        self.closed_signal.broadcast().await;
        Ok(())
    }

    /// Suspends until the connection is closed, from either side.
    pub async fn wait_closed(&self) {
        self.closed_signal.wait().await;
    }

    fn check_running(&self) -> Result<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(Error::ConnNotStarted);
        }
        if self.is_closed() {
            return Err(Error::ConnClosed);
        }
        Ok(())
    }

    pub(super) async fn send_frame(&self, frame: &Frame) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnClosed);
        }
        self.write_frame(frame).await
    }

    async fn write_frame(&self, frame: &Frame) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.conn.write_all(&frame.encode()).await?;
        Ok(())
    }

    pub(super) fn remove_stream(&self, id: u32) {
        self.streams.lock().remove(&id);
    }

    fn get_stream(&self, id: u32) -> Option<Arc<StreamState>> {
        self.streams.lock().get(&id).cloned()
    }

    /// Whether a remote Open for this id uses the parity assigned to the
    /// other side.
    fn valid_remote_id(&self, id: u32) -> bool {
        id != 0 && (id % 2 == if self.is_initiator { 0 } else { 1 })
    }

    async fn read_loop(self: Arc<Self>) {
        loop {
            let frame = match read_frame(&self.conn).await {
                Ok(frame) => frame,
                Err(err) => {
                    trace!("read loop for {} stopped: {err}", self.peer_id);
                    break;
                }
            };

            match frame.frame_type {
                FrameType::Open => {
                    if !self.valid_remote_id(frame.stream_id)
                        || self.get_stream(frame.stream_id).is_some()
                    {
                        error!(
                            "rejecting bad stream open {} from {}",
                            frame.stream_id, self.peer_id
                        );
                        let _ = self.send_frame(&Frame::reset(frame.stream_id)).await;
                        continue;
                    }

                    let state = StreamState::new(frame.stream_id);
                    self.streams.lock().insert(frame.stream_id, state.clone());
                    if self.accept_tx.send(state).await.is_err() {
                        break;
                    }
                }
                FrameType::Data => {
                    // Frames for unknown ids are late arrivals after a
                    // reset; dropped.
                    if let Some(state) = self.get_stream(frame.stream_id) {
                        state.push_data(&frame.data).await;
                    }
                }
                FrameType::Close => {
                    if let Some(state) = self.get_stream(frame.stream_id) {
                        if state.remote_close().await {
                            self.remove_stream(frame.stream_id);
                        }
                    }
                }
                FrameType::Reset => {
                    if let Some(state) = self.get_stream(frame.stream_id) {
                        state.mark_reset().await;
                        self.remove_stream(frame.stream_id);
                    }
                }
            }
        }

        self.teardown().await;
    }

    /// Cleanup after the read loop dies: every open stream observes a
    /// reset, pending accepts fail, the conn closes.
    async fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let streams: Vec<Arc<StreamState>> =
            self.streams.lock().drain().map(|(_, s)| s).collect();
        for state in streams {
            state.mark_reset().await;
        }

        self.accept_tx.close();
        let _ = self.conn.close().await;
        self.closed_signal.broadcast().await;
    }
}
