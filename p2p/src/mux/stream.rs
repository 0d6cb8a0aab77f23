use std::{collections::VecDeque, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use smol::lock::Mutex;

use hyphae_core::async_util::{timeout, CondVar};
use hyphae_net::{Connection, Endpoint};

use crate::{Error, ProtocolID, Result};

use super::{
    frame::{Frame, MAX_FRAME_DATA},
    MuxConn,
};

/// Receive-side buffer and lifecycle flags of one stream.
pub(super) struct StreamBuf {
    pub data: VecDeque<u8>,
    pub remote_closed: bool,
    pub local_closed: bool,
    pub reset: bool,
}

/// Shared state of one stream, owned jointly by the conn's stream table and
/// every [`MuxStream`] handle.
pub(super) struct StreamState {
    pub id: u32,
    pub buf: Mutex<StreamBuf>,
    pub read_cv: CondVar,
    protocol: SyncMutex<Option<ProtocolID>>,
    deadline: SyncMutex<Option<Duration>>,
}

impl StreamState {
    pub fn new(id: u32) -> Arc<Self> {
        Arc::new(Self {
            id,
            buf: Mutex::new(StreamBuf {
                data: VecDeque::new(),
                remote_closed: false,
                local_closed: false,
                reset: false,
            }),
            read_cv: CondVar::new(),
            protocol: SyncMutex::new(None),
            deadline: SyncMutex::new(None),
        })
    }

    /// Buffers incoming payload bytes and wakes a pending reader.
    pub async fn push_data(&self, data: &[u8]) {
        let mut buf = self.buf.lock().await;
        if buf.reset || buf.remote_closed {
            return;
        }
        buf.data.extend(data);
        drop(buf);
        self.read_cv.signal();
    }

    /// Marks the remote side closed. Buffered data stays readable.
    pub async fn remote_close(&self) -> bool {
        let mut buf = self.buf.lock().await;
        buf.remote_closed = true;
        let both = buf.local_closed;
        drop(buf);
        self.read_cv.broadcast();
        both
    }

    /// Marks the stream reset and discards buffered data.
    pub async fn mark_reset(&self) {
        let mut buf = self.buf.lock().await;
        buf.reset = true;
        buf.data.clear();
        drop(buf);
        self.read_cv.broadcast();
    }

    /// Marks both directions closed, leaving buffered data readable.
    pub async fn mark_closed(&self) {
        let mut buf = self.buf.lock().await;
        buf.remote_closed = true;
        buf.local_closed = true;
        drop(buf);
        self.read_cv.broadcast();
    }
}

/// One bidirectional stream within a [`MuxConn`].
///
/// Handles are cheap to clone and share the same underlying state.
#[derive(Clone)]
pub struct MuxStream {
    pub(super) conn: Arc<MuxConn>,
    pub(super) state: Arc<StreamState>,
}

impl std::fmt::Debug for MuxStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxStream").field("id", &self.state.id).finish()
    }
}

impl MuxStream {
    pub fn id(&self) -> u32 {
        self.state.id
    }

    /// The peer on the other side of the parent connection.
    pub fn peer_id(&self) -> crate::PeerID {
        self.conn.peer_id().clone()
    }

    /// The application protocol this stream was negotiated for, once set.
    pub fn protocol(&self) -> Option<ProtocolID> {
        self.state.protocol.lock().clone()
    }

    pub fn set_protocol(&self, protocol: ProtocolID) {
        *self.state.protocol.lock() = Some(protocol);
    }

    /// Bounds each subsequent blocking read or write. Expiry fails that one
    /// call with `Error::Timeout`; the stream itself stays usable.
    pub fn set_deadline(&self, deadline: Option<Duration>) {
        *self.state.deadline.lock() = deadline;
    }

    /// Reads buffered bytes, suspending while the buffer is empty.
    ///
    /// Fails with `Error::StreamReset` on a reset stream and
    /// `Error::StreamClosed` once the remote side closed and the buffer is
    /// drained.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let deadline = *self.state.deadline.lock();
        match deadline {
            Some(d) => timeout(d, self.read_inner(buf))
                .await
                .map_err(|_| Error::Timeout)?,
            None => self.read_inner(buf).await,
        }
    }

    async fn read_inner(&self, buf: &mut [u8]) -> Result<usize> {
        let mut sb = self.state.buf.lock().await;
        loop {
            if sb.reset {
                return Err(Error::StreamReset);
            }
            if !sb.data.is_empty() {
                let n = std::cmp::min(buf.len(), sb.data.len());
                for b in buf.iter_mut().take(n) {
                    *b = sb.data.pop_front().unwrap();
                }
                return Ok(n);
            }
            if sb.remote_closed {
                return Err(Error::StreamClosed);
            }
            sb = self.state.read_cv.wait(sb).await;
        }
    }

    /// Writes the whole buffer, chunked into Data frames.
    ///
    /// Fails with `Error::StreamClosed` after a local close and
    /// `Error::StreamReset` on a reset stream.
    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        let deadline = *self.state.deadline.lock();
        match deadline {
            Some(d) => timeout(d, self.write_inner(buf))
                .await
                .map_err(|_| Error::Timeout)?,
            None => self.write_inner(buf).await,
        }
    }

    async fn write_inner(&self, buf: &[u8]) -> Result<usize> {
        {
            let sb = self.state.buf.lock().await;
            if sb.reset {
                return Err(Error::StreamReset);
            }
            if sb.local_closed {
                return Err(Error::StreamClosed);
            }
        }

        for chunk in buf.chunks(MAX_FRAME_DATA) {
            self.conn
                .send_frame(&Frame::data(self.state.id, chunk.to_vec()))
                .await?;
        }
        Ok(buf.len())
    }

    /// Half-closes the local side: no further writes, the remote side may
    /// keep sending. Closing an already closed or reset stream is a no-op.
    pub async fn close(&self) -> Result<()> {
        let both_closed = {
            let mut sb = self.state.buf.lock().await;
            if sb.reset || sb.local_closed {
                return Ok(());
            }
            sb.local_closed = true;
            sb.remote_closed
        };

        if both_closed {
            self.conn.remove_stream(self.state.id);
        }

        // Best effort; the conn may already be gone.
        let _ = self
            .conn
            .send_frame(&Frame::close(self.state.id))
            .await;
        Ok(())
    }

    /// Abruptly terminates both directions and discards buffered data.
    pub async fn reset(&self) {
        {
            let mut sb = self.state.buf.lock().await;
            if sb.reset {
                return;
            }
            sb.reset = true;
            sb.data.clear();
        }
        self.state.read_cv.broadcast();
        self.conn.remove_stream(self.state.id);
        let _ = self
            .conn
            .send_frame(&Frame::reset(self.state.id))
            .await;
    }
}

#[async_trait]
impl Connection for MuxStream {
    fn peer_endpoint(&self) -> hyphae_net::Result<Endpoint> {
        self.conn.peer_endpoint()
    }

    fn local_endpoint(&self) -> hyphae_net::Result<Endpoint> {
        self.conn.local_endpoint()
    }

    async fn read(&self, buf: &mut [u8]) -> hyphae_net::Result<usize> {
        match MuxStream::read(self, buf).await {
            Ok(n) => Ok(n),
            // The byte-stream contract reports end of stream as Ok(0).
            Err(Error::StreamClosed) => Ok(0),
            Err(err) => Err(hyphae_net::Error::IO(err.into())),
        }
    }

    async fn write(&self, buf: &[u8]) -> hyphae_net::Result<usize> {
        MuxStream::write(self, buf)
            .await
            .map_err(|err| hyphae_net::Error::IO(err.into()))
    }

    async fn close(&self) -> hyphae_net::Result<()> {
        MuxStream::close(self)
            .await
            .map_err(|err| hyphae_net::Error::IO(err.into()))
    }
}
