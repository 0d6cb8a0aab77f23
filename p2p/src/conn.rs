use std::{fmt, sync::Arc, time::Duration};

use hyphae_core::async_util::{timeout, CondWait};
use hyphae_net::Endpoint;

use crate::{
    multiselect::{self, ProtocolID},
    mux::{MuxConn, MuxStream},
    Error, PeerID, Result,
};

/// Defines the direction of a network connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnDirection {
    Inbound,
    Outbound,
}

impl fmt::Display for ConnDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnDirection::Inbound => write!(f, "Inbound"),
            ConnDirection::Outbound => write!(f, "Outbound"),
        }
    }
}

/// One established session with a peer: the muxed connection plus its
/// direction, as registered in the swarm's connection table.
pub struct NetConn {
    peer_id: PeerID,
    direction: ConnDirection,
    mux: Arc<MuxConn>,
    established: CondWait,
}

impl std::fmt::Debug for NetConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetConn")
            .field("peer_id", &self.peer_id)
            .field("direction", &self.direction)
            .finish()
    }
}

impl NetConn {
    pub fn new(peer_id: PeerID, direction: ConnDirection, mux: Arc<MuxConn>) -> Self {
        Self {
            peer_id,
            direction,
            mux,
            established: CondWait::new(),
        }
    }

    pub fn peer_id(&self) -> &PeerID {
        &self.peer_id
    }

    pub fn direction(&self) -> ConnDirection {
        self.direction
    }

    pub fn mux(&self) -> &Arc<MuxConn> {
        &self.mux
    }

    pub fn peer_endpoint(&self) -> hyphae_net::Result<Endpoint> {
        self.mux.peer_endpoint()
    }

    pub fn local_endpoint(&self) -> hyphae_net::Result<Endpoint> {
        self.mux.local_endpoint()
    }

    /// Ids of the currently open streams on this connection.
    pub fn streams(&self) -> Vec<u32> {
        self.mux.streams()
    }

    pub fn is_closed(&self) -> bool {
        self.mux.is_closed()
    }

    /// Opens a stream and negotiates one of the given application protocols
    /// on it, bounded by the given timeout. The accepted protocol is tagged
    /// on the stream. The stream is opened outside the timeout, so failure
    /// or expiry resets it instead of stranding it in the mux stream table.
    pub async fn new_stream(
        &self,
        protocols: &[ProtocolID],
        negotiation_timeout: Duration,
    ) -> Result<MuxStream> {
        let stream = self.mux.open_stream().await?;
        let negotiated = timeout(
            negotiation_timeout,
            multiselect::select_one_of(&stream, protocols),
        )
        .await;

        match negotiated {
            Ok(Ok(protocol)) => {
                stream.set_protocol(protocol);
                Ok(stream)
            }
            Ok(Err(err)) => {
                stream.reset().await;
                Err(err)
            }
            Err(_) => {
                stream.reset().await;
                Err(Error::Timeout)
            }
        }
    }

    pub async fn close(&self) -> Result<()> {
        self.mux.close().await
    }

    pub(crate) async fn mark_established(&self) {
        self.established.broadcast().await;
    }

    /// Suspends until the connection has been registered in the swarm.
    pub async fn wait_established(&self) {
        self.established.wait().await;
    }
}

impl fmt::Display for NetConn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} conn to {}", self.direction, self.peer_id)
    }
}
