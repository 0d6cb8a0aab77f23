use std::{fmt, sync::Arc};

use async_trait::async_trait;
use log::debug;
use smol::lock::{Mutex, RwLock};

use hyphae_net::Endpoint;

use crate::{conn::NetConn, mux::MuxStream};

/// Receives lifecycle events from the swarm. All methods default to no-ops,
/// so implementors only override what they care about.
///
/// Notifee methods run inside the swarm's dispatch; they should return
/// promptly and must not fail the swarm.
#[async_trait]
pub trait Notifee: Send + Sync {
    async fn connected(&self, _conn: &Arc<NetConn>) {}
    async fn disconnected(&self, _conn: &Arc<NetConn>) {}
    async fn opened_stream(&self, _stream: &MuxStream) {}
    async fn closed_stream(&self, _stream: &MuxStream) {}
    async fn listen(&self, _endpoint: &Endpoint) {}
    async fn listen_close(&self, _endpoint: &Endpoint) {}
}

/// A lifecycle event dispatched to every registered [`Notifee`].
#[derive(Clone)]
pub enum SwarmEvent {
    Connected(Arc<NetConn>),
    Disconnected(Arc<NetConn>),
    OpenedStream(MuxStream),
    ClosedStream(MuxStream),
    Listen(Endpoint),
    ListenClose(Endpoint),
}

impl fmt::Display for SwarmEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SwarmEvent::Connected(conn) => write!(f, "Connected: {}", conn.peer_id()),
            SwarmEvent::Disconnected(conn) => write!(f, "Disconnected: {}", conn.peer_id()),
            SwarmEvent::OpenedStream(stream) => {
                write!(f, "OpenedStream: {} ({})", stream.id(), stream.peer_id())
            }
            SwarmEvent::ClosedStream(stream) => {
                write!(f, "ClosedStream: {} ({})", stream.id(), stream.peer_id())
            }
            SwarmEvent::Listen(endpoint) => write!(f, "Listen: {endpoint}"),
            SwarmEvent::ListenClose(endpoint) => write!(f, "ListenClose: {endpoint}"),
        }
    }
}

/// Fans one event out to every registered notifee.
///
/// Dispatch is serialized: one event is delivered to all notifees before
/// the next event starts, so no notifee observes interleaved events.
pub struct Notifier {
    notifees: RwLock<Vec<Arc<dyn Notifee>>>,
    dispatch_lock: Mutex<()>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            notifees: RwLock::new(vec![]),
            dispatch_lock: Mutex::new(()),
        }
    }

    pub async fn register(&self, notifee: Arc<dyn Notifee>) {
        self.notifees.write().await.push(notifee);
    }

    pub async fn notify(&self, event: SwarmEvent) {
        let _guard = self.dispatch_lock.lock().await;
        debug!("notify: {event}");

        let notifees = self.notifees.read().await.clone();
        for notifee in notifees {
            match &event {
                SwarmEvent::Connected(conn) => notifee.connected(conn).await,
                SwarmEvent::Disconnected(conn) => notifee.disconnected(conn).await,
                SwarmEvent::OpenedStream(stream) => notifee.opened_stream(stream).await,
                SwarmEvent::ClosedStream(stream) => notifee.closed_stream(stream).await,
                SwarmEvent::Listen(endpoint) => notifee.listen(endpoint).await,
                SwarmEvent::ListenClose(endpoint) => notifee.listen_close(endpoint).await,
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
