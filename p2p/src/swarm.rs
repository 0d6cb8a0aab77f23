use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures_util::future::BoxFuture;
use log::{error, trace, warn};
use smol::lock::{Mutex, RwLock};

use hyphae_core::{
    async_util::{timeout, TaskGroup, TaskResult},
    crypto::KeyPair,
    Executor,
};
use hyphae_net::{ConnListener, Endpoint, Transport};

use crate::{
    config::Config,
    conn::{ConnDirection, NetConn},
    multiselect::{Multiselect, ProtocolID},
    mux::{MuxConn, MuxStream},
    notify::{Notifee, Notifier, SwarmEvent},
    peer_store::{PeerInfo, PeerStore},
    secure::ExchangeSecurity,
    upgrader::Upgrader,
    Error, PeerID, Result,
};

/// Handles one inbound stream after its protocol has been negotiated.
pub type StreamHandler =
    Arc<dyn Fn(MuxStream) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wraps an async closure into a [`StreamHandler`].
pub fn stream_handler<F, Fut>(f: F) -> StreamHandler
where
    F: Fn(MuxStream) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |stream| Box::pin(f(stream)))
}

type DialResult = std::result::Result<Arc<NetConn>, String>;

/// The connection manager: owns the transport, the upgrade pipeline, the
/// peer store, the connection table, and the registered stream handlers.
///
/// At most one established connection per peer exists at any time, and at
/// most one upgrade pipeline runs per dialed peer regardless of how many
/// callers are dialing it concurrently.
pub struct Swarm {
    key_pair: KeyPair,
    local_id: PeerID,
    config: Config,
    transport: Arc<dyn Transport>,
    upgrader: Upgrader,
    peer_store: Arc<PeerStore>,
    conns: RwLock<HashMap<PeerID, Arc<NetConn>>>,
    /// Waiters joined to an in-flight dial, keyed by the dialed peer.
    pending_dials: Mutex<HashMap<PeerID, Vec<async_channel::Sender<DialResult>>>>,
    listeners: Mutex<HashMap<Endpoint, Arc<dyn ConnListener>>>,
    handlers: Multiselect<StreamHandler>,
    notifier: Notifier,
    task_group: TaskGroup,
    closed: AtomicBool,
}

impl Swarm {
    pub async fn new(
        key_pair: KeyPair,
        transport: Arc<dyn Transport>,
        config: Config,
        executor: Executor,
    ) -> Arc<Self> {
        let local_id = PeerID::from_public_key(&key_pair.public());

        let upgrader = Upgrader::new(
            Duration::from_secs(config.handshake_timeout),
            executor.clone(),
        )
        .await;
        upgrader
            .register_security(Arc::new(ExchangeSecurity::new(key_pair.clone())))
            .await;

        Arc::new(Self {
            key_pair,
            local_id,
            config,
            transport,
            upgrader,
            peer_store: Arc::new(PeerStore::new()),
            conns: RwLock::new(HashMap::new()),
            pending_dials: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
            handlers: Multiselect::new(),
            notifier: Notifier::new(),
            task_group: TaskGroup::with_executor(executor),
            closed: AtomicBool::new(false),
        })
    }

    pub fn local_peer_id(&self) -> &PeerID {
        &self.local_id
    }

    /// Whether the swarm has been shut down. A closed swarm rejects new
    /// dials, streams, and listeners.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn peer_store(&self) -> &Arc<PeerStore> {
        &self.peer_store
    }

    /// Peers with a currently established connection.
    pub async fn peers(&self) -> Vec<PeerID> {
        self.conns.read().await.keys().cloned().collect()
    }

    pub async fn conns(&self) -> Vec<Arc<NetConn>> {
        self.conns.read().await.values().cloned().collect()
    }

    pub async fn conn(&self, peer_id: &PeerID) -> Option<Arc<NetConn>> {
        self.conns.read().await.get(peer_id).cloned()
    }

    /// Registers a handler for inbound streams negotiating the given
    /// protocol.
    pub async fn set_stream_handler(&self, protocol: ProtocolID, handler: StreamHandler) {
        self.handlers.add_handler(protocol, handler).await;
    }

    pub async fn register_notifee(&self, notifee: Arc<dyn Notifee>) {
        self.notifier.register(notifee).await;
    }

    /// Absorbs the peer's addresses into the store with a provisional TTL,
    /// then dials it.
    pub async fn connect(self: &Arc<Self>, peer_info: &PeerInfo) -> Result<Arc<NetConn>> {
        self.peer_store.add_addrs(
            &peer_info.id,
            &peer_info.addrs,
            Duration::from_secs(self.config.provisional_addr_ttl),
        );
        self.dial_peer(&peer_info.id).await
    }

    /// Returns an established connection to the peer, dialing if necessary.
    ///
    /// Concurrent dials to the same peer collapse into a single upgrade
    /// pipeline; every caller receives the same connection or the same
    /// failure.
    pub async fn dial_peer(self: &Arc<Self>, peer_id: &PeerID) -> Result<Arc<NetConn>> {
        self.check_running()?;

        if peer_id == &self.local_id {
            return Err(Error::Dial("dialing the local peer".to_string()));
        }

        if let Some(conn) = self.conn(peer_id).await {
            return Ok(conn);
        }

        if self.peer_store.addrs(peer_id).is_empty() {
            return Err(Error::NoAddrs(peer_id.clone()));
        }

        // Join an in-flight dial, or claim the slot. The pipeline runs as a
        // swarm task, so a caller dropped mid-dial cannot strand the slot;
        // the task callback clears it and notifies every waiter.
        let (rx, claimed) = {
            let mut pending = self.pending_dials.lock().await;
            if let Some(conn) = self.conns.read().await.get(peer_id) {
                return Ok(conn.clone());
            }
            let (tx, rx) = async_channel::bounded(1);
            match pending.get_mut(peer_id) {
                Some(waiters) => {
                    waiters.push(tx);
                    (rx, false)
                }
                None => {
                    pending.insert(peer_id.clone(), vec![tx]);
                    (rx, true)
                }
            }
        };

        if claimed {
            let this = self.clone();
            let dial_id = peer_id.clone();
            let on_done = {
                let this = self.clone();
                let peer_id = peer_id.clone();
                move |res: TaskResult<Result<Arc<NetConn>>>| async move {
                    let outcome: DialResult = match res {
                        TaskResult::Completed(Ok(conn)) => Ok(conn),
                        TaskResult::Completed(Err(err)) => Err(err.to_string()),
                        TaskResult::Cancelled => Err(Error::SwarmClosed.to_string()),
                    };
                    let waiters = this
                        .pending_dials
                        .lock()
                        .await
                        .remove(&peer_id)
                        .unwrap_or_default();
                    for waiter in waiters {
                        let _ = waiter.send(outcome.clone()).await;
                    }
                }
            };
            self.task_group.spawn(
                async move { this.dial_and_register(&dial_id).await },
                on_done,
            );
        }

        match rx.recv().await? {
            Ok(conn) => Ok(conn),
            Err(err) => Err(Error::Dial(err)),
        }
    }

    /// Opens a stream to the peer, dialing it first if needed, and
    /// negotiates one of the given protocols on the stream.
    pub async fn new_stream(
        self: &Arc<Self>,
        peer_id: &PeerID,
        protocols: &[ProtocolID],
    ) -> Result<MuxStream> {
        let conn = self.dial_peer(peer_id).await?;

        let stream = conn
            .new_stream(
                protocols,
                Duration::from_secs(self.config.negotiation_timeout),
            )
            .await?;

        self.notifier
            .notify(SwarmEvent::OpenedStream(stream.clone()))
            .await;
        Ok(stream)
    }

    /// Starts listening on the given endpoint and returns the resolved
    /// (actually bound) endpoint.
    pub async fn listen(self: &Arc<Self>, endpoint: &Endpoint) -> Result<Endpoint> {
        self.check_running()?;

        let listener = self.transport.listen(endpoint).await?;
        let resolved = listener.local_endpoint()?;
        let listener: Arc<dyn ConnListener> = Arc::from(listener);

        self.listeners
            .lock()
            .await
            .insert(resolved.clone(), listener.clone());

        let this = self.clone();
        let accept_endpoint = resolved.clone();
        self.task_group.spawn(
            async move { this.accept_loop(listener, accept_endpoint).await },
            |_| async {},
        );

        self.notifier
            .notify(SwarmEvent::Listen(resolved.clone()))
            .await;

        trace!("listening on {resolved}");
        Ok(resolved)
    }

    /// Stops accepting on the given listener. Idempotent.
    pub async fn close_listener(&self, endpoint: &Endpoint) -> Result<()> {
        let listener = self.listeners.lock().await.remove(endpoint);
        if let Some(listener) = listener {
            listener.close().await?;
            self.notifier
                .notify(SwarmEvent::ListenClose(endpoint.clone()))
                .await;
        }
        Ok(())
    }

    /// Closes and deregisters the connection to the peer. Idempotent.
    pub async fn close_peer(&self, peer_id: &PeerID) -> Result<()> {
        let conn = self.conns.write().await.remove(peer_id);
        if let Some(conn) = conn {
            let _ = conn.close().await;
            self.notifier.notify(SwarmEvent::Disconnected(conn)).await;
        }
        Ok(())
    }

    /// Shuts the swarm down: listeners first, then every connection, then
    /// all child tasks. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let listeners: Vec<Endpoint> = self.listeners.lock().await.keys().cloned().collect();
        for endpoint in listeners {
            let _ = self.close_listener(&endpoint).await;
        }

        let peers: Vec<PeerID> = self.conns.read().await.keys().cloned().collect();
        for peer_id in peers {
            let _ = self.close_peer(&peer_id).await;
        }

        self.task_group.cancel().await;
        Ok(())
    }

    fn check_running(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SwarmClosed);
        }
        Ok(())
    }

    async fn dial_and_register(self: &Arc<Self>, peer_id: &PeerID) -> Result<Arc<NetConn>> {
        let mux = self.dial_and_upgrade(peer_id).await?;
        self.register_conn(mux, ConnDirection::Outbound).await
    }

    /// Dials every known address in order; the first successful upgrade
    /// wins. The reported failure is from the furthest attempt.
    async fn dial_and_upgrade(&self, peer_id: &PeerID) -> Result<Arc<MuxConn>> {
        let addrs = self.peer_store.addrs(peer_id);
        if addrs.is_empty() {
            return Err(Error::NoAddrs(peer_id.clone()));
        }

        let mut last_err = Error::NoAddrs(peer_id.clone());
        for addr in addrs {
            trace!("dialing {peer_id} at {addr}");
            let conn = match timeout(
                Duration::from_secs(self.config.dial_timeout),
                self.transport.dial(&addr),
            )
            .await
            {
                Ok(Ok(conn)) => conn,
                Ok(Err(err)) => {
                    warn!("dial {addr} failed: {err}");
                    last_err = err.into();
                    continue;
                }
                Err(_) => {
                    warn!("dial {addr} timed out");
                    last_err = Error::Timeout;
                    continue;
                }
            };

            match self.upgrader.upgrade_outbound(conn, peer_id).await {
                Ok(mux) => return Ok(mux),
                Err(err) => {
                    warn!("upgrade of {addr} failed: {err}");
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }

    /// Registers an upgraded connection in the table, enforcing the
    /// one-connection-per-peer rule, and starts serving its inbound streams.
    async fn register_conn(
        self: &Arc<Self>,
        mux: Arc<MuxConn>,
        direction: ConnDirection,
    ) -> Result<Arc<NetConn>> {
        let peer_id = mux.peer_id().clone();

        let conn = {
            let mut conns = self.conns.write().await;
            if conns.contains_key(&peer_id) {
                drop(conns);
                let _ = mux.close().await;
                return Err(Error::PeerAlreadyConnected);
            }
            mux.start();
            let conn = Arc::new(NetConn::new(peer_id.clone(), direction, mux));
            conns.insert(peer_id.clone(), conn.clone());
            conn
        };
        conn.mark_established().await;

        let this = self.clone();
        let conn_c = conn.clone();
        let on_exit = {
            let this = self.clone();
            let peer_id = peer_id.clone();
            move |_res: TaskResult<()>| async move {
                // The conn's accept loop ended: the connection is dead.
                let _ = this.close_peer(&peer_id).await;
            }
        };
        self.task_group
            .spawn(async move { this.conn_loop(conn_c).await }, on_exit);

        self.notifier
            .notify(SwarmEvent::Connected(conn.clone()))
            .await;

        trace!("registered {conn}");
        Ok(conn)
    }

    /// Serves inbound streams on one connection until it dies.
    async fn conn_loop(self: Arc<Self>, conn: Arc<NetConn>) {
        while let Ok(stream) = conn.mux().accept_stream().await {
            let this = self.clone();
            self.task_group.spawn(
                async move { this.handle_inbound_stream(stream).await },
                |res| async move {
                    if let TaskResult::Completed(Err(err)) = res {
                        trace!("inbound stream rejected: {err}");
                    }
                },
            );
        }
    }

    /// Negotiates and runs the registered handler for one inbound stream.
    /// Negotiation failure resets the stream; a handler error is logged and
    /// never propagated.
    async fn handle_inbound_stream(self: Arc<Self>, stream: MuxStream) -> Result<()> {
        let negotiation = timeout(
            Duration::from_secs(self.config.negotiation_timeout),
            self.handlers.negotiate(&stream),
        )
        .await;

        let (protocol, handler) = match negotiation {
            Ok(Ok(selected)) => selected,
            Ok(Err(err)) => {
                stream.reset().await;
                return Err(err);
            }
            Err(_) => {
                stream.reset().await;
                return Err(Error::Timeout);
            }
        };
        stream.set_protocol(protocol);

        self.notifier
            .notify(SwarmEvent::OpenedStream(stream.clone()))
            .await;

        if let Err(err) = handler(stream.clone()).await {
            error!("stream handler for {} failed: {err}", stream.peer_id());
        }

        let _ = MuxStream::close(&stream).await;
        self.notifier
            .notify(SwarmEvent::ClosedStream(stream))
            .await;
        Ok(())
    }

    /// Accepts raw connections on one listener, upgrading each in its own
    /// task.
    async fn accept_loop(self: Arc<Self>, listener: Arc<dyn ConnListener>, endpoint: Endpoint) {
        loop {
            let conn = match listener.accept().await {
                Ok(conn) => conn,
                Err(err) => {
                    trace!("accept loop on {endpoint} stopped: {err}");
                    return;
                }
            };

            let this = self.clone();
            self.task_group.spawn(
                async move {
                    match this.upgrader.upgrade_inbound(conn).await {
                        Ok(mux) => {
                            if let Err(err) =
                                this.register_conn(mux, ConnDirection::Inbound).await
                            {
                                warn!("inbound conn rejected: {err}");
                            }
                        }
                        Err(err) => warn!("inbound upgrade failed: {err}"),
                    }
                },
                |_| async {},
            );
        }
    }
}
