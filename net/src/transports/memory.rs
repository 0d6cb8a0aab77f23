use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use log::trace;
use once_cell::sync::Lazy;
use parking_lot::Mutex as SyncMutex;
use smol::lock::Mutex;

use crate::{
    connection::{Conn, Connection},
    endpoint::{Endpoint, Port},
    listener::{ConnListener, Listener},
    transport::Transport,
    Error, Result,
};

/// Registry of in-process listeners, keyed by mem port.
static REGISTRY: Lazy<SyncMutex<HashMap<Port, async_channel::Sender<Conn>>>> =
    Lazy::new(|| SyncMutex::new(HashMap::new()));

fn refused() -> Error {
    Error::IO(std::io::ErrorKind::ConnectionRefused.into())
}

/// In-process connection implementation of the [`Connection`] trait.
///
/// A MemConn is one end of a bidirectional byte pipe created by [`pipe`].
/// It is deterministic and carries no sockets, which makes it the transport
/// of choice for tests and demos.
pub struct MemConn {
    local: Endpoint,
    peer: Endpoint,
    tx: async_channel::Sender<Vec<u8>>,
    rx: async_channel::Receiver<Vec<u8>>,
    /// Bytes received but not yet consumed by `read`.
    leftover: Mutex<VecDeque<u8>>,
}

/// Creates a connected pair of [`MemConn`]s, one local to each endpoint.
pub fn pipe(a: Endpoint, b: Endpoint) -> (MemConn, MemConn) {
    let (a_tx, b_rx) = async_channel::unbounded();
    let (b_tx, a_rx) = async_channel::unbounded();

    let conn_a = MemConn {
        local: a.clone(),
        peer: b.clone(),
        tx: a_tx,
        rx: a_rx,
        leftover: Mutex::new(VecDeque::new()),
    };
    let conn_b = MemConn {
        local: b,
        peer: a,
        tx: b_tx,
        rx: b_rx,
        leftover: Mutex::new(VecDeque::new()),
    };
    (conn_a, conn_b)
}

#[async_trait]
impl Connection for MemConn {
    fn peer_endpoint(&self) -> Result<Endpoint> {
        Ok(self.peer.clone())
    }

    fn local_endpoint(&self) -> Result<Endpoint> {
        Ok(self.local.clone())
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut leftover = self.leftover.lock().await;

        if leftover.is_empty() {
            match self.rx.recv().await {
                Ok(chunk) => leftover.extend(chunk),
                // Sender dropped or closed; end of stream.
                Err(_) => return Ok(0),
            }
        }

        let n = std::cmp::min(buf.len(), leftover.len());
        for b in buf.iter_mut().take(n) {
            *b = leftover.pop_front().unwrap();
        }
        Ok(n)
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        self.tx
            .send(buf.to_vec())
            .await
            .map_err(|_| Error::IO(std::io::ErrorKind::BrokenPipe.into()))?;
        Ok(buf.len())
    }

    async fn close(&self) -> Result<()> {
        self.tx.close();
        self.rx.close();
        Ok(())
    }
}

/// In-process listener implementation of the [`ConnListener`] trait.
pub struct MemListener {
    endpoint: Endpoint,
    rx: async_channel::Receiver<Conn>,
}

#[async_trait]
impl ConnListener for MemListener {
    fn local_endpoint(&self) -> Result<Endpoint> {
        Ok(self.endpoint.clone())
    }

    async fn accept(&self) -> Result<Conn> {
        self.rx.recv().await.map_err(Error::from)
    }

    async fn close(&self) -> Result<()> {
        REGISTRY.lock().remove(self.endpoint.port());
        self.rx.close();
        Ok(())
    }
}

impl Drop for MemListener {
    fn drop(&mut self) {
        REGISTRY.lock().remove(self.endpoint.port());
    }
}

/// Binds a listener on the given mem endpoint. Port 0 resolves to a free
/// port, reported by the listener's `local_endpoint`.
pub fn listen(endpoint: &Endpoint) -> Result<MemListener> {
    let port = match endpoint {
        Endpoint::Mem(port) => *port,
        _ => return Err(Error::UnsupportedEndpoint(endpoint.to_string())),
    };

    let mut registry = REGISTRY.lock();

    let port = if port == 0 {
        let mut p = hyphae_core::util::random_16();
        while p == 0 || registry.contains_key(&p) {
            p = hyphae_core::util::random_16();
        }
        p
    } else {
        if registry.contains_key(&port) {
            return Err(Error::IO(std::io::ErrorKind::AddrInUse.into()));
        }
        port
    };

    let (tx, rx) = async_channel::unbounded();
    registry.insert(port, tx);

    trace!("listening on mem://{port}");
    Ok(MemListener {
        endpoint: Endpoint::Mem(port),
        rx,
    })
}

/// Connects to the given mem endpoint.
pub async fn dial(endpoint: &Endpoint) -> Result<MemConn> {
    let port = match endpoint {
        Endpoint::Mem(port) => *port,
        _ => return Err(Error::UnsupportedEndpoint(endpoint.to_string())),
    };

    let tx = match REGISTRY.lock().get(&port) {
        Some(tx) => tx.clone(),
        None => return Err(refused()),
    };

    let local = Endpoint::Mem(ephemeral_port());
    let (client, server) = pipe(local, Endpoint::Mem(port));

    tx.send(Box::new(server)).await.map_err(|_| refused())?;

    trace!("connected to mem://{port}");
    Ok(client)
}

fn ephemeral_port() -> Port {
    let registry = REGISTRY.lock();
    let mut p = hyphae_core::util::random_16();
    while p == 0 || registry.contains_key(&p) {
        p = hyphae_core::util::random_16();
    }
    p
}

/// In-process implementation of the [`Transport`] trait.
pub struct MemTransport;

#[async_trait]
impl Transport for MemTransport {
    async fn dial(&self, endpoint: &Endpoint) -> Result<Conn> {
        Ok(Box::new(dial(endpoint).await?))
    }

    async fn listen(&self, endpoint: &Endpoint) -> Result<Listener> {
        Ok(Box::new(listen(endpoint)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_pipe() {
        smol::block_on(async {
            let (a, b) = pipe(Endpoint::Mem(1), Endpoint::Mem(2));

            a.write_all(b"hello").await.unwrap();
            let mut buf = [0u8; 5];
            b.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hello");

            // Reads see writes in order, boundaries aside.
            a.write_all(b"ab").await.unwrap();
            a.write_all(b"cd").await.unwrap();
            let mut buf = [0u8; 4];
            b.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"abcd");

            a.close().await.unwrap();
            let mut buf = [0u8; 1];
            assert_eq!(b.read(&mut buf).await.unwrap(), 0);
        });
    }

    #[test]
    fn test_mem_dial_listen() {
        smol::block_on(async {
            let listener = listen(&"mem://0".parse().unwrap()).unwrap();
            let resolved = listener.local_endpoint().unwrap();

            let conn = dial(&resolved).await.unwrap();
            let accepted = listener.accept().await.unwrap();

            conn.write_all(b"hi").await.unwrap();
            let mut buf = [0u8; 2];
            accepted.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hi");

            // Dialing a port nobody listens on is refused.
            listener.close().await.unwrap();
            assert!(dial(&resolved).await.is_err());
        });
    }
}
