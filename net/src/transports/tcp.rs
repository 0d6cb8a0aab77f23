use async_trait::async_trait;
use log::trace;

use smol::{
    io::{split, AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf},
    lock::Mutex,
    net::{TcpListener, TcpStream},
};

use crate::{
    connection::{Conn, Connection},
    endpoint::Endpoint,
    listener::{ConnListener, Listener},
    transport::Transport,
    Error, Result,
};

/// TCP network connection implementation of the [`Connection`] trait.
pub struct TcpConn {
    inner: TcpStream,
    read: Mutex<ReadHalf<TcpStream>>,
    write: Mutex<WriteHalf<TcpStream>>,
}

impl TcpConn {
    /// Creates a new TcpConn
    pub fn new(conn: TcpStream) -> Self {
        let (read, write) = split(conn.clone());
        Self {
            inner: conn,
            read: Mutex::new(read),
            write: Mutex::new(write),
        }
    }
}

#[async_trait]
impl Connection for TcpConn {
    fn peer_endpoint(&self) -> Result<Endpoint> {
        Ok(Endpoint::new_tcp_addr(&self.inner.peer_addr()?))
    }

    fn local_endpoint(&self) -> Result<Endpoint> {
        Ok(Endpoint::new_tcp_addr(&self.inner.local_addr()?))
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.read.lock().await.read(buf).await.map_err(Error::from)
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        self.write
            .lock()
            .await
            .write(buf)
            .await
            .map_err(Error::from)
    }

    async fn close(&self) -> Result<()> {
        // Flush buffered writes before tearing the socket down.
        let _ = self.write.lock().await.flush().await;
        self.inner.shutdown(std::net::Shutdown::Both)?;
        Ok(())
    }
}

#[async_trait]
impl ConnListener for TcpListener {
    fn local_endpoint(&self) -> Result<Endpoint> {
        Ok(Endpoint::new_tcp_addr(&self.local_addr()?))
    }

    async fn accept(&self) -> Result<Conn> {
        let (conn, addr) = self.accept().await?;
        conn.set_nodelay(true)?;
        trace!("accepted connection from {addr}");
        Ok(Box::new(TcpConn::new(conn)))
    }

    async fn close(&self) -> Result<()> {
        // The socket is released when the listener is dropped.
        Ok(())
    }
}

/// Connects to the given TCP endpoint.
pub async fn dial(endpoint: &Endpoint) -> Result<TcpConn> {
    let addr: std::net::SocketAddr = match endpoint.clone() {
        Endpoint::Tcp(crate::Addr::Domain(d), port) => {
            return dial_host(&d, port).await;
        }
        e => e
            .try_into()
            .map_err(|_| Error::UnsupportedEndpoint(endpoint.to_string()))?,
    };

    let conn = TcpStream::connect(addr).await?;
    conn.set_nodelay(true)?;
    trace!("connected to {endpoint}");
    Ok(TcpConn::new(conn))
}

async fn dial_host(host: &str, port: u16) -> Result<TcpConn> {
    let conn = TcpStream::connect((host, port)).await?;
    conn.set_nodelay(true)?;
    trace!("connected to {host}:{port}");
    Ok(TcpConn::new(conn))
}

/// Listens on the given TCP endpoint.
pub async fn listen(endpoint: &Endpoint) -> Result<TcpListener> {
    let addr: std::net::SocketAddr = endpoint
        .clone()
        .try_into()
        .map_err(|_| Error::UnsupportedEndpoint(endpoint.to_string()))?;
    let listener = TcpListener::bind(addr).await?;
    trace!("listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// TCP implementation of the [`Transport`] trait.
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    async fn dial(&self, endpoint: &Endpoint) -> Result<Conn> {
        if !matches!(endpoint, Endpoint::Tcp(..)) {
            return Err(Error::UnsupportedEndpoint(endpoint.to_string()));
        }
        Ok(Box::new(dial(endpoint).await?))
    }

    async fn listen(&self, endpoint: &Endpoint) -> Result<Listener> {
        if !matches!(endpoint, Endpoint::Tcp(..)) {
            return Err(Error::UnsupportedEndpoint(endpoint.to_string()));
        }
        Ok(Box::new(listen(endpoint).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_dial_listen() {
        smol::block_on(async {
            let endpoint: Endpoint = "tcp://127.0.0.1:0".parse().unwrap();
            let listener = listen(&endpoint).await.unwrap();
            let resolved = ConnListener::local_endpoint(&listener).unwrap();
            assert_ne!(resolved.port(), &0);

            let server = smol::spawn(async move {
                let conn = ConnListener::accept(&listener).await.unwrap();
                let mut buf = [0u8; 4];
                conn.read_exact(&mut buf).await.unwrap();
                conn.write_all(&buf).await.unwrap();
            });

            let conn = dial(&resolved).await.unwrap();
            conn.write_all(b"ping").await.unwrap();
            let mut buf = [0u8; 4];
            conn.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");

            server.await;
        });
    }
}
