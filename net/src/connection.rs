use async_trait::async_trait;

use crate::{Endpoint, Error, Result};

/// Alias for `Box<dyn Connection>`
pub type Conn = Box<dyn Connection>;

/// Connection is a generic byte-stream network connection interface for
/// [`crate::tcp::TcpConn`] and [`crate::memory::MemConn`].
///
/// If you are familiar with the Go language, this is similar to the
/// [Conn](https://pkg.go.dev/net#Conn) interface
#[async_trait]
pub trait Connection: Send + Sync {
    /// Returns the remote peer endpoint of this connection
    fn peer_endpoint(&self) -> Result<Endpoint>;

    /// Returns the local socket endpoint of this connection
    fn local_endpoint(&self) -> Result<Endpoint>;

    /// Reads data from this connection. Returns `Ok(0)` on end of stream.
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Writes data to this connection.
    async fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Closes the connection. Pending reads on the remote side observe
    /// end of stream.
    async fn close(&self) -> Result<()>;

    /// Reads exactly `buf.len()` bytes, failing on a premature end of stream.
    async fn read_exact(&self, buf: &mut [u8]) -> Result<()> {
        let mut read = 0;
        while read < buf.len() {
            let n = self.read(&mut buf[read..]).await?;
            if n == 0 {
                return Err(Error::IO(std::io::ErrorKind::UnexpectedEof.into()));
            }
            read += n;
        }
        Ok(())
    }

    /// Writes the whole buffer to the connection.
    async fn write_all(&self, buf: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..]).await?;
            if n == 0 {
                return Err(Error::IO(std::io::ErrorKind::WriteZero.into()));
            }
            written += n;
        }
        Ok(())
    }
}
