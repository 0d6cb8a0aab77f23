mod exchange;

pub use exchange::{ExchangeSecurity, EXCHANGE_PROTO};

use async_trait::async_trait;

use hyphae_core::crypto::PublicKey;
use hyphae_net::{Conn, Connection, Endpoint};

use crate::{PeerID, ProtocolID, Result};

/// A security handshake implementation, selected during the connection
/// upgrade and run over the raw transport connection.
#[async_trait]
pub trait SecureUpgrader: Send + Sync {
    /// The protocol id this upgrader is negotiated under.
    fn protocol_id(&self) -> ProtocolID;

    /// Runs the handshake as the dialing side. The authenticated remote
    /// identity must equal `expected`, otherwise the handshake fails and
    /// the connection is closed.
    async fn secure_outbound(&self, conn: Conn, expected: &PeerID) -> Result<SecureConn>;

    /// Runs the handshake as the accepting side, learning the remote
    /// identity from the handshake itself.
    async fn secure_inbound(&self, conn: Conn) -> Result<SecureConn>;
}

/// A transport connection wrapped by a completed security handshake.
///
/// Carries the authenticated identities of both sides and still behaves as
/// a plain byte stream via the [`Connection`] impl.
pub struct SecureConn {
    conn: Conn,
    is_initiator: bool,
    local_id: PeerID,
    local_pubkey: PublicKey,
    remote_id: PeerID,
    remote_pubkey: PublicKey,
}

impl std::fmt::Debug for SecureConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureConn")
            .field("is_initiator", &self.is_initiator)
            .field("local_id", &self.local_id)
            .field("remote_id", &self.remote_id)
            .finish()
    }
}

impl SecureConn {
    pub fn new(
        conn: Conn,
        is_initiator: bool,
        local_pubkey: PublicKey,
        remote_pubkey: PublicKey,
    ) -> Self {
        Self {
            local_id: PeerID::from_public_key(&local_pubkey),
            remote_id: PeerID::from_public_key(&remote_pubkey),
            conn,
            is_initiator,
            local_pubkey,
            remote_pubkey,
        }
    }

    /// Whether this side initiated the connection.
    pub fn is_initiator(&self) -> bool {
        self.is_initiator
    }

    pub fn local_id(&self) -> &PeerID {
        &self.local_id
    }

    pub fn local_pubkey(&self) -> &PublicKey {
        &self.local_pubkey
    }

    /// The authenticated identity of the remote side.
    pub fn remote_id(&self) -> &PeerID {
        &self.remote_id
    }

    pub fn remote_pubkey(&self) -> &PublicKey {
        &self.remote_pubkey
    }
}

#[async_trait]
impl Connection for SecureConn {
    fn peer_endpoint(&self) -> hyphae_net::Result<Endpoint> {
        self.conn.peer_endpoint()
    }

    fn local_endpoint(&self) -> hyphae_net::Result<Endpoint> {
        self.conn.local_endpoint()
    }

    async fn read(&self, buf: &mut [u8]) -> hyphae_net::Result<usize> {
        self.conn.read(buf).await
    }

    async fn write(&self, buf: &[u8]) -> hyphae_net::Result<usize> {
        self.conn.write(buf).await
    }

    async fn close(&self) -> hyphae_net::Result<()> {
        self.conn.close().await
    }
}
