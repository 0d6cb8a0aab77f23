use std::{sync::Arc, time::Duration};

use log::trace;
use smol::lock::RwLock;

use hyphae_core::{async_util::timeout, Executor};
use hyphae_net::Conn;

use crate::{
    multiselect::{self, Multiselect, ProtocolID},
    mux::{MuxConn, MUX_PROTO},
    secure::SecureUpgrader,
    Error, PeerID, Result,
};

/// Runs the connection upgrade pipeline: raw transport connection, security
/// handshake, stream muxer. Both stages are multiselect-negotiated, the
/// security stage over the raw conn and the muxer stage over the secured one.
///
/// The whole pipeline is bounded by a single handshake timeout; any failure
/// closes the underlying connection.
pub struct Upgrader {
    /// Proposal order for the outbound security negotiation.
    security_order: RwLock<Vec<ProtocolID>>,
    security: Multiselect<Arc<dyn SecureUpgrader>>,
    muxers: Multiselect<()>,
    handshake_timeout: Duration,
    executor: Executor,
}

impl Upgrader {
    pub async fn new(handshake_timeout: Duration, executor: Executor) -> Self {
        let muxers = Multiselect::new();
        muxers.add_handler(MUX_PROTO.to_string(), ()).await;
        Self {
            security_order: RwLock::new(vec![]),
            security: Multiselect::new(),
            muxers,
            handshake_timeout,
            executor,
        }
    }

    /// Registers a security handshake implementation. Outbound upgrades
    /// propose implementations in registration order.
    pub async fn register_security(&self, upgrader: Arc<dyn SecureUpgrader>) {
        let id = upgrader.protocol_id();
        self.security_order.write().await.push(id.clone());
        self.security.add_handler(id, upgrader).await;
    }

    /// Upgrades a dialed connection, verifying the remote identity against
    /// `expected`.
    pub async fn upgrade_outbound(&self, conn: Conn, expected: &PeerID) -> Result<Arc<MuxConn>> {
        timeout(
            self.handshake_timeout,
            self.outbound_pipeline(conn, expected),
        )
        .await
        .map_err(|_| Error::Timeout)?
    }

    /// Upgrades an accepted connection, learning the remote identity from
    /// the security handshake.
    pub async fn upgrade_inbound(&self, conn: Conn) -> Result<Arc<MuxConn>> {
        timeout(self.handshake_timeout, self.inbound_pipeline(conn))
            .await
            .map_err(|_| Error::Timeout)?
    }

    async fn outbound_pipeline(&self, conn: Conn, expected: &PeerID) -> Result<Arc<MuxConn>> {
        let proposals = self.security_order.read().await.clone();
        let selected = match multiselect::select_one_of(conn.as_ref(), &proposals).await {
            Ok(selected) => selected,
            Err(err) => {
                let _ = conn.close().await;
                return Err(err);
            }
        };
        trace!("outbound security: {selected}");

        let security = match self.security.get(&selected).await {
            Some(security) => security,
            None => {
                let _ = conn.close().await;
                return Err(Error::UnsupportedProtocol(selected));
            }
        };

        // The security stage closes the conn itself on failure.
        let secured = security.secure_outbound(conn, expected).await?;

        if let Err(err) =
            multiselect::select_one_of(&secured, &[MUX_PROTO.to_string()]).await
        {
            let _ = hyphae_net::Connection::close(&secured).await;
            return Err(err);
        }

        Ok(MuxConn::new(secured, self.executor.clone()))
    }

    async fn inbound_pipeline(&self, conn: Conn) -> Result<Arc<MuxConn>> {
        let (selected, security) = match self.security.negotiate(conn.as_ref()).await {
            Ok(res) => res,
            Err(err) => {
                let _ = conn.close().await;
                return Err(err);
            }
        };
        trace!("inbound security: {selected}");

        let secured = security.secure_inbound(conn).await?;

        if let Err(err) = self.muxers.negotiate(&secured).await {
            let _ = hyphae_net::Connection::close(&secured).await;
            return Err(err);
        }

        Ok(MuxConn::new(secured, self.executor.clone()))
    }
}

#[cfg(test)]
mod tests {
    use hyphae_core::crypto::{KeyPair, KeyPairType};
    use hyphae_net::transports::memory;

    use crate::secure::ExchangeSecurity;

    use super::*;

    #[test]
    fn test_upgrade_pipeline() {
        let ex = Arc::new(smol::Executor::new());
        smol::block_on(ex.clone().run(async move {
            let kp1 = KeyPair::generate(&KeyPairType::Ed25519);
            let kp2 = KeyPair::generate(&KeyPairType::Ed25519);
            let id2 = PeerID::from_public_key(&kp2.public());

            let up1 = Upgrader::new(Duration::from_secs(2), ex.clone()).await;
            up1.register_security(Arc::new(ExchangeSecurity::new(kp1.clone())))
                .await;
            let up2 = Upgrader::new(Duration::from_secs(2), ex.clone()).await;
            up2.register_security(Arc::new(ExchangeSecurity::new(kp2)))
                .await;

            let (a, b) = memory::pipe("mem://1".parse().unwrap(), "mem://2".parse().unwrap());

            let inbound = smol::spawn(async move { up2.upgrade_inbound(Box::new(b)).await });

            let mux1 = up1.upgrade_outbound(Box::new(a), &id2).await.unwrap();
            let mux2 = inbound.await.unwrap();

            assert_eq!(mux1.peer_id(), &id2);
            assert_eq!(mux2.peer_id(), &PeerID::from_public_key(&kp1.public()));
            assert!(mux1.is_initiator());
            assert!(!mux2.is_initiator());

            // The upgraded pair muxes streams end to end.
            mux1.start();
            mux2.start();
            let stream = mux1.open_stream().await.unwrap();
            crate::mux::MuxStream::write(&stream, b"up").await.unwrap();
            let accepted = mux2.accept_stream().await.unwrap();
            let mut buf = [0u8; 2];
            crate::mux::MuxStream::read(&accepted, &mut buf).await.unwrap();
            assert_eq!(&buf, b"up");
        }));
    }

    #[test]
    fn test_upgrade_no_common_security() {
        let ex = Arc::new(smol::Executor::new());
        smol::block_on(ex.clone().run(async move {
            let kp1 = KeyPair::generate(&KeyPairType::Ed25519);

            let up1 = Upgrader::new(Duration::from_secs(2), ex.clone()).await;
            up1.register_security(Arc::new(ExchangeSecurity::new(kp1)))
                .await;
            // No security registered on the inbound side.
            let up2 = Upgrader::new(Duration::from_secs(2), ex.clone()).await;

            let (a, b) = memory::pipe("mem://1".parse().unwrap(), "mem://2".parse().unwrap());

            let inbound = smol::spawn(async move {
                let _ = up2.upgrade_inbound(Box::new(b)).await;
            });

            let err = up1
                .upgrade_outbound(Box::new(a), &PeerID::random())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::NegotiationFailed));

            inbound.await;
        }));
    }
}
