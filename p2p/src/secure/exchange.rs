use async_trait::async_trait;
use bincode::{Decode, Encode};
use log::trace;

use hyphae_core::{
    crypto::{KeyPair, KeyPairType, PublicKey},
    util::{decode, encode},
};
use hyphae_net::Conn;

use crate::{Error, PeerID, ProtocolID, Result};

/// Protocol id of the key-exchange handshake.
pub const EXCHANGE_PROTO: &str = "/plain/1.0";

/// Domain separation prefix for handshake signatures.
const SIG_CONTEXT: &[u8] = b"hyphae-exchange:";

/// Upper bound on a handshake message, length prefix excluded.
const MAX_MSG_LEN: u32 = 1024;

#[derive(Decode, Encode)]
struct ExchangeMsg {
    pubkey: [u8; 32],
    signature: Vec<u8>,
}

/// A minimal authentication handshake: both sides exchange their public
/// keys together with a signature proving possession of the matching
/// secret key. The byte stream itself stays in the clear.
pub struct ExchangeSecurity {
    key_pair: KeyPair,
}

impl ExchangeSecurity {
    pub fn new(key_pair: KeyPair) -> Self {
        Self { key_pair }
    }

    fn local_msg(&self) -> Result<ExchangeMsg> {
        let pubkey: [u8; 32] = self
            .key_pair
            .public()
            .as_bytes()
            .try_into()
            .map_err(|_| Error::TryFromPublicKey("expected a 32-byte public key"))?;

        let mut payload = SIG_CONTEXT.to_vec();
        payload.extend_from_slice(&pubkey);

        Ok(ExchangeMsg {
            pubkey,
            signature: self.key_pair.sign(&payload),
        })
    }

    async fn send_msg(&self, conn: &Conn, msg: &ExchangeMsg) -> Result<()> {
        let payload = encode(msg)?;
        let len = payload.len() as u32;
        conn.write_all(&len.to_be_bytes()).await?;
        conn.write_all(&payload).await?;
        Ok(())
    }

    async fn recv_msg(&self, conn: &Conn) -> Result<ExchangeMsg> {
        let mut len_buf = [0u8; 4];
        conn.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf);
        if len == 0 || len > MAX_MSG_LEN {
            return Err(Error::InvalidMsg(format!(
                "bad handshake message length: {len}"
            )));
        }

        let mut payload = vec![0u8; len as usize];
        conn.read_exact(&mut payload).await?;
        let (msg, _) = decode::<ExchangeMsg>(&payload)?;
        Ok(msg)
    }

    /// Verifies the remote message and returns the authenticated key.
    fn verify_msg(&self, msg: &ExchangeMsg) -> Result<PublicKey> {
        let pubkey = PublicKey::from_bytes(&KeyPairType::Ed25519, &msg.pubkey)
            .map_err(|e| Error::Handshake(e.to_string()))?;

        let mut payload = SIG_CONTEXT.to_vec();
        payload.extend_from_slice(&msg.pubkey);
        pubkey
            .verify(&payload, &msg.signature)
            .map_err(|_| Error::Handshake("invalid handshake signature".to_string()))?;

        Ok(pubkey)
    }

    async fn run(&self, conn: Conn) -> Result<(Conn, PublicKey)> {
        let result = async {
            self.send_msg(&conn, &self.local_msg()?).await?;
            let remote_msg = self.recv_msg(&conn).await?;
            self.verify_msg(&remote_msg)
        }
        .await;

        match result {
            Ok(remote_pubkey) => Ok((conn, remote_pubkey)),
            Err(err) => {
                let _ = conn.close().await;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl super::SecureUpgrader for ExchangeSecurity {
    fn protocol_id(&self) -> ProtocolID {
        EXCHANGE_PROTO.to_string()
    }

    async fn secure_outbound(&self, conn: Conn, expected: &PeerID) -> Result<super::SecureConn> {
        let (conn, remote_pubkey) = self.run(conn).await?;

        let remote_id = PeerID::from_public_key(&remote_pubkey);
        if &remote_id != expected {
            let _ = conn.close().await;
            return Err(Error::IdMismatch {
                expected: expected.clone(),
                found: remote_id,
            });
        }

        trace!("secured outbound connection to {remote_id}");
        Ok(super::SecureConn::new(
            conn,
            true,
            self.key_pair.public(),
            remote_pubkey,
        ))
    }

    async fn secure_inbound(&self, conn: Conn) -> Result<super::SecureConn> {
        let (conn, remote_pubkey) = self.run(conn).await?;

        trace!(
            "secured inbound connection from {}",
            PeerID::from_public_key(&remote_pubkey)
        );
        Ok(super::SecureConn::new(
            conn,
            false,
            self.key_pair.public(),
            remote_pubkey,
        ))
    }
}

#[cfg(test)]
mod tests {
    use hyphae_net::transports::memory;

    use super::super::SecureUpgrader;
    use super::*;

    fn pair() -> (Conn, Conn) {
        let (a, b) = memory::pipe("mem://1".parse().unwrap(), "mem://2".parse().unwrap());
        (Box::new(a), Box::new(b))
    }

    #[test]
    fn test_handshake() {
        smol::block_on(async {
            let kp1 = KeyPair::generate(&KeyPairType::Ed25519);
            let kp2 = KeyPair::generate(&KeyPairType::Ed25519);
            let id2 = PeerID::from_public_key(&kp2.public());

            let (c1, c2) = pair();

            let sec2 = ExchangeSecurity::new(kp2.clone());
            let inbound = smol::spawn(async move { sec2.secure_inbound(c2).await });

            let sec1 = ExchangeSecurity::new(kp1.clone());
            let outbound = sec1.secure_outbound(c1, &id2).await.unwrap();
            let inbound = inbound.await.unwrap();

            assert_eq!(outbound.remote_id(), &id2);
            assert_eq!(
                inbound.remote_id(),
                &PeerID::from_public_key(&kp1.public())
            );
            assert!(outbound.is_initiator());
            assert!(!inbound.is_initiator());
        });
    }

    #[test]
    fn test_id_mismatch() {
        smol::block_on(async {
            let kp1 = KeyPair::generate(&KeyPairType::Ed25519);
            let kp2 = KeyPair::generate(&KeyPairType::Ed25519);

            let (c1, c2) = pair();

            let sec2 = ExchangeSecurity::new(kp2);
            let inbound = smol::spawn(async move {
                let _ = sec2.secure_inbound(c2).await;
            });

            let sec1 = ExchangeSecurity::new(kp1);
            let err = sec1
                .secure_outbound(c1, &PeerID::random())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::IdMismatch { .. }));

            inbound.await;
        });
    }
}
