use std::collections::HashMap;

use async_trait::async_trait;
use log::trace;
use smol::lock::RwLock;

use hyphae_net::Connection;

use crate::{Error, Result};

/// Identifies a protocol by its path-style name, for example `/chat/1.0`.
pub type ProtocolID = String;

/// The negotiation header line both sides must exchange first.
pub const MULTISELECT_PROTO: &str = "/multistream/1.0.0";

/// The rejection sentinel sent by a responder for an unsupported protocol.
pub const NA: &str = "na";

/// Upper bound on the length of a single negotiation line, including the
/// trailing newline.
pub const MAX_LINE_LEN: usize = 1024;

/// Line-oriented messaging used by the negotiation protocol.
///
/// Each message is a utf8 line terminated by a single `\n`. Receiving reads
/// one byte at a time so that no bytes belonging to the application protocol
/// are consumed past the final newline.
#[async_trait]
pub trait Communicator: Send + Sync {
    async fn send_line(&self, line: &str) -> Result<()>;
    async fn recv_line(&self) -> Result<String>;
}

#[async_trait]
impl<C: Connection + ?Sized> Communicator for C {
    async fn send_line(&self, line: &str) -> Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.write_all(&buf).await?;
        Ok(())
    }

    async fn recv_line(&self) -> Result<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            self.read_exact(&mut byte).await?;
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
            if line.len() >= MAX_LINE_LEN {
                return Err(Error::InvalidMsg("negotiation line too long".into()));
            }
        }
        String::from_utf8(line).map_err(|_| Error::InvalidMsg("negotiation line not utf8".into()))
    }
}

/// Performs the negotiation header exchange from the initiator side.
///
/// Sends the header line and expects the same line back. Any other response
/// fails the negotiation.
pub async fn handshake<C: Communicator + ?Sized>(comm: &C) -> Result<()> {
    comm.send_line(MULTISELECT_PROTO).await?;
    let resp = comm.recv_line().await?;
    if resp != MULTISELECT_PROTO {
        return Err(Error::InvalidMsg(format!(
            "unexpected negotiation header: {resp}"
        )));
    }
    Ok(())
}

/// Proposes a single protocol and returns whether the responder accepted it.
///
/// An echo of the proposed id is acceptance; the `na` sentinel is rejection.
/// Anything else is a protocol violation.
pub async fn try_select<C: Communicator + ?Sized>(comm: &C, protocol: &str) -> Result<bool> {
    comm.send_line(protocol).await?;
    let resp = comm.recv_line().await?;
    if resp == protocol {
        return Ok(true);
    }
    if resp == NA {
        return Ok(false);
    }
    Err(Error::InvalidMsg(format!(
        "unexpected negotiation response: {resp}"
    )))
}

/// Proposes the given protocols in order, after the header exchange, and
/// returns the first one the responder accepts.
pub async fn select_one_of<C: Communicator + ?Sized>(
    comm: &C,
    protocols: &[ProtocolID],
) -> Result<ProtocolID> {
    handshake(comm).await?;
    for protocol in protocols {
        if try_select(comm, protocol).await? {
            trace!("negotiation selected {protocol}");
            return Ok(protocol.clone());
        }
    }
    Err(Error::NegotiationFailed)
}

/// The responder side of the negotiation protocol, mapping protocol ids to
/// registered values (typically stream handlers or upgraders).
pub struct Multiselect<T> {
    protocols: RwLock<HashMap<ProtocolID, T>>,
}

impl<T: Clone> Multiselect<T> {
    pub fn new() -> Self {
        Self {
            protocols: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a value under the given protocol id, replacing any
    /// previous registration.
    pub async fn add_handler(&self, protocol: ProtocolID, val: T) {
        self.protocols.write().await.insert(protocol, val);
    }

    /// Returns the currently registered protocol ids.
    pub async fn protocols(&self) -> Vec<ProtocolID> {
        self.protocols.read().await.keys().cloned().collect()
    }

    /// Returns the value registered under the given protocol id.
    pub async fn get(&self, protocol: &str) -> Option<T> {
        self.protocols.read().await.get(protocol).cloned()
    }

    /// Runs the responder side of a negotiation: exchanges the header, then
    /// echoes the first proposed protocol that is registered, answering `na`
    /// to the rest.
    ///
    /// Returns the selected protocol id and its registered value. Runs until
    /// a proposal matches; the caller bounds it with a timeout.
    pub async fn negotiate<C: Communicator + ?Sized>(&self, comm: &C) -> Result<(ProtocolID, T)> {
        // Snapshot the table so the lock is not held across io.
        let protocols = self.protocols.read().await.clone();

        let header = comm.recv_line().await?;
        if header != MULTISELECT_PROTO {
            return Err(Error::InvalidMsg(format!(
                "unexpected negotiation header: {header}"
            )));
        }
        comm.send_line(MULTISELECT_PROTO).await?;

        loop {
            let proposal = comm.recv_line().await?;
            match protocols.get(&proposal) {
                Some(val) => {
                    comm.send_line(&proposal).await?;
                    trace!("negotiation accepted {proposal}");
                    return Ok((proposal, val.clone()));
                }
                None => {
                    comm.send_line(NA).await?;
                }
            }
        }
    }
}

impl<T: Clone> Default for Multiselect<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hyphae_net::transports::memory;

    use super::*;

    #[test]
    fn test_select_first_match() {
        smol::block_on(async {
            let (c1, c2) = memory::pipe(
                "mem://1".parse().unwrap(),
                "mem://2".parse().unwrap(),
            );

            let server: Arc<Multiselect<u32>> = Arc::new(Multiselect::new());
            server.add_handler("/chat/1.0".to_string(), 7).await;
            server.add_handler("/sync/1.0".to_string(), 9).await;

            let server_task = smol::spawn(async move { server.negotiate(&c2).await });

            let selected = select_one_of(
                &c1,
                &["/unknown/1.0".to_string(), "/chat/1.0".to_string()],
            )
            .await
            .unwrap();
            assert_eq!(selected, "/chat/1.0");

            let (proto, val) = server_task.await.unwrap();
            assert_eq!(proto, "/chat/1.0");
            assert_eq!(val, 7);
        });
    }

    #[test]
    fn test_select_exhausted() {
        smol::block_on(async {
            let (c1, c2) = memory::pipe(
                "mem://1".parse().unwrap(),
                "mem://2".parse().unwrap(),
            );

            let server: Arc<Multiselect<u32>> = Arc::new(Multiselect::new());
            server.add_handler("/chat/1.0".to_string(), 7).await;

            let server_task = smol::spawn(async move {
                // Errors out when the initiator gives up and closes.
                let _ = server.negotiate(&c2).await;
            });

            let err = select_one_of(&c1, &["/a/1.0".to_string(), "/b/1.0".to_string()])
                .await
                .unwrap_err();
            assert!(matches!(err, Error::NegotiationFailed));

            c1.close().await.unwrap();
            server_task.await;
        });
    }

    #[test]
    fn test_no_overread() {
        smol::block_on(async {
            let (c1, c2) = memory::pipe(
                "mem://1".parse().unwrap(),
                "mem://2".parse().unwrap(),
            );

            let server: Arc<Multiselect<u32>> = Arc::new(Multiselect::new());
            server.add_handler("/chat/1.0".to_string(), 1).await;

            let server_task = smol::spawn(async move {
                let (proto, _) = server.negotiate(&c2).await.unwrap();
                assert_eq!(proto, "/chat/1.0");
                // Application bytes sent right after negotiation must still
                // be readable in full.
                let mut buf = [0u8; 5];
                c2.read_exact(&mut buf).await.unwrap();
                assert_eq!(&buf, b"hello");
            });

            select_one_of(&c1, &["/chat/1.0".to_string()]).await.unwrap();
            c1.write_all(b"hello").await.unwrap();

            server_task.await;
        });
    }
}
