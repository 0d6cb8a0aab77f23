use thiserror::Error as ThisError;

use crate::PeerID;

pub type Result<T> = std::result::Result<T, Error>;

/// Represents hyphae's p2p Error.
#[derive(ThisError, Debug)]
pub enum Error {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error("No known addresses for peer {0}")]
    NoAddrs(PeerID),

    #[error("Dial error: {0}")]
    Dial(String),

    #[error("Handshake error: {0}")]
    Handshake(String),

    #[error("Peer ID mismatch: expected {expected}, found {found}")]
    IdMismatch { expected: PeerID, found: PeerID },

    #[error("Negotiation failed: no mutually supported protocol")]
    NegotiationFailed,

    #[error("Unsupported protocol error: {0}")]
    UnsupportedProtocol(String),

    #[error("Invalid message error: {0}")]
    InvalidMsg(String),

    #[error("Peer already connected")]
    PeerAlreadyConnected,

    #[error("Connection is not started")]
    ConnNotStarted,

    #[error("Connection is closed")]
    ConnClosed,

    #[error("Stream is closed")]
    StreamClosed,

    #[error("Stream is reset")]
    StreamReset,

    #[error("Swarm is closed")]
    SwarmClosed,

    #[error("Peer store error: {0}")]
    PeerStore(&'static str),

    #[error("Try from public key Error: {0}")]
    TryFromPublicKey(&'static str),

    #[error("Timeout Error")]
    Timeout,

    #[error("Channel Send Error: {0}")]
    ChannelSend(String),

    #[error(transparent)]
    ChannelRecv(#[from] async_channel::RecvError),

    #[error(transparent)]
    HyphaeCore(#[from] hyphae_core::Error),

    #[error(transparent)]
    HyphaeNet(#[from] hyphae_net::Error),
}

impl<T> From<async_channel::SendError<T>> for Error {
    fn from(error: async_channel::SendError<T>) -> Self {
        Error::ChannelSend(error.to_string())
    }
}

impl From<Error> for std::io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::IO(err) => err,
            Error::StreamClosed | Error::StreamReset | Error::ConnClosed => {
                std::io::Error::new(std::io::ErrorKind::NotConnected, error.to_string())
            }
            Error::Timeout => std::io::Error::new(std::io::ErrorKind::TimedOut, error.to_string()),
            _ => std::io::Error::other(error.to_string()),
        }
    }
}
