use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("IO Error: {0}")]
    IO(#[from] std::io::Error),

    #[error("Timeout Error")]
    Timeout,

    #[error("Try into Error: {0}")]
    TryInto(&'static str),

    #[error("Channel Send Error: {0}")]
    ChannelSend(String),

    #[error("Channel Receive Error: {0}")]
    ChannelRecv(String),

    #[error("Decode Error: {0}")]
    Decode(String),

    #[error("Encode Error: {0}")]
    Encode(String),

    #[error("Ed25519 Error: {0}")]
    Ed25519(#[from] ed25519_dalek::ed25519::Error),
}

impl<T> From<async_channel::SendError<T>> for Error {
    fn from(error: async_channel::SendError<T>) -> Self {
        Error::ChannelSend(error.to_string())
    }
}

impl From<async_channel::RecvError> for Error {
    fn from(error: async_channel::RecvError) -> Self {
        Error::ChannelRecv(error.to_string())
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(error: bincode::error::DecodeError) -> Self {
        Error::Decode(error.to_string())
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(error: bincode::error::EncodeError) -> Self {
        Error::Encode(error.to_string())
    }
}
