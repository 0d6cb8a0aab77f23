mod connection;
mod endpoint;
mod error;
mod listener;
mod transport;

pub mod transports;

pub use {
    connection::{Conn, Connection},
    endpoint::{Addr, Endpoint, Port},
    listener::{ConnListener, Listener},
    transport::Transport,
};

pub use transports::memory;
pub use transports::tcp;

/// Represents hyphae's Net Error
pub use error::Error;

/// Represents hyphae's Net Result
pub use error::Result;
