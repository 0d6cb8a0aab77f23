//! A transport-and-session core for p2p networking.
//!
//! A raw transport connection is upgraded in two negotiated stages, a
//! security handshake and a stream multiplexer, into a session that carries
//! independent protocol streams. The [`Swarm`] ties it together: it dials
//! and accepts peers, deduplicates concurrent dials, keeps one connection
//! per peer, routes inbound streams to registered handlers, and fans
//! lifecycle events out to [`Notifee`]s.

mod config;
mod conn;
mod error;
mod peer_id;
mod peer_store;
mod swarm;
mod upgrader;

pub mod multiselect;
pub mod mux;
pub mod notify;
pub mod secure;

pub use config::Config;
pub use conn::{ConnDirection, NetConn};
pub use error::{Error, Result};
pub use multiselect::ProtocolID;
pub use mux::{MuxConn, MuxStream};
pub use notify::{Notifee, SwarmEvent};
pub use peer_id::PeerID;
pub use peer_store::{PeerInfo, PeerStore};
pub use swarm::{stream_handler, StreamHandler, Swarm};
pub use upgrader::Upgrader;
