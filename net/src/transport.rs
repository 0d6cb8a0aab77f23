use async_trait::async_trait;

use crate::{Conn, Endpoint, Listener, Result};

/// Transport is a dial/listen factory for raw [`crate::Connection`]s.
///
/// Dial failures must be distinguishable: an unreachable or refused address
/// surfaces as [`crate::Error::IO`], while an endpoint this transport cannot
/// handle surfaces as [`crate::Error::UnsupportedEndpoint`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dials the given endpoint, returning a connected raw connection.
    async fn dial(&self, endpoint: &Endpoint) -> Result<Conn>;

    /// Creates a listener bound to the given endpoint.
    async fn listen(&self, endpoint: &Endpoint) -> Result<Listener>;
}
