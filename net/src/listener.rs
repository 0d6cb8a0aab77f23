use async_trait::async_trait;

use crate::{Conn, Endpoint, Result};

/// Alias for `Box<dyn ConnListener>`
pub type Listener = Box<dyn ConnListener>;

/// ConnListener is a generic network listener interface.
#[async_trait]
pub trait ConnListener: Send + Sync {
    /// Returns the actually-bound local endpoint. This may differ from the
    /// requested endpoint, e.g. after wildcard port resolution.
    fn local_endpoint(&self) -> Result<Endpoint>;

    /// Accepts a new inbound connection.
    async fn accept(&self) -> Result<Conn>;

    /// Stops accepting new connections.
    async fn close(&self) -> Result<()>;
}
