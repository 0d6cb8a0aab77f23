/// A set of helper tools and functions.
pub mod util;

/// A module containing async utilities that work with the
/// [`smol`](https://github.com/smol-rs/smol) async runtime.
pub mod async_util;

/// Represents hyphae's Core Error.
pub mod error;

/// Collects common cryptographic tools.
pub mod crypto;

use std::sync::Arc;

use smol::Executor as SmolEx;

/// A pointer to an Executor
pub type Executor = Arc<SmolEx<'static>>;

pub use error::{Error, Result};
