mod decode;
mod encode;

pub use decode::decode;
pub use encode::{encode, encode_into_slice};

use rand::{rngs::OsRng, Rng};

/// Generates and returns a random u32 using `rand::rngs::OsRng`.
pub fn random_32() -> u32 {
    OsRng.gen()
}

/// Generates and returns a random u16 using `rand::rngs::OsRng`.
pub fn random_16() -> u16 {
    OsRng.gen()
}
