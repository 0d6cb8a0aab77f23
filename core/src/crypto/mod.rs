mod key_pair;

pub use key_pair::{KeyPair, KeyPairType, PublicKey, SecretKey};
