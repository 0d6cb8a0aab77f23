use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::RwLock;

use hyphae_core::crypto::PublicKey;
use hyphae_net::Endpoint;

use crate::{Error, PeerID, ProtocolID, Result};

/// Describes a peer by its identity and known addresses.
#[derive(Clone, Debug)]
pub struct PeerInfo {
    pub id: PeerID,
    pub addrs: Vec<Endpoint>,
}

impl PeerInfo {
    pub fn new(id: PeerID, addrs: Vec<Endpoint>) -> Self {
        Self { id, addrs }
    }
}

#[derive(Default)]
struct PeerRecord {
    /// Known addresses, each with its expiry deadline.
    addrs: HashMap<Endpoint, Instant>,
    pubkey: Option<PublicKey>,
    protocols: Vec<ProtocolID>,
    metadata: HashMap<String, Vec<u8>>,
}

/// PeerStore keeps address, key, protocol, and metadata bookkeeping for
/// known peers.
///
/// Addresses carry a time-to-live: adding an address that is already known
/// never shortens its remaining lifetime, and extends it when the new TTL
/// is longer. Expired addresses are pruned on lookup.
///
/// The store is internally synchronized and safe to share between tasks.
pub struct PeerStore {
    peers: RwLock<HashMap<PeerID, PeerRecord>>,
}

impl PeerStore {
    /// Creates a new empty PeerStore.
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Adds an address for the given peer. See [`Self::add_addrs`].
    pub fn add_addr(&self, peer_id: &PeerID, addr: &Endpoint, ttl: Duration) {
        self.add_addrs(peer_id, std::slice::from_ref(addr), ttl)
    }

    /// Adds addresses for the given peer, all with the same time-to-live.
    ///
    /// If an address already exists with a longer remaining TTL, it is left
    /// untouched; if it exists with a shorter one, the TTL is extended.
    pub fn add_addrs(&self, peer_id: &PeerID, addrs: &[Endpoint], ttl: Duration) {
        let deadline = Instant::now() + ttl;
        let mut peers = self.peers.write();
        let record = peers.entry(peer_id.clone()).or_default();

        for addr in addrs {
            let expiry = record.addrs.entry(addr.clone()).or_insert(deadline);
            if *expiry < deadline {
                *expiry = deadline;
            }
        }
    }

    /// Returns all currently-valid addresses for the given peer.
    pub fn addrs(&self, peer_id: &PeerID) -> Vec<Endpoint> {
        let now = Instant::now();
        let mut peers = self.peers.write();
        match peers.get_mut(peer_id) {
            Some(record) => {
                record.addrs.retain(|_, expiry| *expiry > now);
                record.addrs.keys().cloned().collect()
            }
            None => vec![],
        }
    }

    /// Removes all previously stored addresses for the given peer.
    pub fn clear_addrs(&self, peer_id: &PeerID) {
        if let Some(record) = self.peers.write().get_mut(peer_id) {
            record.addrs.clear();
        }
    }

    /// Returns all peer IDs with at least one valid address.
    pub fn peers_with_addrs(&self) -> Vec<PeerID> {
        let now = Instant::now();
        let mut peers = self.peers.write();
        let mut result = vec![];
        for (id, record) in peers.iter_mut() {
            record.addrs.retain(|_, expiry| *expiry > now);
            if !record.addrs.is_empty() {
                result.push(id.clone());
            }
        }
        result
    }

    /// Returns the peer's identity together with its valid addresses.
    pub fn peer_info(&self, peer_id: &PeerID) -> PeerInfo {
        PeerInfo {
            id: peer_id.clone(),
            addrs: self.addrs(peer_id),
        }
    }

    /// Associates a public key with the given peer.
    ///
    /// Fails if the peer already has a different key set, or if the key does
    /// not derive the peer's identity.
    pub fn add_pubkey(&self, peer_id: &PeerID, pubkey: PublicKey) -> Result<()> {
        if &PeerID::from_public_key(&pubkey) != peer_id {
            return Err(Error::PeerStore("public key does not match peer id"));
        }

        let mut peers = self.peers.write();
        let record = peers.entry(peer_id.clone()).or_default();
        match &record.pubkey {
            Some(pk) if pk != &pubkey => Err(Error::PeerStore("pubkey already set")),
            _ => {
                record.pubkey = Some(pubkey);
                Ok(())
            }
        }
    }

    /// Returns the public key of the given peer, if known.
    pub fn pubkey(&self, peer_id: &PeerID) -> Option<PublicKey> {
        self.peers
            .read()
            .get(peer_id)
            .and_then(|r| r.pubkey.clone())
    }

    /// Adds protocols to the set supported by the given peer.
    pub fn add_protocols(&self, peer_id: &PeerID, protocols: &[ProtocolID]) {
        let mut peers = self.peers.write();
        let record = peers.entry(peer_id.clone()).or_default();
        for proto in protocols {
            if !record.protocols.contains(proto) {
                record.protocols.push(proto.clone());
            }
        }
    }

    /// Replaces the set of protocols supported by the given peer.
    pub fn set_protocols(&self, peer_id: &PeerID, protocols: &[ProtocolID]) {
        let mut peers = self.peers.write();
        let record = peers.entry(peer_id.clone()).or_default();
        record.protocols = protocols.to_vec();
    }

    /// Returns the protocols known to be supported by the given peer.
    pub fn get_protocols(&self, peer_id: &PeerID) -> Vec<ProtocolID> {
        self.peers
            .read()
            .get(peer_id)
            .map(|r| r.protocols.clone())
            .unwrap_or_default()
    }

    /// Stores a metadata value under the given key for the peer.
    pub fn put_metadata(&self, peer_id: &PeerID, key: &str, val: Vec<u8>) {
        let mut peers = self.peers.write();
        let record = peers.entry(peer_id.clone()).or_default();
        record.metadata.insert(key.to_string(), val);
    }

    /// Returns the metadata value stored under the given key for the peer.
    pub fn get_metadata(&self, peer_id: &PeerID, key: &str) -> Option<Vec<u8>> {
        self.peers
            .read()
            .get(peer_id)
            .and_then(|r| r.metadata.get(key).cloned())
    }
}

impl Default for PeerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_ttl_merge() {
        let store = PeerStore::new();
        let peer = PeerID::random();
        let addr: Endpoint = "mem://100".parse().unwrap();

        // A shorter TTL must not shorten the remaining lifetime.
        store.add_addrs(&peer, std::slice::from_ref(&addr), secs(10));
        store.add_addrs(&peer, std::slice::from_ref(&addr), secs(5));

        let expiry = {
            let peers = store.peers.read();
            *peers[&peer].addrs.get(&addr).unwrap()
        };
        assert!(expiry >= Instant::now() + secs(9));

        // A longer TTL extends it.
        store.add_addrs(&peer, std::slice::from_ref(&addr), secs(20));
        let expiry = {
            let peers = store.peers.read();
            *peers[&peer].addrs.get(&addr).unwrap()
        };
        assert!(expiry >= Instant::now() + secs(19));

        assert_eq!(store.addrs(&peer), vec![addr]);
    }

    #[test]
    fn test_expired_addrs_are_pruned() {
        let store = PeerStore::new();
        let peer = PeerID::random();
        let addr: Endpoint = "mem://101".parse().unwrap();

        store.add_addr(&peer, &addr, Duration::ZERO);
        assert!(store.addrs(&peer).is_empty());
        assert!(store.peers_with_addrs().is_empty());
    }

    #[test]
    fn test_pubkey() {
        use hyphae_core::crypto::{KeyPair, KeyPairType};

        let store = PeerStore::new();
        let kp = KeyPair::generate(&KeyPairType::Ed25519);
        let peer = PeerID::from_public_key(&kp.public());

        assert!(store.add_pubkey(&peer, kp.public()).is_ok());
        assert_eq!(store.pubkey(&peer), Some(kp.public()));

        // A key that does not derive the peer id is rejected.
        let other = KeyPair::generate(&KeyPairType::Ed25519);
        assert!(store.add_pubkey(&peer, other.public()).is_err());
    }

    #[test]
    fn test_protocols_and_metadata() {
        let store = PeerStore::new();
        let peer = PeerID::random();

        store.add_protocols(&peer, &["/chat/1.0".to_string()]);
        store.add_protocols(&peer, &["/chat/1.0".to_string(), "/sync/1.0".to_string()]);
        assert_eq!(store.get_protocols(&peer).len(), 2);

        store.set_protocols(&peer, &["/chat/2.0".to_string()]);
        assert_eq!(store.get_protocols(&peer), vec!["/chat/2.0".to_string()]);

        store.put_metadata(&peer, "agent", b"hyphae/0.1".to_vec());
        assert_eq!(
            store.get_metadata(&peer, "agent"),
            Some(b"hyphae/0.1".to_vec())
        );
        assert_eq!(store.get_metadata(&peer, "missing"), None);
    }
}
