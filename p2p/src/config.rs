/// the Configuration for the p2p session core.
pub struct Config {
    /// Timeout duration for the security and muxer upgrade of a new
    /// connection, in seconds.
    pub handshake_timeout: u64,
    /// Timeout duration for the per-stream application protocol
    /// negotiation, in seconds.
    pub negotiation_timeout: u64,
    /// Timeout duration for a single transport dial attempt, in seconds.
    pub dial_timeout: u64,
    /// Time-to-live given to addresses absorbed by `connect`, in seconds.
    pub provisional_addr_ttl: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            handshake_timeout: 5,
            negotiation_timeout: 5,
            dial_timeout: 10,
            provisional_addr_ttl: 120,
        }
    }
}
