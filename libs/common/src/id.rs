use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// ULIDs sort by creation time, so maps keyed by these IDs iterate in
/// roughly the order the IDs were minted.
///
/// # Examples
/// ```
/// let id = roomcast_common::id::prefixed_ulid("conn");
/// assert!(id.starts_with("conn_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Marker trait for types that carry a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    /// A live client connection (one WebSocket).
    pub const CONNECTION: &str = "conn";
    /// A server process instance, used to tag log lines across a fleet.
    pub const NODE: &str = "node";
}
