//! Node and session identities.

/// Opaque identity of a mesh node.
///
/// Whatever the radio transport uses to address a peer (a hardware id, a
/// callsign). The protocol only compares and echoes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id from its transport representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the transport representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque token scoping one transfer attempt.
///
/// Caller-generated, never reused across attempts. Generated ids are
/// 48-bit random values printed as 12 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Create a session id from an existing token.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random session id.
    #[cfg(feature = "sender")]
    #[cfg_attr(docsrs, doc(cfg(feature = "sender")))]
    pub fn generate() -> Self {
        let bits = rand::random::<u64>() & 0xffff_ffff_ffff;
        Self(format!("{bits:012x}"))
    }

    /// Get the token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
