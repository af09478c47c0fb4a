//! Identifiers used throughout WagerMatch.
//!
//! Persistent entity IDs use UUIDv7 for time-ordered lexicographic sorting.
//! `ConnectionId` is process-local: it names one transport handle and is
//! never persisted.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// PlayerId
// ---------------------------------------------------------------------------

/// Stable identity of a player account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Opaque handle of an in-memory match session (the "room").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Extract the embedded creation timestamp (milliseconds since UNIX epoch).
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        let bytes = self.0.as_bytes();
        u64::from_be_bytes([
            0, 0, bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5],
        ])
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MatchId
// ---------------------------------------------------------------------------

/// Identifier of the persisted match record, created when stakes are escrowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MatchId(pub Uuid);

impl MatchId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "match:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// LedgerEntryId
// ---------------------------------------------------------------------------

/// Identifier of one immutable ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LedgerEntryId(pub Uuid);

impl LedgerEntryId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LedgerEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LedgerEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ConnectionId
// ---------------------------------------------------------------------------

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Process-local transport handle identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Allocate the next connection id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_id_uniqueness() {
        let a = PlayerId::new();
        let b = PlayerId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn session_id_ordering() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert!(a < b);
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn session_id_timestamp_extraction() {
        let before = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let id = SessionId::new();
        let after = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let ts = id.timestamp_ms();
        assert!(
            ts >= before && ts <= after,
            "ts={ts}, before={before}, after={after}"
        );
    }

    #[test]
    fn connection_ids_are_monotonic() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert!(b > a);
    }

    #[test]
    fn display_prefixes() {
        let m = MatchId::new();
        assert!(m.to_string().starts_with("match:"));
        assert!(SessionId::new().to_string().starts_with("session:"));
        assert_eq!(ConnectionId(7).to_string(), "conn:7");
    }

    #[test]
    fn serde_roundtrips() {
        let pid = PlayerId::new();
        let json = serde_json::to_string(&pid).unwrap();
        let back: PlayerId = serde_json::from_str(&json).unwrap();
        assert_eq!(pid, back);
    }
}
