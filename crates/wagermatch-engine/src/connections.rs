//! Connection registry: which transport handle currently speaks for which
//! player.
//!
//! Sessions reference stable player ids only. Reconnecting is therefore a
//! pure registry update, and a handle that was superseded by a newer one
//! can no longer act for (or disconnect) its former player.

use std::collections::HashMap;

use wagermatch_types::{ConnectionId, PlayerId};

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    by_conn: HashMap<ConnectionId, Option<PlayerId>>,
    by_player: HashMap<PlayerId, ConnectionId>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an anonymous handle.
    pub fn connect(&mut self, conn: ConnectionId) {
        self.by_conn.entry(conn).or_insert(None);
    }

    /// Bind `conn` to `player`. Returns the handle that was evicted, if a
    /// different one held the player.
    pub fn bind(&mut self, conn: ConnectionId, player: PlayerId) -> Option<ConnectionId> {
        // A handle re-identifying as someone else lets go of its old player.
        if let Some(Some(prev)) = self.by_conn.get(&conn).copied() {
            if prev != player && self.by_player.get(&prev) == Some(&conn) {
                self.by_player.remove(&prev);
            }
        }
        self.by_conn.insert(conn, Some(player));
        let evicted = self
            .by_player
            .insert(player, conn)
            .filter(|old| *old != conn);
        if let Some(old) = evicted {
            self.by_conn.insert(old, None);
        }
        evicted
    }

    /// Drop `conn`. Returns the player it was still speaking for.
    pub fn disconnect(&mut self, conn: ConnectionId) -> Option<PlayerId> {
        let player = self.by_conn.remove(&conn).flatten()?;
        if self.by_player.get(&player) == Some(&conn) {
            self.by_player.remove(&player);
            Some(player)
        } else {
            None
        }
    }

    #[must_use]
    pub fn player_of(&self, conn: ConnectionId) -> Option<PlayerId> {
        self.by_conn.get(&conn).copied().flatten()
    }

    #[must_use]
    pub fn conn_of(&self, player: PlayerId) -> Option<ConnectionId> {
        self.by_player.get(&player).copied()
    }

    #[must_use]
    pub fn is_online(&self, player: PlayerId) -> bool {
        self.by_player.contains_key(&player)
    }

    /// Handles currently open, identified or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_conn.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_conn.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_handle_evicts_first() {
        let mut reg = ConnectionRegistry::new();
        let p = PlayerId::new();
        assert_eq!(reg.bind(ConnectionId(1), p), None);
        assert_eq!(reg.bind(ConnectionId(2), p), Some(ConnectionId(1)));
        assert_eq!(reg.conn_of(p), Some(ConnectionId(2)));
        assert_eq!(reg.player_of(ConnectionId(1)), None);
        // The evicted handle closing does not take the player offline.
        assert_eq!(reg.disconnect(ConnectionId(1)), None);
        assert!(reg.is_online(p));
    }

    #[test]
    fn rebinding_same_handle_is_not_an_eviction() {
        let mut reg = ConnectionRegistry::new();
        let p = PlayerId::new();
        reg.bind(ConnectionId(1), p);
        assert_eq!(reg.bind(ConnectionId(1), p), None);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn handle_switching_identity_releases_old_player() {
        let mut reg = ConnectionRegistry::new();
        let (p, q) = (PlayerId::new(), PlayerId::new());
        reg.bind(ConnectionId(1), p);
        reg.bind(ConnectionId(1), q);
        assert!(!reg.is_online(p));
        assert_eq!(reg.player_of(ConnectionId(1)), Some(q));
    }

    #[test]
    fn disconnect_returns_player_once() {
        let mut reg = ConnectionRegistry::new();
        let p = PlayerId::new();
        reg.connect(ConnectionId(5));
        assert_eq!(reg.player_of(ConnectionId(5)), None);
        reg.bind(ConnectionId(5), p);
        assert_eq!(reg.disconnect(ConnectionId(5)), Some(p));
        assert_eq!(reg.disconnect(ConnectionId(5)), None);
        assert!(reg.is_empty());
    }
}
