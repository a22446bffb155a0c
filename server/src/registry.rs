//! Identity registration and connection binding for the auction server
//!
//! This module owns the mapping from stable session tokens to generated
//! display identities, and from live connection ids to those identities:
//! - First-seen-wins display name allocation ("User 1", "User 2", ...)
//! - Reconnect-durable identities: a returning token resolves to the same name
//! - Synthetic per-connection identities for clients that present no token
//! - TTL-based eviction as a separate policy, never run from the bid path
//!
//! Disconnects deliberately do not remove entries; a client that reconnects
//! with the same token must land on the identity it had before.

use log::info;
use parking_lot::RwLock;
use shared::UserInfo;
use std::collections::HashMap;

/// One registered participant.
///
/// The display name is assigned exactly once when the token is first seen and
/// is never reassigned. `last_registered_ms` only feeds the eviction policy.
#[derive(Debug, Clone)]
pub struct Identity {
    pub info: UserInfo,
    pub last_registered_ms: u64,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Identities indexed by stable session token
    users: HashMap<String, Identity>,
    /// Live connection id -> session token of the bound identity
    bindings: HashMap<u64, String>,
    /// How many distinct identities have ever been seen
    user_count: u64,
}

/// Shared identity table for all connections.
///
/// The registry is low-contention compared to the ledger, so one coarse
/// read-write lock over both tables is enough. It is shared as an `Arc`
/// between the network loop and the eviction sweeper.
#[derive(Debug, Default)]
pub struct UserRegistry {
    inner: RwLock<RegistryState>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection under the given session token.
    ///
    /// A missing token synthesizes one scoped to the connection id, so it can
    /// never collide with a real returning token and never resolves to the
    /// same identity on a later reconnect (connection ids are never reused).
    /// A known token returns the existing identity unchanged; an unknown one
    /// allocates the next sequential display name. The connection binding is
    /// always overwritten.
    pub fn register(&self, connection_id: u64, token: Option<&str>, now_ms: u64) -> UserInfo {
        let token = match token {
            Some(t) => t.to_string(),
            None => format!("anon-{}", connection_id),
        };

        let mut state = self.inner.write();

        if !state.users.contains_key(&token) {
            state.user_count += 1;
            let name = format!("User {}", state.user_count);
            info!("Registered new identity {} as '{}'", token, name);
            state.users.insert(
                token.clone(),
                Identity {
                    info: UserInfo {
                        id: token.clone(),
                        name,
                    },
                    last_registered_ms: now_ms,
                },
            );
        } else if let Some(identity) = state.users.get_mut(&token) {
            identity.last_registered_ms = now_ms;
        }

        state.bindings.insert(connection_id, token.clone());

        state.users[&token].info.clone()
    }

    /// Looks up the identity currently bound to a connection.
    ///
    /// Returns None if the connection never registered, or if its identity
    /// was reclaimed by the eviction policy.
    pub fn resolve(&self, connection_id: u64) -> Option<UserInfo> {
        let state = self.inner.read();
        let token = state.bindings.get(&connection_id)?;
        state.users.get(token).map(|identity| identity.info.clone())
    }

    /// Number of distinct identities currently held.
    pub fn len(&self) -> usize {
        self.inner.read().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().users.is_empty()
    }

    /// Reclaims identities that have not registered within `ttl_ms`.
    ///
    /// This is the explicit growth-control policy layered on top of the
    /// registry: the bid path never calls it, a periodic sweeper does.
    /// Connection bindings pointing at an evicted identity are dropped too.
    /// Returns the evicted session tokens.
    pub fn evict_idle(&self, ttl_ms: u64, now_ms: u64) -> Vec<String> {
        let mut state = self.inner.write();

        let evicted: Vec<String> = state
            .users
            .iter()
            .filter(|(_, identity)| now_ms.saturating_sub(identity.last_registered_ms) > ttl_ms)
            .map(|(token, _)| token.clone())
            .collect();

        for token in &evicted {
            state.users.remove(token);
            info!("Evicted idle identity {}", token);
        }
        state
            .bindings
            .retain(|_, token| !evicted.contains(token));

        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_naming_is_sequential() {
        let registry = UserRegistry::new();

        let a = registry.register(1, Some("token-a"), 0);
        let b = registry.register(2, Some("token-b"), 0);
        let c = registry.register(3, Some("token-c"), 0);

        assert_eq!(a.name, "User 1");
        assert_eq!(b.name, "User 2");
        assert_eq!(c.name, "User 3");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_register_is_idempotent_on_token() {
        let registry = UserRegistry::new();

        let first = registry.register(1, Some("token-a"), 0);
        // Same token, different connection id: reconnect
        let second = registry.register(99, Some("token-a"), 1000);

        assert_eq!(first.name, "User 1");
        assert_eq!(second.name, "User 1");
        assert_eq!(first.id, second.id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_anonymous_registration_is_per_connection() {
        let registry = UserRegistry::new();

        let a = registry.register(7, None, 0);
        let b = registry.register(8, None, 0);

        assert_eq!(a.id, "anon-7");
        assert_eq!(b.id, "anon-8");
        assert_ne!(a.name, b.name);
    }

    #[test]
    fn test_resolve_follows_binding() {
        let registry = UserRegistry::new();

        registry.register(1, Some("token-a"), 0);
        let resolved = registry.resolve(1).unwrap();
        assert_eq!(resolved.name, "User 1");

        assert!(registry.resolve(2).is_none());
    }

    #[test]
    fn test_rebinding_overwrites_prior_identity() {
        let registry = UserRegistry::new();

        registry.register(1, Some("token-a"), 0);
        registry.register(1, Some("token-b"), 0);

        let resolved = registry.resolve(1).unwrap();
        assert_eq!(resolved.id, "token-b");
        assert_eq!(resolved.name, "User 2");
    }

    #[test]
    fn test_evict_idle_removes_only_stale_identities() {
        let registry = UserRegistry::new();

        registry.register(1, Some("stale"), 0);
        registry.register(2, Some("fresh"), 9_000);

        let evicted = registry.evict_idle(5_000, 10_000);

        assert_eq!(evicted, vec!["stale".to_string()]);
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve(1).is_none());
        assert_eq!(registry.resolve(2).unwrap().id, "fresh");
    }

    #[test]
    fn test_evict_idle_noop_when_all_fresh() {
        let registry = UserRegistry::new();

        registry.register(1, Some("a"), 9_500);
        registry.register(2, Some("b"), 9_900);

        let evicted = registry.evict_idle(5_000, 10_000);
        assert!(evicted.is_empty());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_reregistration_refreshes_ttl() {
        let registry = UserRegistry::new();

        registry.register(1, Some("a"), 0);
        // Reconnect just before the sweep
        registry.register(2, Some("a"), 9_000);

        let evicted = registry.evict_idle(5_000, 10_000);
        assert!(evicted.is_empty());
    }

    #[test]
    fn test_name_counter_never_reused_after_eviction() {
        let registry = UserRegistry::new();

        registry.register(1, Some("a"), 0);
        registry.evict_idle(0, 1_000_000);
        assert!(registry.is_empty());

        // The counter keeps climbing; evicted names are not recycled
        let again = registry.register(2, Some("a"), 1_000_000);
        assert_eq!(again.name, "User 2");
    }
}
