//! Remote identities and the per-session roster.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::{Deserialize, Serialize};

/// A remote participant.
///
/// `uuid` is the durable key; `name` is the current display name and may
/// change between sessions (or even between a join and a leave).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Display name.
    pub name: String,
    /// Stable identifier.
    pub uuid: String,
}

impl Identity {
    /// Creates a new identity.
    pub fn new(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: uuid.into(),
        }
    }
}

/// The cached set of identities currently present on the server.
///
/// Keyed by [`Identity::uuid`]. A roster belongs to exactly one session and
/// is only touched by that session's loop, so it needs no locking.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    members: HashMap<String, Identity>,
}

impl Roster {
    /// Creates an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole roster with a snapshot.
    ///
    /// Duplicate ids in the snapshot collapse to the last occurrence.
    pub fn replace<I>(&mut self, snapshot: I)
    where
        I: IntoIterator<Item = Identity>,
    {
        self.members = snapshot
            .into_iter()
            .map(|identity| (identity.uuid.clone(), identity))
            .collect();
    }

    /// Adds an identity. Returns `false` if it was already present.
    ///
    /// A join for a present id does not change membership, but the cached
    /// display name is refreshed.
    pub fn join(&mut self, identity: Identity) -> bool {
        match self.members.entry(identity.uuid.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().name = identity.name;
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(identity);
                true
            }
        }
    }

    /// Removes an identity by id. Returns `false` if it was absent.
    pub fn leave(&mut self, identity: &Identity) -> bool {
        self.members.remove(&identity.uuid).is_some()
    }

    /// Returns whether an id is present.
    pub fn contains(&self, uuid: &str) -> bool {
        self.members.contains_key(uuid)
    }

    /// Looks up an identity by id.
    pub fn get(&self, uuid: &str) -> Option<&Identity> {
        self.members.get(uuid)
    }

    /// Finds a present identity by display name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<&Identity> {
        self.members
            .values()
            .find(|identity| identity.name.eq_ignore_ascii_case(name))
    }

    /// Number of present identities.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterates over present identities in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.members.values()
    }

    /// Display names sorted case-insensitively.
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.members.values().map(|i| i.name.as_str()).collect();
        names.sort_by_key(|name| name.to_lowercase());
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(roster: &Roster) -> Vec<String> {
        let mut ids: Vec<String> = roster.iter().map(|i| i.uuid.clone()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_snapshot_then_joins_and_leaves() {
        let mut roster = Roster::new();
        roster.replace([Identity::new("alice", "a"), Identity::new("bob", "b")]);

        assert!(roster.join(Identity::new("carol", "c")));
        assert!(roster.leave(&Identity::new("alice", "a")));
        assert!(roster.join(Identity::new("alice", "a")));
        assert!(roster.leave(&Identity::new("bob", "b")));

        assert_eq!(ids(&roster), vec!["a", "c"]);
    }

    #[test]
    fn test_redundant_events_are_noops() {
        let mut roster = Roster::new();
        roster.replace([Identity::new("alice", "a")]);

        assert!(!roster.join(Identity::new("alice", "a")));
        assert!(!roster.leave(&Identity::new("zed", "z")));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_keyed_by_stable_id_not_name() {
        let mut roster = Roster::new();
        roster.join(Identity::new("alice", "a"));

        // Renamed between join and leave: still the same participant.
        assert!(!roster.join(Identity::new("alice2", "a")));
        assert_eq!(roster.get("a").map(|i| i.name.as_str()), Some("alice2"));
        assert!(roster.leave(&Identity::new("someone-else", "a")));
        assert!(roster.is_empty());
    }

    #[test]
    fn test_snapshot_replaces_wholesale() {
        let mut roster = Roster::new();
        roster.join(Identity::new("alice", "a"));
        roster.join(Identity::new("bob", "b"));

        roster.replace([Identity::new("carol", "c")]);

        assert_eq!(ids(&roster), vec!["c"]);
        assert!(roster.find_by_name("CAROL").is_some());
    }

    #[test]
    fn test_sorted_names() {
        let mut roster = Roster::new();
        roster.replace([
            Identity::new("zed", "z"),
            Identity::new("Alice", "a"),
            Identity::new("bob", "b"),
        ]);
        assert_eq!(roster.sorted_names(), vec!["Alice", "bob", "zed"]);
    }
}
