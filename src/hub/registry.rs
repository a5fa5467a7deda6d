//! Connection registry.
//!
//! # Responsibilities
//! - Map connection id → user label and group memberships
//! - Map group name → members (connection id → user label)
//! - Resolve a user label to its unique connection
//!
//! # Design Decisions
//! - Both maps are `DashMap`s; reads never take a global lock
//! - Every mutation holds the connection's entry lock while it edits the group
//!   map, and locks are always taken connections → groups, so concurrent calls
//!   for the same id serialize and the maps agree once a call returns
//! - Empty groups are pruned

use std::collections::{BTreeSet, HashMap};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

/// Group used when a connection is registered without one.
pub const PUBLIC_GROUP: &str = "Public Group";

/// User label used when a connection is registered without one.
pub const ANONYMOUS: &str = "Anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No unique connection for `user`; `matches` is 0 or more than 1.
    #[error("user '{user}' matches {matches} connections, expected exactly one")]
    NotFound { user: String, matches: usize },
}

#[derive(Debug, Clone)]
struct ConnectionEntry {
    user: String,
    groups: BTreeSet<String>,
}

/// Thread-safe registry of live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionEntry>,
    groups: DashMap<String, HashMap<String, String>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Re-registering an id replaces its user and group.
    pub fn add_connection(&self, connection_id: &str, group: Option<&str>, user: Option<&str>) {
        let group = group.unwrap_or(PUBLIC_GROUP).to_string();
        let user = user
            .filter(|u| !u.is_empty())
            .unwrap_or(ANONYMOUS)
            .to_string();

        match self.connections.entry(connection_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let previous = std::mem::take(&mut occupied.get_mut().groups);
                for old in previous {
                    self.leave_group(&old, connection_id);
                }
                self.join_group(&group, connection_id, &user);
                let entry = occupied.get_mut();
                entry.user = user;
                entry.groups.insert(group);
            }
            Entry::Vacant(vacant) => {
                self.join_group(&group, connection_id, &user);
                vacant.insert(ConnectionEntry {
                    user,
                    groups: BTreeSet::from([group]),
                });
            }
        }
    }

    /// Remove a connection and every group entry referencing it.
    pub fn remove_connection(&self, connection_id: &str) {
        if let Entry::Occupied(occupied) = self.connections.entry(connection_id.to_string()) {
            for group in &occupied.get().groups {
                self.leave_group(group, connection_id);
            }
            occupied.remove();
        }
    }

    /// The unique connection of `user`.
    pub fn get_connection_id_by_user(&self, user: &str) -> Result<String, RegistryError> {
        let matches: Vec<String> = self
            .connections
            .iter()
            .filter(|r| r.value().user == user)
            .map(|r| r.key().clone())
            .collect();

        if matches.len() == 1 {
            return Ok(matches.into_iter().next().unwrap_or_default());
        }
        Err(RegistryError::NotFound {
            user: user.to_string(),
            matches: matches.len(),
        })
    }

    /// Snapshot of every live connection id, unordered.
    pub fn get_all_connection_ids(&self) -> Vec<String> {
        self.connections.iter().map(|r| r.key().clone()).collect()
    }

    /// Snapshot of the members of `group`, unordered. Empty if the group is unknown.
    pub fn group_members(&self, group: &str) -> Vec<String> {
        self.groups
            .get(group)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.iter().map(|r| r.key().clone()).collect()
    }

    pub fn user_of(&self, connection_id: &str) -> Option<String> {
        self.connections.get(connection_id).map(|r| r.user.clone())
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn join_group(&self, group: &str, connection_id: &str, user: &str) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(connection_id.to_string(), user.to_string());
    }

    fn leave_group(&self, group: &str, connection_id: &str) {
        if let Entry::Occupied(mut members) = self.groups.entry(group.to_string()) {
            members.get_mut().remove(connection_id);
            if members.get().is_empty() {
                members.remove();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn sorted(mut ids: Vec<String>) -> Vec<String> {
        ids.sort();
        ids
    }

    #[test]
    fn test_add_defaults_group_and_user() {
        let registry = ConnectionRegistry::new();
        registry.add_connection("c1", None, None);

        assert_eq!(registry.user_of("c1").as_deref(), Some(ANONYMOUS));
        assert_eq!(registry.group_members(PUBLIC_GROUP), vec!["c1".to_string()]);
    }

    #[test]
    fn test_readd_replaces_association() {
        let registry = ConnectionRegistry::new();
        registry.add_connection("c1", Some("a"), Some("alice"));
        registry.add_connection("c1", Some("b"), Some("bob"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.user_of("c1").as_deref(), Some("bob"));
        assert!(registry.group_members("a").is_empty());
        assert_eq!(registry.group_members("b"), vec!["c1".to_string()]);
        assert_eq!(registry.group_names(), vec!["b".to_string()]);
    }

    #[test]
    fn test_remove_prunes_groups() {
        let registry = ConnectionRegistry::new();
        registry.add_connection("c1", Some("g"), Some("alice"));
        registry.add_connection("c2", Some("g"), Some("bob"));

        registry.remove_connection("c1");
        registry.remove_connection("missing");

        assert_eq!(registry.get_all_connection_ids(), vec!["c2".to_string()]);
        assert_eq!(registry.group_members("g"), vec!["c2".to_string()]);

        registry.remove_connection("c2");
        assert!(registry.is_empty());
        assert!(registry.group_names().is_empty());
    }

    #[test]
    fn test_lookup_by_user() {
        let registry = ConnectionRegistry::new();
        assert_eq!(
            registry.get_connection_id_by_user("alice"),
            Err(RegistryError::NotFound {
                user: "alice".into(),
                matches: 0
            })
        );

        registry.add_connection("c1", None, Some("alice"));
        assert_eq!(registry.get_connection_id_by_user("alice").unwrap(), "c1");

        registry.add_connection("c2", None, Some("alice"));
        assert_eq!(
            registry.get_connection_id_by_user("alice"),
            Err(RegistryError::NotFound {
                user: "alice".into(),
                matches: 2
            })
        );

        registry.remove_connection("c1");
        assert_eq!(registry.get_connection_id_by_user("alice").unwrap(), "c2");
    }

    #[test]
    fn test_concurrent_add_remove_keeps_maps_consistent() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut handles = Vec::new();

        for t in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..200 {
                    let id = format!("t{}-{}", t, i % 20);
                    let group = if i % 3 == 0 { "odd" } else { "even" };
                    registry.add_connection(&id, Some(group), Some("user"));
                    if i % 2 == 0 {
                        registry.remove_connection(&id);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let live: HashSet<String> = registry.get_all_connection_ids().into_iter().collect();
        for group in registry.group_names() {
            for member in registry.group_members(&group) {
                assert!(live.contains(&member), "{} in {} but not live", member, group);
            }
        }
        let grouped: usize = registry
            .group_names()
            .iter()
            .map(|g| registry.group_members(g).len())
            .sum();
        assert_eq!(grouped, live.len());
        assert_eq!(sorted(registry.get_all_connection_ids()).len(), live.len());
    }

    #[test]
    fn test_concurrent_add_remove_on_shared_ids() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut handles = Vec::new();

        for t in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..500 {
                    let id = format!("shared-{}", i % 4);
                    let group = format!("g{}", (t + i) % 3);
                    let user = format!("u{}", t);
                    if (t + i) % 2 == 0 {
                        registry.add_connection(&id, Some(&group), Some(&user));
                    } else {
                        registry.remove_connection(&id);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let live: HashSet<String> = registry.get_all_connection_ids().into_iter().collect();
        let mut grouped = 0;
        for group in registry.group_names() {
            let members = registry.group_members(&group);
            assert!(!members.is_empty(), "empty group {} was not pruned", group);
            for member in members {
                assert!(live.contains(&member), "{} in {} but not live", member, group);
                grouped += 1;
            }
        }
        // Each live id belongs to exactly one group.
        assert_eq!(grouped, live.len());
    }
}
