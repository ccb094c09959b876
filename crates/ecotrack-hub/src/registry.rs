//! Audience-partitioned set of live connections.
//!
//! Mutations take a synchronous write lock and never await while holding it,
//! so a registration or removal is observed atomically by every reader.
//! Fan-out works on snapshots taken under the read lock.

use std::collections::HashMap;
use std::sync::Arc;

use ecotrack_core::{Audience, Identity, Role};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::connection::ClientConnection;

/// Result of [`ConnectionRegistry::register`].
#[derive(Debug)]
pub struct Registered {
    /// The newly registered connection.
    pub connection: Arc<ClientConnection>,
    /// A prior connection with the same id, removed from the registry.
    /// The caller is responsible for closing it.
    pub evicted: Option<Arc<ClientConnection>>,
}

#[derive(Default)]
struct Partitions {
    administrative: HashMap<String, Arc<ClientConnection>>,
    operational: HashMap<String, Arc<ClientConnection>>,
}

impl Partitions {
    fn set(&self, audience: Audience) -> &HashMap<String, Arc<ClientConnection>> {
        match audience {
            Audience::Administrative => &self.administrative,
            Audience::Operational => &self.operational,
        }
    }

    fn set_mut(&mut self, audience: Audience) -> &mut HashMap<String, Arc<ClientConnection>> {
        match audience {
            Audience::Administrative => &mut self.administrative,
            Audience::Operational => &mut self.operational,
        }
    }
}

/// Live connections keyed by client id, one map per audience.
///
/// An id maps to at most one connection across both audiences.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Partitions>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under the identity's audience.
    ///
    /// Always succeeds. Any existing connection with the same id, in either
    /// audience, is evicted and returned.
    pub fn register(&self, identity: Identity, tx: mpsc::Sender<Arc<String>>) -> Registered {
        let connection = Arc::new(ClientConnection::new(identity, tx));
        let mut inner = self.inner.write();
        let evicted = inner
            .administrative
            .remove(&connection.id)
            .or_else(|| inner.operational.remove(&connection.id));
        let _ = inner
            .set_mut(connection.audience)
            .insert(connection.id.clone(), Arc::clone(&connection));
        Registered {
            connection,
            evicted,
        }
    }

    /// Remove `connection` if it is still the registered entry for its id.
    ///
    /// Returns `true` if an entry was removed. Calling it again, or calling it
    /// for a connection that has since been replaced, is a no-op.
    pub fn unregister(&self, connection: &Arc<ClientConnection>) -> bool {
        let mut inner = self.inner.write();
        let set = inner.set_mut(connection.audience);
        let is_current = set
            .get(&connection.id)
            .is_some_and(|current| Arc::ptr_eq(current, connection));
        if is_current {
            let _ = set.remove(&connection.id);
        }
        is_current
    }

    /// Look up an operational connection by id.
    pub fn lookup_operational(&self, id: &str) -> Option<Arc<ClientConnection>> {
        self.inner.read().operational.get(id).cloned()
    }

    /// Look up a connection by id in either audience.
    pub fn lookup(&self, id: &str) -> Option<Arc<ClientConnection>> {
        let inner = self.inner.read();
        inner
            .administrative
            .get(id)
            .or_else(|| inner.operational.get(id))
            .cloned()
    }

    /// Snapshot of one audience.
    pub fn audience_connections(&self, audience: Audience) -> Vec<Arc<ClientConnection>> {
        self.inner.read().set(audience).values().cloned().collect()
    }

    /// Snapshot of the administrative audience.
    pub fn administrative_connections(&self) -> Vec<Arc<ClientConnection>> {
        self.audience_connections(Audience::Administrative)
    }

    /// Snapshot of the operational audience.
    pub fn operational_connections(&self) -> Vec<Arc<ClientConnection>> {
        self.audience_connections(Audience::Operational)
    }

    /// Snapshot of the connections that joined with `role`.
    pub fn role_connections(&self, role: Role) -> Vec<Arc<ClientConnection>> {
        self.inner
            .read()
            .set(role.audience())
            .values()
            .filter(|c| c.role == role)
            .cloned()
            .collect()
    }

    /// Snapshot of every connection.
    pub fn all_connections(&self) -> Vec<Arc<ClientConnection>> {
        let inner = self.inner.read();
        inner
            .administrative
            .values()
            .chain(inner.operational.values())
            .cloned()
            .collect()
    }

    /// Number of administrative connections.
    pub fn administrative_count(&self) -> usize {
        self.inner.read().administrative.len()
    }

    /// Number of operational connections.
    pub fn operational_count(&self) -> usize {
        self.inner.read().operational.len()
    }

    /// Total live connections.
    pub fn connection_count(&self) -> usize {
        let inner = self.inner.read();
        inner.administrative.len() + inner.operational.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecotrack_core::{DEFAULT_ADMIN_PREFIX, Role};

    fn register(registry: &ConnectionRegistry, id: &str) -> Registered {
        let (tx, _rx) = mpsc::channel(8);
        registry.register(Identity::classify(id, DEFAULT_ADMIN_PREFIX), tx)
    }

    fn ids(conns: &[Arc<ClientConnection>]) -> Vec<String> {
        let mut ids: Vec<String> = conns.iter().map(|c| c.id.clone()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn marker_ids_land_only_in_administrative_set() {
        let registry = ConnectionRegistry::new();
        let _ = register(&registry, "admin_dashboard");
        let _ = register(&registry, "collector_demo");
        let _ = register(&registry, "user_1");

        assert_eq!(ids(&registry.administrative_connections()), ["admin_dashboard"]);
        assert_eq!(
            ids(&registry.operational_connections()),
            ["collector_demo", "user_1"]
        );
        assert!(registry.lookup_operational("admin_dashboard").is_none());
        assert!(registry.lookup_operational("user_1").is_some());
        assert_eq!(registry.connection_count(), 3);
    }

    #[test]
    fn role_snapshot_filters_within_audience() {
        let registry = ConnectionRegistry::new();
        let _ = register(&registry, "collector_1");
        let _ = register(&registry, "collector_2");
        let _ = register(&registry, "user_1");
        let _ = register(&registry, "admin_1");
        assert_eq!(
            ids(&registry.role_connections(Role::Collector)),
            ["collector_1", "collector_2"]
        );
        assert_eq!(ids(&registry.role_connections(Role::Citizen)), ["user_1"]);
        assert_eq!(ids(&registry.role_connections(Role::Admin)), ["admin_1"]);
    }

    #[test]
    fn explicit_role_overrides_id_marker() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let _ = registry.register(Identity::new("admin_truck", Role::Collector), tx);
        assert_eq!(registry.administrative_count(), 0);
        assert_eq!(registry.operational_count(), 1);
    }

    #[test]
    fn unregister_removes_from_owning_set_only() {
        let registry = ConnectionRegistry::new();
        let admin = register(&registry, "admin_1").connection;
        let _ = register(&registry, "user_1");

        assert!(registry.unregister(&admin));
        assert_eq!(registry.administrative_count(), 0);
        assert_eq!(registry.operational_count(), 1);
    }

    #[test]
    fn unregister_twice_is_noop() {
        let registry = ConnectionRegistry::new();
        let conn = register(&registry, "user_1").connection;
        assert!(registry.unregister(&conn));
        assert!(!registry.unregister(&conn));
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn duplicate_id_evicts_previous() {
        let registry = ConnectionRegistry::new();
        let first = register(&registry, "user_1");
        assert!(first.evicted.is_none());

        let second = register(&registry, "user_1");
        let evicted = second.evicted.expect("previous connection evicted");
        assert!(Arc::ptr_eq(&evicted, &first.connection));
        assert_eq!(registry.operational_count(), 1);
        let current = registry.lookup_operational("user_1").unwrap();
        assert!(Arc::ptr_eq(&current, &second.connection));
    }

    #[test]
    fn stale_unregister_keeps_replacement() {
        let registry = ConnectionRegistry::new();
        let first = register(&registry, "user_1").connection;
        let second = register(&registry, "user_1").connection;

        assert!(!registry.unregister(&first));
        let current = registry.lookup_operational("user_1").unwrap();
        assert!(Arc::ptr_eq(&current, &second));
    }

    #[test]
    fn duplicate_id_across_audiences_evicts() {
        let registry = ConnectionRegistry::new();
        let _ = register(&registry, "admin_1");
        let (tx, _rx) = mpsc::channel(8);
        let reg = registry.register(Identity::new("admin_1", Role::Citizen), tx);
        assert!(reg.evicted.is_some());
        assert_eq!(registry.administrative_count(), 0);
        assert_eq!(registry.operational_count(), 1);
    }

    #[test]
    fn lookup_finds_either_audience() {
        let registry = ConnectionRegistry::new();
        let _ = register(&registry, "admin_1");
        let _ = register(&registry, "user_1");
        assert!(registry.lookup("admin_1").is_some());
        assert!(registry.lookup("user_1").is_some());
        assert!(registry.lookup("ghost").is_none());
        assert_eq!(registry.all_connections().len(), 2);
    }

    #[test]
    fn snapshot_is_detached_from_registry() {
        let registry = ConnectionRegistry::new();
        let conn = register(&registry, "user_1").connection;
        let snapshot = registry.operational_connections();
        let _ = registry.unregister(&conn);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.operational_count(), 0);
    }
}
