//! Client registry — the authoritative map of registered connections.

use aircast_common::{ClientRole, ServerMessage};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// A registered connection: role, registration time, and the channel that
/// feeds its WebSocket send task.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    pub id: Uuid,
    pub role: ClientRole,
    pub registered_at: DateTime<Utc>,
    pub tx: mpsc::Sender<ServerMessage>,
}

/// Tracks all registered connections, keyed by relay-assigned id.
///
/// At most one entry per id; re-registering overwrites (last write wins).
/// Absence is a normal checked return, never an error.
#[derive(Clone)]
pub struct ClientRegistry {
    clients: Arc<RwLock<HashMap<Uuid, ClientConnection>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a connection. Overwrites any existing entry for the same id.
    pub async fn register(&self, id: Uuid, role: ClientRole, tx: mpsc::Sender<ServerMessage>) {
        let connection = ClientConnection {
            id,
            role,
            registered_at: Utc::now(),
            tx,
        };
        self.clients.write().await.insert(id, connection);
    }

    /// Remove a connection. No-op if it was never registered.
    pub async fn unregister(&self, id: Uuid) {
        self.clients.write().await.remove(&id);
    }

    pub async fn lookup(&self, id: Uuid) -> Option<ClientConnection> {
        self.clients.read().await.get(&id).cloned()
    }

    /// Every registered connection except the given one.
    pub async fn all_except(&self, id: Uuid) -> Vec<ClientConnection> {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.id != id)
            .cloned()
            .collect()
    }

    /// Number of registered connections (serves the status API).
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound() -> mpsc::Sender<ServerMessage> {
        mpsc::channel(8).0
    }

    #[tokio::test]
    async fn register_then_lookup() {
        let registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        registry.register(id, ClientRole::Sender, outbound()).await;

        let found = registry.lookup(id).await.expect("registered client");
        assert_eq!(found.id, id);
        assert_eq!(found.role, ClientRole::Sender);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn lookup_of_unknown_id_is_absent() {
        let registry = ClientRegistry::new();
        assert!(registry.lookup(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn re_registration_overwrites_role() {
        let registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        registry.register(id, ClientRole::Sender, outbound()).await;
        registry.register(id, ClientRole::Receiver, outbound()).await;

        let found = registry.lookup(id).await.unwrap();
        assert_eq!(found.role, ClientRole::Receiver);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn unregister_removes_and_tolerates_absent() {
        let registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        registry.register(id, ClientRole::Receiver, outbound()).await;
        registry.unregister(id).await;
        assert!(registry.lookup(id).await.is_none());

        // Second removal is a no-op
        registry.unregister(id).await;
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn all_except_excludes_only_the_given_id() {
        let registry = ClientRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        registry.register(a, ClientRole::Sender, outbound()).await;
        registry.register(b, ClientRole::Receiver, outbound()).await;
        registry.register(c, ClientRole::Receiver, outbound()).await;

        let others = registry.all_except(a).await;
        assert_eq!(others.len(), 2);
        assert!(others.iter().all(|conn| conn.id != a));
    }
}
