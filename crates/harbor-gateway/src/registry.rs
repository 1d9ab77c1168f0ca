use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use harbor_types::events::ServerEvent;

/// One authenticated live connection's runtime record.
#[derive(Debug, Clone)]
pub struct Session {
    pub conn_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
}

impl Session {
    pub fn new(conn_id: Uuid, user_id: Uuid, username: String) -> Self {
        Self {
            conn_id,
            user_id,
            username,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("connection {0} is already registered")]
    Duplicate(Uuid),
    #[error("connection {0} is not registered")]
    NotFound(Uuid),
}

/// Authoritative in-memory set of currently connected sessions.
///
/// `sessions` holds one presence entry per authenticated connection, and
/// `by_user` is the derived username index (one user may hold several
/// sessions, one per device or tab). `wires` holds the outbound channel of
/// every open connection, anonymous ones included; that is the set
/// broadcast fans out over. All mutation happens under a single lock, so
/// lookups and snapshots never observe a half-applied change.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<Uuid, Session>,
    by_user: HashMap<String, HashSet<Uuid>>,
    wires: HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
        }
    }

    /// Attach the outbound wire of a freshly opened connection.
    pub async fn attach(&self, conn_id: Uuid, sender: mpsc::UnboundedSender<ServerEvent>) {
        self.inner.write().await.wires.insert(conn_id, sender);
    }

    /// Drop a connection's outbound wire.
    pub async fn detach(&self, conn_id: Uuid) {
        self.inner.write().await.wires.remove(&conn_id);
    }

    /// Insert a session. `Duplicate` should not occur under correct gateway
    /// usage; the check is defensive.
    pub async fn register(&self, session: Session) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        if inner.sessions.contains_key(&session.conn_id) {
            return Err(RegistryError::Duplicate(session.conn_id));
        }
        inner
            .by_user
            .entry(session.username.clone())
            .or_default()
            .insert(session.conn_id);
        inner.sessions.insert(session.conn_id, session);
        Ok(())
    }

    /// Atomically remove and return a session. Callers treat `NotFound` as
    /// a no-op so racing disconnect paths stay idempotent.
    pub async fn deregister(&self, conn_id: Uuid) -> Result<Session, RegistryError> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .remove(&conn_id)
            .ok_or(RegistryError::NotFound(conn_id))?;
        if let Some(conns) = inner.by_user.get_mut(&session.username) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                inner.by_user.remove(&session.username);
            }
        }
        Ok(session)
    }

    /// Point-in-time copy of all registered sessions, safe to iterate
    /// without holding any lock.
    pub async fn snapshot(&self) -> Vec<Session> {
        self.inner.read().await.sessions.values().cloned().collect()
    }

    pub async fn find_by_connection(&self, conn_id: Uuid) -> Option<Session> {
        self.inner.read().await.sessions.get(&conn_id).cloned()
    }

    /// All sessions belonging to a username.
    pub async fn find_by_username(&self, username: &str) -> Vec<Session> {
        let inner = self.inner.read().await;
        inner
            .by_user
            .get(username)
            .map(|conns| {
                conns
                    .iter()
                    .filter_map(|id| inner.sessions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fan an event out to every open connection.
    ///
    /// The target set is collected under one lock acquisition and iterated
    /// outside it, so a registration racing the broadcast lands wholly
    /// before or wholly after the snapshot. Sends are unbounded and
    /// best-effort: a closed peer is logged and skipped, never awaited.
    /// Returns the number of wires that accepted the event.
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        let targets: Vec<(Uuid, mpsc::UnboundedSender<ServerEvent>)> = {
            let inner = self.inner.read().await;
            inner
                .wires
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (conn_id, tx) in targets {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!("skipping closed wire {conn_id} during broadcast");
            }
        }
        delivered
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(username: &str) -> Session {
        Session::new(Uuid::new_v4(), Uuid::new_v4(), username.to_string())
    }

    #[tokio::test]
    async fn register_deregister_bookkeeping() {
        let registry = Registry::new();
        let a = session("alice");
        let b1 = session("bob");
        let b2 = session("bob"); // second device

        registry.register(a.clone()).await.unwrap();
        registry.register(b1.clone()).await.unwrap();
        registry.register(b2.clone()).await.unwrap();
        assert_eq!(registry.snapshot().await.len(), 3);
        assert_eq!(registry.find_by_username("bob").await.len(), 2);

        let removed = registry.deregister(b1.conn_id).await.unwrap();
        assert_eq!(removed.conn_id, b1.conn_id);
        assert_eq!(registry.snapshot().await.len(), 2);
        assert_eq!(registry.find_by_username("bob").await.len(), 1);

        registry.deregister(b2.conn_id).await.unwrap();
        assert!(registry.find_by_username("bob").await.is_empty());
        assert!(registry.find_by_connection(a.conn_id).await.is_some());
    }

    #[tokio::test]
    async fn duplicate_connection_id_is_rejected() {
        let registry = Registry::new();
        let s = session("alice");
        registry.register(s.clone()).await.unwrap();

        let again = Session::new(s.conn_id, Uuid::new_v4(), "mallory".to_string());
        assert!(matches!(
            registry.register(again).await,
            Err(RegistryError::Duplicate(_))
        ));
        assert_eq!(registry.snapshot().await.len(), 1);
        assert_eq!(
            registry.find_by_connection(s.conn_id).await.unwrap().username,
            "alice"
        );
    }

    #[tokio::test]
    async fn deregistering_unknown_connection_is_a_recoverable_miss() {
        let registry = Registry::new();
        assert!(matches!(
            registry.deregister(Uuid::new_v4()).await,
            Err(RegistryError::NotFound(_))
        ));
        // Calling it twice for the same id behaves the same way.
        let s = session("alice");
        registry.register(s.clone()).await.unwrap();
        registry.deregister(s.conn_id).await.unwrap();
        assert!(registry.deregister(s.conn_id).await.is_err());
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_attached_wire() {
        let registry = Registry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.attach(Uuid::new_v4(), tx_a).await;
        registry.attach(Uuid::new_v4(), tx_b).await;

        let event = ServerEvent::Open {
            user_id: Uuid::new_v4(),
            name: "alice".to_string(),
        };
        assert_eq!(registry.broadcast(event).await, 2);
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn dead_wire_does_not_block_delivery_to_the_rest() {
        let registry = Registry::new();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        registry.attach(Uuid::new_v4(), tx_live).await;
        registry.attach(Uuid::new_v4(), tx_dead).await;
        drop(rx_dead);

        let event = ServerEvent::Open {
            user_id: Uuid::new_v4(),
            name: "alice".to_string(),
        };
        assert_eq!(registry.broadcast(event).await, 1);
        assert!(rx_live.recv().await.is_some());
    }

    #[tokio::test]
    async fn broadcast_concurrent_with_registration_sees_whole_sets() {
        let registry = Registry::new();
        let (observer_tx, mut observer_rx) = mpsc::unbounded_channel();
        registry.attach(Uuid::new_v4(), observer_tx).await;

        // Interleave registrations with broadcasts from another task. Every
        // broadcast must reach the observer, whose wire predates them all.
        let writer = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let s = session("churn");
                    let (tx, _rx) = mpsc::unbounded_channel();
                    registry.attach(s.conn_id, tx).await;
                    registry.register(s.clone()).await.unwrap();
                    registry.deregister(s.conn_id).await.unwrap();
                    registry.detach(s.conn_id).await;
                }
            })
        };
        let broadcaster = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    registry
                        .broadcast(ServerEvent::Open {
                            user_id: Uuid::new_v4(),
                            name: "tick".to_string(),
                        })
                        .await;
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.unwrap();
        broadcaster.await.unwrap();

        let mut seen = 0;
        while observer_rx.try_recv().is_ok() {
            seen += 1;
        }
        assert_eq!(seen, 50);
        assert!(registry.snapshot().await.is_empty());
    }
}
