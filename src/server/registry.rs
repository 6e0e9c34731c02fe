use super::Observer;
use crate::socket::{Connection, ConnectionId};
use crate::{Error, Result};
use futures::future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

/// The set of live connections and the observers notified about them.
///
/// Connections are kept in insertion order. Every read or write of the set
/// goes through the one mutex; no await happens while it is held.
#[derive(Default)]
pub(crate) struct Registry {
    connections: Mutex<Vec<Arc<Connection>>>,
    observers: RwLock<Vec<Arc<dyn Observer>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn connections(&self) -> MutexGuard<'_, Vec<Arc<Connection>>> {
        self.connections.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn observers(&self) -> Vec<Arc<dyn Observer>> {
        self.observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn add_observer(&self, observer: Arc<dyn Observer>) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub(crate) fn insert(&self, conn: Arc<Connection>) {
        let id = conn.id().clone();
        info!(client = %id, peer = %conn.peer_addr(), "client connected");
        self.connections().push(conn);

        for observer in self.observers() {
            observer.connected(&id);
        }
    }

    fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let mut connections = self.connections();
        let pos = connections.iter().position(|conn| conn.id() == id)?;
        Some(connections.remove(pos))
    }

    /// Removes the connection and closes it. A no-op for unknown ids.
    pub(crate) async fn disconnect(&self, id: &ConnectionId) -> bool {
        let conn = match self.remove(id) {
            Some(conn) => conn,
            None => return false,
        };
        conn.close().await;
        info!(client = %id, "client disconnected");

        for observer in self.observers() {
            observer.disconnected(id);
        }
        true
    }

    /// Removes and closes every connection.
    pub(crate) async fn disconnect_all(&self) {
        let ids = self.ids();
        debug!(count = ids.len(), "disconnecting all clients");
        future::join_all(ids.iter().map(|id| self.disconnect(id))).await;
    }

    /// Sends `text` to one connection.
    ///
    /// A write fault closes the connection like any other transport fault.
    pub(crate) async fn send(&self, id: &ConnectionId, text: &str) -> Result<()> {
        let conn = self.get(id).ok_or_else(|| Error::NotConnected(id.clone()))?;
        match conn.send_text(text).await {
            Ok(()) => {
                self.message_sent(id, text);
                Ok(())
            }
            Err(Error::Closed) => Err(Error::NotConnected(id.clone())),
            Err(err) => {
                self.disconnect(id).await;
                Err(err)
            }
        }
    }

    /// Sends `text` to every live connection and returns how many succeeded.
    pub(crate) async fn broadcast(&self, text: &str) -> usize {
        let connections = self.snapshot();
        future::join_all(connections.iter().map(|conn| self.send(conn.id(), text)))
            .await
            .into_iter()
            .filter(Result::is_ok)
            .count()
    }

    pub(crate) fn message_received(&self, id: &ConnectionId, text: &str) {
        debug!(client = %id, len = text.len(), "message received");
        for observer in self.observers() {
            observer.message_received(id, text);
        }
    }

    pub(crate) fn message_sent(&self, id: &ConnectionId, text: &str) {
        debug!(client = %id, len = text.len(), "message sent");
        for observer in self.observers() {
            observer.message_sent(id, text);
        }
    }

    pub(crate) fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections()
            .iter()
            .find(|conn| conn.id() == id)
            .cloned()
    }

    pub(crate) fn get_by_addr(&self, addr: &SocketAddr) -> Option<Arc<Connection>> {
        self.connections()
            .iter()
            .find(|conn| conn.peer_addr() == *addr)
            .cloned()
    }

    pub(crate) fn get_at(&self, index: usize) -> Option<Arc<Connection>> {
        self.connections().get(index).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.connections().len()
    }

    pub(crate) fn ids(&self) -> Vec<ConnectionId> {
        self.connections()
            .iter()
            .map(|conn| conn.id().clone())
            .collect()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections().clone()
    }
}
