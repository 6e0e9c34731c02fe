use crate::config::ServerConfig;
use crate::socket::{Connection, ConnectionId};
use crate::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

mod observer;
pub use observer::{Event, Observer};

mod registry;
pub(crate) use registry::Registry;

mod service;

/// A WebSocket server, listening for connections.
///
/// Each accepted socket is upgraded and served on its own task. Dropping the
/// server stops the listener and closes every connection.
pub struct Server {
    local_addr: SocketAddr,
    registry: Arc<Registry>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Server {
    /// Creates a new Server bound to the specified address and starts
    /// accepting connections.
    /// ```no_run
    /// # async {
    /// use ws_relay::{Event, Server, ServerConfig};
    /// use tokio::sync::mpsc;
    ///
    /// let server = Server::bind("127.0.0.1:8080", ServerConfig::default()).await?;
    /// let (tx, mut events) = mpsc::unbounded_channel::<Event>();
    /// server.add_observer(tx);
    ///
    /// while let Some(event) = events.recv().await {
    ///     println!("{:?}", event);
    /// }
    /// # Ok::<_, ws_relay::Error>(())
    /// # };
    /// ```
    pub async fn bind<A: ToSocketAddrs>(addr: A, config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "websocket server listening");

        let registry = Arc::new(Registry::new());
        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();

        tasks.spawn(accept(
            listener,
            Arc::new(config),
            registry.clone(),
            cancel.clone(),
            tasks.clone(),
        ));

        Ok(Self {
            local_addr,
            registry,
            cancel,
            tasks,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Registers an observer for connection and message events.
    ///
    /// Only events raised after registration are delivered.
    pub fn add_observer<O: Observer + 'static>(&self, observer: O) {
        self.registry.add_observer(Arc::new(observer));
    }

    /// Sends `text` to the connection with the given id.
    pub async fn send(&self, id: &ConnectionId, text: &str) -> Result<()> {
        self.registry.send(id, text).await
    }

    /// Sends `text` to every connection, returning how many sends succeeded.
    pub async fn broadcast(&self, text: &str) -> usize {
        self.registry.broadcast(text).await
    }

    /// Closes a connection. Returns false if it was not connected.
    pub async fn disconnect(&self, id: &ConnectionId) -> bool {
        self.registry.disconnect(id).await
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.registry.get(id)
    }

    /// Looks a connection up by the remote address of its socket.
    pub fn connection_by_addr(&self, addr: &SocketAddr) -> Option<Arc<Connection>> {
        self.registry.get_by_addr(addr)
    }

    /// Returns the `index`th live connection, in connection order.
    pub fn connection_at(&self, index: usize) -> Option<Arc<Connection>> {
        self.registry.get_at(index)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.registry.ids()
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Closes the listener and every connection, then waits for their tasks
    /// to finish.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.registry.disconnect_all().await;

        self.tasks.close();
        self.tasks.wait().await;
        info!(addr = %self.local_addr, "websocket server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    registry: Arc<Registry>,
    cancel: CancellationToken,
    tasks: TaskTracker,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            res = listener.accept() => match res {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(error = %err, "failed to accept connection");
                    continue;
                }
            },
        };
        debug!(peer = %peer, "accepted connection");

        tasks.spawn(service::serve(
            stream,
            peer,
            config.clone(),
            registry.clone(),
            cancel.child_token(),
            tasks.clone(),
        ));
    }
    debug!("listener closed");
}
