//! Collaborator seams consumed by the connection core.
//!
//! The core never touches sockets, routing tables or storage directly.
//! Implementors provide those concerns; the connection calls them as
//! synchronous handoffs — each call completes (success or failure)
//! before the triggering operation is considered done.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use eventline_protocol::{ConnectionId, Event};

/// A boxed future returned by collaborator methods.
pub type CollabFuture<'a, T = ()> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure reported by a transport send.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SendError(pub String);

/// Abstract outbound transport.
///
/// Framing and byte encoding are the implementor's concern; the core
/// hands over one serialized frame — a single triggered event or a
/// flushed batch.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, frame: String) -> CollabFuture<'_, Result<(), SendError>>;
}

/// Routes events to application handlers and exposes connection-manager
/// teardown.
pub trait Dispatcher: Send + Sync + 'static {
    /// Delivers one event for routing. Called in the same order as the
    /// originating connection transitions.
    fn dispatch(&self, event: Event) -> CollabFuture<'_>;

    /// Removes the connection from the manager's registry. Called
    /// exactly once, during teardown.
    fn deregister(&self, id: ConnectionId) -> CollabFuture<'_>;
}

/// Persistent per-connection key/value storage.
pub trait DataStore: Send + Sync + 'static {
    /// Destroys all state held for the connection. Called exactly once,
    /// during teardown.
    fn destroy(&self, id: ConnectionId) -> CollabFuture<'_>;
}

/// Resolves the opaque user identifier for a connection, if any.
///
/// Identity does not change over a connection's lifetime; the core
/// resolves at most once and memoizes the answer.
pub trait IdentityResolver: Send + Sync + 'static {
    fn resolve(&self, identifier_field: &str) -> Option<String>;
}

/// Handles to the external collaborators a connection talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub data_store: Arc<dyn DataStore>,
    pub identity: Arc<dyn IdentityResolver>,
}
