//! Connection lifecycle core for Eventline.
//!
//! Manages one persistent bidirectional event connection: heartbeat
//! liveness, a bounded authentication grace period, outbound event
//! buffering with an atomic flush, and deterministic teardown through a
//! single error path.
//!
//! Byte-level transport I/O, event routing, identity resolution and
//! persistent storage are external collaborators reached through the
//! traits in [`collaborators`].

pub mod collaborators;
mod config;
mod connection;
mod pumps;
mod queue;
mod registry;

pub use config::ConnectionConfig;
pub use connection::{Connection, LifecycleState};
pub use queue::EventQueue;
pub use registry::{AdapterRegistry, RequestDescriptor, TransportAdapter};

/// Errors produced by the connection core.
///
/// The runtime variants (`Protocol`, `LivenessTimeout`, `AuthTimeout`)
/// all funnel through the connection's single error path and end in
/// teardown. `TransportSend` is logged and non-fatal. `InvalidTransition`
/// is a programmer error, returned loudly from the offending call.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("malformed inbound payload: {0}")]
    Protocol(String),

    #[error("heartbeat pong not received in time")]
    LivenessTimeout,

    #[error("authentication grace period elapsed")]
    AuthTimeout,

    #[error("transport send failed: {0}")]
    TransportSend(String),

    #[error("invalid state transition: {0}")]
    InvalidTransition(&'static str),

    #[error("no registered adapter accepts this request")]
    UnsupportedRequest,
}
