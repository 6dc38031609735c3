//! Event types and protocol constants for the Eventline connection core.
//!
//! An [`Event`] is an immutable named occurrence with a JSON payload,
//! flowing inbound (decoded from the transport and handed to the
//! dispatcher) or outbound (buffered and flushed, or triggered directly,
//! toward the transport).

pub mod constants;
mod event;

pub use event::{ConnectionId, DecodeError, Event};
