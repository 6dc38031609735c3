//! Timer pump tasks.
//!
//! Pumps only submit commands to the connection actor; they never touch
//! connection state directly. Cancellation is idempotent and a tick
//! from a cancelled pump that is already in flight is dropped by the
//! actor's epoch and state checks.

pub(crate) mod auth;
pub(crate) mod heartbeat;
