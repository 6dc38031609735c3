//! Process-wide protocol constants.

use std::time::Duration;

/// Default interval between heartbeat pings.
///
/// Overridable per connection; the pong for each ping must arrive
/// before the next tick or the connection is torn down.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Grace period after open during which a connection must authenticate.
pub const AUTH_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Per-connection command buffer capacity.
///
/// Timer ticks, inbound payloads and outbound enqueues all share this
/// channel; a small buffer would make `enqueue` back-pressure the
/// dispatcher during a slow flush. 256 gives comfortable headroom.
pub const COMMAND_BUFFER_SIZE: usize = 256;

/// Lifecycle event emitted when a connection opens.
pub const EVENT_OPENED: &str = "connection_opened";

/// Lifecycle event emitted when a connection closes.
pub const EVENT_CLOSED: &str = "connection_closed";

/// Lifecycle event emitted on the error path, always followed by
/// [`EVENT_CLOSED`].
pub const EVENT_ERROR: &str = "connection_error";

/// Liveness probe event, delivered outbound past the queue.
pub const EVENT_PING: &str = "ping";
