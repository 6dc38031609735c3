//! Per-connection configuration.

use std::time::Duration;

use eventline_protocol::constants::{AUTH_GRACE_PERIOD, DEFAULT_HEARTBEAT_INTERVAL};

/// Configuration for a single connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Interval between heartbeat pings.
    pub heartbeat_interval: Duration,
    /// Window after open during which `authenticate` must be called.
    pub auth_grace_period: Duration,
    /// Whether the auth watchdog is armed at open. When `false` the
    /// connection opens straight into [`LifecycleState::Open`].
    ///
    /// [`LifecycleState::Open`]: crate::LifecycleState::Open
    pub require_auth: bool,
    /// Field name handed to the identity resolver.
    pub user_identifier_field: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            auth_grace_period: AUTH_GRACE_PERIOD,
            require_auth: true,
            user_identifier_field: "id".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_protocol_constants() {
        let config = ConnectionConfig::default();
        assert_eq!(config.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(config.auth_grace_period, AUTH_GRACE_PERIOD);
        assert!(config.require_auth);
        assert_eq!(config.user_identifier_field, "id");
    }
}
