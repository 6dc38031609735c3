//! Transport adapter registry and request descriptors.
//!
//! Incoming upgrade requests are matched against transport variants
//! registered explicitly at startup; selection picks the first adapter
//! that accepts the request, in registration order.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tracing::debug;

use crate::ConnectionError;

/// Snapshot of an incoming upgrade request.
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    path: String,
    /// Header names are stored lowercased and matched case-insensitively.
    headers: HashMap<String, String>,
}

impl RequestDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }

    /// Best-effort client address from the `X-Forwarded-For` header.
    ///
    /// Takes the first (client-most) hop of the chain. The header is
    /// untrusted data; garbage or absence yields `None`, never an error.
    pub fn forwarded_ip(&self) -> Option<IpAddr> {
        self.header("x-forwarded-for")?
            .split(',')
            .next()?
            .trim()
            .parse()
            .ok()
    }
}

/// A transport variant that can claim incoming requests.
pub trait TransportAdapter: Send + Sync + 'static {
    /// Returns `true` if this adapter can serve the request.
    fn accepts(&self, request: &RequestDescriptor) -> bool;

    /// Adapter name, for logs.
    fn name(&self) -> &'static str;
}

/// Registry of transport adapters, populated explicitly at startup.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn TransportAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter. Selection order is registration order.
    pub fn register(&mut self, adapter: Arc<dyn TransportAdapter>) {
        self.adapters.push(adapter);
    }

    /// Picks the first registered adapter that accepts the request.
    pub fn select(
        &self,
        request: &RequestDescriptor,
    ) -> Result<Arc<dyn TransportAdapter>, ConnectionError> {
        for adapter in &self.adapters {
            if adapter.accepts(request) {
                debug!(adapter = adapter.name(), path = request.path(), "adapter selected");
                return Ok(Arc::clone(adapter));
            }
        }
        Err(ConnectionError::UnsupportedRequest)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HeaderAdapter {
        name: &'static str,
        header: &'static str,
    }

    impl TransportAdapter for HeaderAdapter {
        fn accepts(&self, request: &RequestDescriptor) -> bool {
            request.header(self.header).is_some()
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    struct AcceptAll(&'static str);

    impl TransportAdapter for AcceptAll {
        fn accepts(&self, _request: &RequestDescriptor) -> bool {
            true
        }

        fn name(&self) -> &'static str {
            self.0
        }
    }

    #[test]
    fn select_picks_first_match_in_registration_order() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(HeaderAdapter {
            name: "websocket",
            header: "upgrade",
        }));
        registry.register(Arc::new(AcceptAll("fallback")));

        let ws_request = RequestDescriptor::new("/events").with_header("Upgrade", "websocket");
        assert_eq!(registry.select(&ws_request).unwrap().name(), "websocket");

        let plain_request = RequestDescriptor::new("/events");
        assert_eq!(registry.select(&plain_request).unwrap().name(), "fallback");
    }

    #[test]
    fn select_fails_when_no_adapter_accepts() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(HeaderAdapter {
            name: "websocket",
            header: "upgrade",
        }));

        let request = RequestDescriptor::new("/events");
        assert!(matches!(
            registry.select(&request),
            Err(ConnectionError::UnsupportedRequest)
        ));
    }

    #[test]
    fn empty_registry_rejects_everything() {
        let registry = AdapterRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.select(&RequestDescriptor::new("/")).is_err());
    }

    #[test]
    fn headers_match_case_insensitively() {
        let request = RequestDescriptor::new("/").with_header("X-Forwarded-For", "10.0.0.1");
        assert_eq!(request.header("x-forwarded-for"), Some("10.0.0.1"));
        assert_eq!(request.header("X-FORWARDED-FOR"), Some("10.0.0.1"));
    }

    #[test]
    fn forwarded_ip_takes_first_hop() {
        let request = RequestDescriptor::new("/")
            .with_header("X-Forwarded-For", "203.0.113.7, 10.0.0.1, 172.16.0.1");
        assert_eq!(request.forwarded_ip(), Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn forwarded_ip_trims_whitespace() {
        let request = RequestDescriptor::new("/").with_header("X-Forwarded-For", "  192.0.2.4 ");
        assert_eq!(request.forwarded_ip(), Some("192.0.2.4".parse().unwrap()));
    }

    #[test]
    fn forwarded_ip_parses_ipv6() {
        let request = RequestDescriptor::new("/").with_header("X-Forwarded-For", "2001:db8::1");
        assert_eq!(request.forwarded_ip(), Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn forwarded_ip_absent_or_garbage_is_none() {
        assert_eq!(RequestDescriptor::new("/").forwarded_ip(), None);

        let request = RequestDescriptor::new("/").with_header("X-Forwarded-For", "not-an-ip");
        assert_eq!(request.forwarded_ip(), None);
    }
}
