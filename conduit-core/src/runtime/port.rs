use alloc::string::{String, ToString};
use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicUsize, Ordering};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Shared `(protocol, ip, port)` admission gate (§4.4/§5). The only
/// mutable state in this crate that is genuinely shared across worker
/// threads: counters via atomics, the listener set via a mutex, exactly
/// as §5's "Port counters" note specifies.
pub struct Port {
    key: String,
    num_connections: AtomicUsize,
    max_connections: AtomicUsize,
    listeners: Mutex<HashSet<u64>>,
}

impl Port {
    pub fn new(key: impl Into<String>, max_connections: usize) -> Arc<Self> {
        Arc::new(Self {
            key: key.into(),
            num_connections: AtomicUsize::new(0),
            max_connections: AtomicUsize::new(max_connections),
            listeners: Mutex::new(HashSet::new()),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn attach_listener(&self, listener_id: u64) {
        self.listeners.lock().unwrap().insert(listener_id);
    }

    pub fn detach_listener(&self, listener_id: u64) {
        self.listeners.lock().unwrap().remove(&listener_id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// `true` if a new inbound may be admitted right now. Called before
    /// starting an `accept` per §4.4 step 1.
    pub fn has_capacity(&self) -> bool {
        let max = self.max_connections.load(Ordering::Acquire);
        max == 0 || self.num_connections.load(Ordering::Acquire) < max
    }

    /// Record a newly admitted inbound. Returns `false` (and does not
    /// increment) if the port was already saturated by a racing acceptor
    /// on another listener, so the caller can back out the connection.
    pub fn try_admit(&self) -> bool {
        loop {
            let current = self.num_connections.load(Ordering::Acquire);
            let max = self.max_connections.load(Ordering::Acquire);
            if max != 0 && current >= max {
                return false;
            }
            if self
                .num_connections
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn release(&self) {
        self.num_connections.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn num_connections(&self) -> usize {
        self.num_connections.load(Ordering::Acquire)
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections.load(Ordering::Acquire)
    }

    pub fn set_max_connections(&self, max: usize) {
        self.max_connections.store(max, Ordering::Release);
    }
}

/// Process-wide `(protocol, ip, port)` → [`Port`] lookup (§4.4/§5's "Port
/// registry"), so every listener bound to the same key shares one set of
/// counters instead of each inventing its own. Held weakly: once every
/// listener on a key has dropped its `Arc<Port>`, the entry is free to be
/// recreated (with whatever cap the next `listen()` on that key asks for)
/// rather than pinning a stale `Port` forever.
#[derive(Default)]
pub struct PortRegistry {
    ports: Mutex<HashMap<String, Weak<Port>>>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shared `Port` for `key`, creating it with
    /// `max_connections` the first time this key is seen. A key that is
    /// still live keeps the cap it was created with — later callers just
    /// get a clone of the existing counters, matching §4.4's "a port is
    /// `(protocol, ip, port)`" identity (the cap belongs to the key, not
    /// to any one listener).
    pub fn get_or_create(&self, key: &str, max_connections: usize) -> Arc<Port> {
        let mut ports = self.ports.lock().unwrap();
        if let Some(existing) = ports.get(key).and_then(Weak::upgrade) {
            return existing;
        }
        let port = Port::new(key, max_connections);
        ports.insert(key.to_string(), Arc::downgrade(&port));
        port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_never_exceeds_cap() {
        let port = Port::new("tcp/0.0.0.0:8080", 2);
        assert!(port.try_admit());
        assert!(port.try_admit());
        assert!(!port.try_admit(), "third admission must be rejected at cap 2");
        port.release();
        assert!(port.try_admit(), "capacity frees up after a release");
    }

    #[test]
    fn zero_max_connections_means_unbounded() {
        let port = Port::new("tcp/0.0.0.0:8080", 0);
        for _ in 0..1000 {
            assert!(port.try_admit());
        }
    }

    #[test]
    fn registry_shares_one_port_across_repeated_lookups_of_the_same_key() {
        let registry = PortRegistry::new();
        let a = registry.get_or_create("tcp/127.0.0.1:9000", 2);
        let b = registry.get_or_create("tcp/127.0.0.1:9000", 99);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.max_connections(), 2, "the first caller's cap wins");
    }

    #[test]
    fn registry_gives_distinct_keys_distinct_ports() {
        let registry = PortRegistry::new();
        let a = registry.get_or_create("tcp/127.0.0.1:9000", 0);
        let b = registry.get_or_create("tcp/127.0.0.1:9001", 0);
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn registry_recreates_a_key_once_every_handle_is_dropped() {
        let registry = PortRegistry::new();
        let a = registry.get_or_create("tcp/127.0.0.1:9000", 5);
        drop(a);
        let b = registry.get_or_create("tcp/127.0.0.1:9000", 7);
        assert_eq!(b.max_connections(), 7);
    }

    #[test]
    fn listener_membership_tracks_attach_detach() {
        let port = Port::new("tcp/0.0.0.0:8080", 4);
        port.attach_listener(1);
        port.attach_listener(2);
        assert_eq!(port.listener_count(), 2);
        port.detach_listener(1);
        assert_eq!(port.listener_count(), 1);
    }
}
