use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU16, Ordering},
    },
};

use wirekite_protocol::RESET_REQUEST_ID;

use crate::{port::Port, sync::lock};

/// The configured ports of one device and its request id counter.
pub(crate) struct PortRegistry {
    ports: Mutex<HashMap<u16, Arc<Port>>>,
    last_request_id: AtomicU16,
}

impl PortRegistry {
    pub(crate) fn new() -> PortRegistry {
        PortRegistry {
            ports: Mutex::new(HashMap::new()),
            last_request_id: AtomicU16::new(0),
        }
    }

    /// Registers a newly configured port.
    ///
    /// A port still registered under the same id is stale: the board only reuses an id
    /// after it has been freed. The stale port is replaced and its readers are woken.
    pub(crate) fn add(&self, port: Port) -> Arc<Port> {
        let id = port.id();
        let port = Arc::new(port);
        let previous = lock(&self.ports).insert(id, port.clone());
        if let Some(previous) = previous {
            log::warn!("Port id {} reassigned, dropping the stale {}", id, previous.kind());
            previous.release();
        }
        port
    }

    pub(crate) fn get(&self, id: u16) -> Option<Arc<Port>> {
        lock(&self.ports).get(&id).cloned()
    }

    /// Removes `port` if it is still the one registered under its id.
    pub(crate) fn remove_port(&self, port: &Arc<Port>) -> bool {
        let removed = {
            let mut ports = lock(&self.ports);
            match ports.get(&port.id()) {
                Some(current) if Arc::ptr_eq(current, port) => ports.remove(&port.id()),
                _ => None,
            }
        };
        port.release();
        removed.is_some()
    }

    /// Removes all ports.
    pub(crate) fn clear(&self) {
        let ports: Vec<_> = lock(&self.ports).drain().map(|(_, port)| port).collect();
        for port in ports {
            port.release();
        }
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.ports).len()
    }

    /// Returns the next request id. Ids wrap around and skip 0 and [RESET_REQUEST_ID].
    pub(crate) fn next_request_id(&self) -> u16 {
        let mut current = self.last_request_id.load(Ordering::Relaxed);
        loop {
            let mut next = current.wrapping_add(1);
            if next == RESET_REQUEST_ID {
                next = 1;
            }
            match self.last_request_id.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::port::{Channel, EventQueue, PortKind};
    use std::{collections::HashSet, thread};

    #[test]
    fn add_get_remove() {
        let registry = PortRegistry::new();
        let port = registry.add(Port::new(4, Channel::DigitalOutput, 0));
        assert_eq!(registry.get(4).unwrap().kind(), PortKind::DigitalOutput);
        assert!(registry.get(5).is_none());
        assert!(registry.remove_port(&port));
        assert!(registry.get(4).is_none());
        assert!(!registry.remove_port(&port));
    }

    #[test]
    fn reused_port_id_replaces_stale_port() {
        let registry = PortRegistry::new();
        let stale = registry.add(Port::new(
            4,
            Channel::DigitalInputOnDemand(EventQueue::new(4)),
            0,
        ));
        registry.add(Port::new(4, Channel::PwmOutput, 0));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(4).unwrap().kind(), PortKind::PwmOutput);
        assert!(stale.queue().unwrap().take().is_err());
    }

    #[test]
    fn remove_port_keeps_newer_port() {
        let registry = PortRegistry::new();
        let old = registry.add(Port::new(4, Channel::DigitalOutput, 0));
        let new = registry.add(Port::new(4, Channel::PwmOutput, 0));
        assert!(!registry.remove_port(&old));
        assert_eq!(registry.get(4).unwrap().kind(), PortKind::PwmOutput);
        assert!(registry.remove_port(&new));
        assert!(registry.get(4).is_none());
    }

    #[test]
    fn clear_releases_queues() {
        let registry = PortRegistry::new();
        let port = registry.add(Port::new(
            2,
            Channel::DigitalInputOnDemand(EventQueue::new(4)),
            0,
        ));
        registry.add(Port::new(3, Channel::I2cMaster, 0));
        registry.clear();
        assert_eq!(registry.len(), 0);
        assert!(port.queue().unwrap().take().is_err());
    }

    #[test]
    fn request_ids_skip_reserved_values() {
        let registry = PortRegistry::new();
        registry.last_request_id.store(0xfffd, Ordering::Relaxed);
        assert_eq!(registry.next_request_id(), 0xfffe);
        assert_eq!(registry.next_request_id(), 1);
        assert_eq!(registry.next_request_id(), 2);
    }

    #[test]
    fn request_ids_unique_across_threads() {
        let registry = Arc::new(PortRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    (0..1000)
                        .map(|_| registry.next_request_id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(id != 0 && id != RESET_REQUEST_ID);
                assert!(seen.insert(id), "duplicate request id {}", id);
            }
        }
        assert_eq!(seen.len(), 8000);
    }
}
