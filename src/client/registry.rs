//! Client registry
//!
//! Tracks connected clients so the server can enforce `max_clients`.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

/// Registry of connected peer addresses
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<HashSet<SocketAddr>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `addr` unless `max_clients` are already connected.
    ///
    /// The returned guard unregisters the client when dropped.
    pub fn try_register(
        self: &Arc<Self>,
        addr: SocketAddr,
        max_clients: usize,
    ) -> Option<RegistrationGuard> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if clients.len() >= max_clients {
            return None;
        }
        clients.insert(addr);
        Some(RegistrationGuard {
            registry: Arc::clone(self),
            addr,
        })
    }

    pub fn len(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, addr: &SocketAddr) {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(addr);
    }
}

/// Keeps a client registered for as long as it lives.
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: Arc<ClientRegistry>,
    addr: SocketAddr,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.addr);
    }
}
