//! In-process transport for tests and embedding.

use super::{Endpoint, Transport};
use crate::error::BindError;
use crate::processor::{Query, RequestProcessor, Response};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Shared {
    /// Endpoint id and processor of the live binding
    bound: Mutex<Option<(usize, SocketAddr, Arc<RequestProcessor>)>>,
    binds: AtomicUsize,
    fail_next_bind: AtomicBool,
    not_listening: AtomicBool,
    bind_delay: Mutex<Duration>,
}

/// Transport that "binds" an address inside the process
///
/// Clones share state, so a test can keep one handle and give another to the
/// controller. Only one endpoint can be bound at a time, like a real port.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next bind attempt fail
    pub fn fail_next_bind(&self) {
        self.shared.fail_next_bind.store(true, Ordering::SeqCst);
    }

    /// Endpoints bound from now on report they are not listening
    pub fn set_not_listening(&self, not_listening: bool) {
        self.shared.not_listening.store(not_listening, Ordering::SeqCst);
    }

    /// Hold every bind for `delay`, widening the window a transition spends in Starting
    pub fn set_bind_delay(&self, delay: Duration) {
        *self.shared.bind_delay.lock() = delay;
    }

    /// Successful binds so far
    pub fn bind_count(&self) -> usize {
        self.shared.binds.load(Ordering::SeqCst)
    }

    pub fn is_bound(&self) -> bool {
        self.shared.bound.lock().is_some()
    }

    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.shared.bound.lock().as_ref().map(|(_, addr, _)| *addr)
    }

    /// Hand `query` to the bound processor, as if it arrived over the network
    pub fn dispatch(&self, query: &Query) -> Option<Response> {
        let processor = self
            .shared
            .bound
            .lock()
            .as_ref()
            .map(|(_, _, processor)| processor.clone())?;
        Some(processor.process(query))
    }
}

impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn bind(
        &self,
        addr: SocketAddr,
        processor: Arc<RequestProcessor>,
    ) -> Result<Box<dyn Endpoint>, BindError> {
        let delay = *self.shared.bind_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        if self.shared.fail_next_bind.swap(false, Ordering::SeqCst) {
            return Err(BindError::Refused(format!("{} (injected failure)", addr)));
        }

        let mut bound = self.shared.bound.lock();
        if bound.is_some() {
            return Err(BindError::Io {
                address: addr.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
            });
        }

        let id = self.shared.binds.fetch_add(1, Ordering::SeqCst) + 1;
        let local_addr = if addr.port() == 0 {
            SocketAddr::new(addr.ip(), 40_000 + (id % 20_000) as u16)
        } else {
            addr
        };
        *bound = Some((id, local_addr, processor));

        Ok(Box::new(MemoryEndpoint {
            id,
            local_addr,
            listening: !self.shared.not_listening.load(Ordering::SeqCst),
            shared: self.shared.clone(),
            closed: false,
        }))
    }
}

struct MemoryEndpoint {
    id: usize,
    local_addr: SocketAddr,
    listening: bool,
    shared: Arc<Shared>,
    closed: bool,
}

impl Endpoint for MemoryEndpoint {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn is_listening(&self) -> bool {
        self.listening && !self.closed
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut bound = self.shared.bound.lock();
        if matches!(bound.as_ref(), Some((id, _, _)) if *id == self.id) {
            *bound = None;
        }
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}
