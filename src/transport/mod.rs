//! Transport boundary between the network and the request processor.
//!
//! A [`Transport`] binds an address and feeds decoded queries to a processor; the
//! returned [`Endpoint`] is the handle the lifecycle controller closes on stop.

pub mod memory;
pub mod udp;

pub use memory::MemoryTransport;
pub use udp::{UdpJsonClient, UdpJsonTransport};

use crate::error::BindError;
use crate::processor::RequestProcessor;
use std::net::SocketAddr;
use std::sync::Arc;

/// Factory for listening endpoints
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Bind `addr` and start answering queries with `processor`
    fn bind(
        &self,
        addr: SocketAddr,
        processor: Arc<RequestProcessor>,
    ) -> Result<Box<dyn Endpoint>, BindError>;
}

/// A bound, possibly listening, endpoint
pub trait Endpoint: Send + Sync {
    fn local_addr(&self) -> SocketAddr;

    fn is_listening(&self) -> bool;

    /// Stop answering and release the address. Idempotent; returns once released.
    fn close(&mut self);
}
