//! JSON-over-UDP development transport.
//!
//! One JSON [`Query`] per datagram, one JSON [`Response`] sent back to the sender.
//! Datagrams that do not decode are dropped.

use super::{Endpoint, Transport};
use crate::error::{AgentError, BindError};
use crate::processor::{Query, RequestProcessor, Response};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

const MAX_DATAGRAM: usize = 65_507;

#[derive(Debug, Clone)]
pub struct UdpJsonTransport {
    /// How often the receive loop checks for shutdown
    poll_interval: Duration,
}

impl UdpJsonTransport {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for UdpJsonTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl Transport for UdpJsonTransport {
    fn name(&self) -> &'static str {
        "udp-json"
    }

    fn bind(
        &self,
        addr: SocketAddr,
        processor: Arc<RequestProcessor>,
    ) -> Result<Box<dyn Endpoint>, BindError> {
        let io_err = |source: std::io::Error| BindError::Io {
            address: addr.to_string(),
            source,
        };

        let socket = UdpSocket::bind(addr).map_err(io_err)?;
        socket
            .set_read_timeout(Some(self.poll_interval))
            .map_err(io_err)?;
        let local_addr = socket.local_addr().map_err(io_err)?;

        let running = Arc::new(AtomicBool::new(true));
        let loop_running = running.clone();
        let poll_interval = self.poll_interval;
        let worker = std::thread::Builder::new()
            .name("mibd-udp".to_string())
            .spawn(move || serve(socket, processor, loop_running, poll_interval))
            .map_err(io_err)?;

        info!(address = %local_addr, "UDP responder bound");
        Ok(Box::new(UdpEndpoint {
            local_addr,
            running,
            worker: Some(worker),
        }))
    }
}

/// Pause before the next receive after `error`; `None` for the read-timeout poll
fn recv_backoff(error: &std::io::Error, poll_interval: Duration) -> Option<Duration> {
    match error.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => None,
        _ => Some(poll_interval),
    }
}

fn serve(
    socket: UdpSocket,
    processor: Arc<RequestProcessor>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while running.load(Ordering::SeqCst) {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) => {
                if let Some(pause) = recv_backoff(&e, poll_interval) {
                    warn!(error = %e, "UDP receive failed");
                    std::thread::sleep(pause);
                }
                continue;
            }
        };

        let query: Query = match serde_json::from_slice(&buf[..len]) {
            Ok(query) => query,
            Err(e) => {
                debug!(%peer, error = %e, "Dropping undecodable datagram");
                continue;
            }
        };

        let response = processor.process(&query);
        match serde_json::to_vec(&response) {
            Ok(bytes) => {
                if let Err(e) = socket.send_to(&bytes, peer) {
                    warn!(%peer, error = %e, "Failed to send response");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode response"),
        }
    }
    debug!("UDP receive loop exited");
}

struct UdpEndpoint {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Endpoint for UdpEndpoint {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn is_listening(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self
                .worker
                .as_ref()
                .map(|w| !w.is_finished())
                .unwrap_or(false)
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            // The socket is owned by the loop, so joining releases the port
            if worker.join().is_err() {
                warn!(address = %self.local_addr, "UDP receive loop panicked");
            }
            info!(address = %self.local_addr, "UDP responder closed");
        }
    }
}

impl Drop for UdpEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

/// Blocking client for the JSON-over-UDP transport
pub struct UdpJsonClient {
    socket: UdpSocket,
    target: SocketAddr,
    next_request_id: AtomicI32,
}

impl UdpJsonClient {
    pub fn connect(target: SocketAddr, timeout: Duration) -> Result<Self, AgentError> {
        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_read_timeout(Some(timeout))?;
        socket.connect(target)?;
        Ok(Self {
            socket,
            target,
            next_request_id: AtomicI32::new(1),
        })
    }

    /// Send `query` with a fresh request id and wait for the matching response
    pub fn request(&self, query: Query) -> Result<Response, AgentError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let query = query.with_request_id(request_id);
        let bytes = serde_json::to_vec(&query)
            .map_err(|e| AgentError::Transport(format!("Failed to encode query: {}", e)))?;
        self.socket.send(&bytes)?;

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let len = self.socket.recv(&mut buf).map_err(|e| match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                    AgentError::Transport(format!("No response from {}", self.target))
                }
                _ => AgentError::Io(e),
            })?;
            let response: Response = serde_json::from_slice(&buf[..len]).map_err(|e| {
                AgentError::Transport(format!("Malformed response from {}: {}", self.target, e))
            })?;
            // Late answers to earlier requests are skipped
            if response.request_id == request_id {
                return Ok(response);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessPolicy, AccessRule};
    use crate::mib::object::ManagedObject;
    use crate::mib::registry::MibRegistry;
    use crate::mib::value::ScalarValue;
    use crate::oid::Oid;
    use crate::processor::RequestResult;

    fn processor() -> Arc<RequestProcessor> {
        let mut registry = MibRegistry::new();
        registry
            .register(
                "",
                ManagedObject::constant(Oid::from([1, 3, 0]), ScalarValue::Integer(3)),
            )
            .unwrap();
        let policy = AccessPolicy::new(vec![AccessRule::new("public").read(Oid::root())]);
        Arc::new(RequestProcessor::new(
            registry.into_shared(),
            "",
            Arc::new(policy),
        ))
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn test_round_trip_and_close_releases_port() {
        let transport = UdpJsonTransport::new(Duration::from_millis(20));
        let mut endpoint = transport.bind(loopback(), processor()).unwrap();
        assert!(endpoint.is_listening());
        let addr = endpoint.local_addr();

        let client = UdpJsonClient::connect(addr, Duration::from_secs(2)).unwrap();
        let response = client
            .request(Query::get_next("public", [Oid::from([1])]))
            .unwrap();
        assert_eq!(
            response.results,
            vec![RequestResult::Value {
                oid: Oid::from([1, 3, 0]),
                value: ScalarValue::Integer(3)
            }]
        );

        endpoint.close();
        assert!(!endpoint.is_listening());
        endpoint.close();

        // Same port can be bound again right away
        let mut again = transport.bind(addr, processor()).unwrap();
        assert_eq!(again.local_addr(), addr);
        again.close();
    }

    #[test]
    fn test_bind_conflict_is_io_error() {
        let transport = UdpJsonTransport::default();
        let mut first = transport.bind(loopback(), processor()).unwrap();
        let err = transport
            .bind(first.local_addr(), processor())
            .err()
            .unwrap();
        assert!(matches!(err, BindError::Io { .. }));
        first.close();
    }

    #[test]
    fn test_garbage_is_ignored() {
        let transport = UdpJsonTransport::new(Duration::from_millis(20));
        let mut endpoint = transport.bind(loopback(), processor()).unwrap();
        let addr = endpoint.local_addr();

        let raw = UdpSocket::bind(loopback()).unwrap();
        raw.send_to(b"\x30\x26\x02\x01", addr).unwrap();

        let client = UdpJsonClient::connect(addr, Duration::from_secs(2)).unwrap();
        let response = client
            .request(Query::get("public", [Oid::from([1, 3, 0])]))
            .unwrap();
        assert_eq!(response.results[0].value(), Some(&ScalarValue::Integer(3)));
        endpoint.close();
    }

    #[test]
    fn test_receive_errors_back_off() {
        let poll = Duration::from_millis(20);
        let timeout = std::io::Error::from(ErrorKind::WouldBlock);
        assert_eq!(recv_backoff(&timeout, poll), None);
        let timeout = std::io::Error::from(ErrorKind::TimedOut);
        assert_eq!(recv_backoff(&timeout, poll), None);

        let refused = std::io::Error::from(ErrorKind::ConnectionReset);
        assert_eq!(recv_backoff(&refused, poll), Some(poll));
        let other = std::io::Error::new(ErrorKind::Other, "socket gone");
        assert_eq!(recv_backoff(&other, poll), Some(poll));
    }

    #[test]
    fn test_malformed_binding_still_gets_a_response() {
        let transport = UdpJsonTransport::new(Duration::from_millis(20));
        let mut endpoint = transport.bind(loopback(), processor()).unwrap();
        let addr = endpoint.local_addr();

        let raw = UdpSocket::bind(loopback()).unwrap();
        raw.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let datagram = br#"{"request_id":5,"operation":"get","community":"public","bindings":[{"oid":"1..3"},{"oid":"1.3.0"}]}"#;
        raw.send_to(datagram, addr).unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, _) = raw.recv_from(&mut buf).unwrap();
        let response: Response = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(response.request_id, 5);
        assert_eq!(
            response.results,
            vec![
                RequestResult::NoSuchObject { oid: Oid::root() },
                RequestResult::Value {
                    oid: Oid::from([1, 3, 0]),
                    value: ScalarValue::Integer(3),
                },
            ]
        );
        endpoint.close();
    }
}
