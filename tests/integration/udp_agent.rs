use std::sync::Arc;
use std::time::Duration;

use mibd::config::{AgentConfig, MemoryPreferences};
use mibd::mib::modules::SYSTEM_BASE;
use mibd::processor::Query;
use mibd::telemetry::StaticProbe;
use mibd::transport::{UdpJsonClient, UdpJsonTransport};
use mibd::{LifecycleController, Oid, RequestResult, ScalarValue};

fn free_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

#[test]
fn agent_answers_over_udp_and_releases_port_on_stop() {
    let mut config = AgentConfig::default();
    config.agent.bind_address = "127.0.0.1".to_string();
    config.agent.port = free_port();
    config.agent.settle_delay_ms = 0;

    let agent = LifecycleController::new(
        config,
        Arc::new(UdpJsonTransport::new(Duration::from_millis(20))),
        Arc::new(StaticProbe::default()),
        Arc::new(MemoryPreferences::new()),
    );
    agent.start().unwrap();
    let addr = agent.local_addr().unwrap();

    let client = UdpJsonClient::connect(addr, Duration::from_secs(2)).unwrap();
    let services = Oid::new(SYSTEM_BASE.to_vec()).append(&[7, 0]);
    let response = client
        .request(Query::get("blackjack", [services.clone(), Oid::from([1, 3, 9, 9])]))
        .unwrap();
    assert_eq!(
        response.results,
        vec![
            RequestResult::Value {
                oid: services,
                value: ScalarValue::Integer(64)
            },
            RequestResult::NoSuchObject {
                oid: Oid::from([1, 3, 9, 9])
            },
        ]
    );

    let denied = client
        .request(Query::get("intruder", [Oid::from([1, 3, 6, 1, 2, 1, 1, 1, 0])]))
        .unwrap();
    assert_eq!(denied.results, vec![RequestResult::AccessDenied]);

    agent.restart().unwrap();
    assert_eq!(agent.local_addr(), Some(addr));
    let response = client
        .request(Query::get_next("blackjack", [Oid::from([1])]))
        .unwrap();
    assert!(matches!(response.results[0], RequestResult::Value { .. }));

    agent.stop().unwrap();
    // Port is free again once stop returns
    std::net::UdpSocket::bind(addr).unwrap();
}
