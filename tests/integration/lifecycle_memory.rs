use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mibd::config::{AgentConfig, MemoryPreferences};
use mibd::mib::modules::{MibModule, Modules, SampleMib, SYSTEM_BASE};
use mibd::processor::Query;
use mibd::telemetry::StaticProbe;
use mibd::transport::MemoryTransport;
use mibd::{
    AgentError, LifecycleController, LifecycleState, ManagedObject, Oid, RegistryError,
    RequestResult, ScalarValue,
};

fn config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.agent.bind_address = "127.0.0.1".to_string();
    config.agent.settle_delay_ms = 20;
    config.agent.sample_object = true;
    config
}

fn standard(transport: &MemoryTransport) -> LifecycleController {
    LifecycleController::new(
        config(),
        Arc::new(transport.clone()),
        Arc::new(StaticProbe::default()),
        Arc::new(MemoryPreferences::new()),
    )
}

/// Registers one object that collides with sysDescr
struct Colliding;

impl MibModule for Colliding {
    fn name(&self) -> &'static str {
        "colliding"
    }

    fn objects(&self) -> Vec<ManagedObject> {
        vec![ManagedObject::constant(
            Oid::new(SYSTEM_BASE.to_vec()).append(&[1, 0]),
            ScalarValue::OctetString("duplicate".into()),
        )]
    }
}

#[test]
fn restart_builds_a_fresh_registry() {
    let transport = MemoryTransport::new();
    let agent = standard(&transport);
    agent.start().unwrap();

    let oid = SampleMib::oid();
    let set = Query::set("blackjack007", [(oid.clone(), ScalarValue::Integer(41))]);
    let response = transport.dispatch(&set).unwrap();
    assert_eq!(response.results[0].value(), Some(&ScalarValue::Integer(41)));

    let first = agent.processor().unwrap();
    agent.restart().unwrap();
    let second = agent.processor().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    // Volatile state does not survive the restart
    let response = transport
        .dispatch(&Query::get("blackjack", [oid]))
        .unwrap();
    assert_eq!(response.results[0].value(), Some(&ScalarValue::Integer(0)));

    // The old registry was emptied on stop
    assert_eq!(first.registry().read().len(""), 0);
    agent.stop().unwrap();
}

#[test]
fn duplicate_registration_aborts_start() {
    let transport = MemoryTransport::new();
    let probe = Arc::new(StaticProbe::default());
    let agent = LifecycleController::with_modules(config(), Arc::new(transport.clone()), move || {
        Modules::standard(&config(), probe.clone(), Arc::new(MemoryPreferences::new()))
            .with(Colliding)
    });

    let err = agent.start().unwrap_err();
    assert!(matches!(
        err,
        AgentError::Registry(RegistryError::DuplicateIdentifier { .. })
    ));
    assert_eq!(agent.state(), LifecycleState::Stopped);
    assert_eq!(transport.bind_count(), 0);
    assert!(agent.processor().is_none());
}

#[test]
fn queries_during_stop_never_see_half_torn_state() {
    let transport = MemoryTransport::new();
    let agent = standard(&transport);
    agent.start().unwrap();

    let answered = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        scope.spawn(|| {
            for _ in 0..200 {
                let query = Query::get_next("blackjack", [Oid::from([1])]);
                if let Some(response) = transport.dispatch(&query) {
                    assert!(matches!(
                        response.results[0],
                        RequestResult::Value { .. } | RequestResult::EndOfTree
                    ));
                    answered.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        scope.spawn(|| {
            std::thread::sleep(Duration::from_millis(2));
            agent.stop().unwrap();
        });
    });

    assert_eq!(agent.state(), LifecycleState::Stopped);
    assert!(transport
        .dispatch(&Query::get("blackjack", [Oid::from([1])]))
        .is_none());
}

#[test]
fn repeated_cycles_leave_one_binding() {
    let transport = MemoryTransport::new();
    let agent = standard(&transport);
    for _ in 0..3 {
        agent.start().unwrap();
        assert!(transport.is_bound());
        agent.stop().unwrap();
        assert!(!transport.is_bound());
    }
    assert_eq!(transport.bind_count(), 3);
}
