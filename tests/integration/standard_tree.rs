use std::sync::Arc;

use mibd::config::{AgentConfig, MemoryPreferences, TomlPreferences};
use mibd::mib::modules::{Modules, SampleMib, AGENT_OBJECT_ID, DEVICE_BASE, SYSTEM_BASE};
use mibd::telemetry::{Metric, StaticProbe};
use mibd::{AccessPolicy, MibRegistry, Oid, RequestProcessor, RequestResult, ScalarValue};
use tempfile::TempDir;

fn processor_for(config: &AgentConfig, modules: Modules) -> RequestProcessor {
    let mut registry = MibRegistry::new();
    modules
        .register_all(&mut registry, &config.agent.context)
        .unwrap();
    let policy = AccessPolicy::from_communities(
        &config.communities.get,
        &config.communities.set,
        &config.communities.trap,
        config.view_root().unwrap(),
    );
    RequestProcessor::new(
        registry.into_shared(),
        config.agent.context.clone(),
        Arc::new(policy),
    )
}

fn oids(results: &[RequestResult]) -> Vec<Oid> {
    results.iter().filter_map(|r| r.oid().cloned()).collect()
}

#[test]
fn full_walk_visits_every_standard_object_in_order() {
    let config = AgentConfig::default();
    let probe = Arc::new(StaticProbe::default());
    let modules = Modules::standard(&config, probe, Arc::new(MemoryPreferences::new()));
    let processor = processor_for(&config, modules);

    let results = processor.walk("blackjack", &Oid::from([1]));
    assert_eq!(results.len(), 34);
    assert!(results
        .iter()
        .all(|r| matches!(r, RequestResult::Value { .. })));

    let walked = oids(&results);
    assert!(walked.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(walked[0], Oid::new(SYSTEM_BASE.to_vec()).append(&[1, 0]));
    assert_eq!(
        walked[33],
        Oid::new(DEVICE_BASE.to_vec()).append(&[10, 5, 0])
    );

    // The step after the last object ends the tree
    assert_eq!(
        processor.get_next("blackjack", &walked[33]),
        RequestResult::EndOfTree
    );
    assert_eq!(
        processor.get("blackjack", &Oid::new(SYSTEM_BASE.to_vec()).append(&[2, 0])),
        RequestResult::Value {
            oid: Oid::new(SYSTEM_BASE.to_vec()).append(&[2, 0]),
            value: ScalarValue::ObjectIdentifier(Oid::new(AGENT_OBJECT_ID.to_vec())),
        }
    );
}

#[test]
fn full_walk_from_zero_under_default_view() {
    let config = AgentConfig::default();
    let probe = Arc::new(StaticProbe::default());
    let modules = Modules::standard(&config, probe, Arc::new(MemoryPreferences::new()));
    let processor = processor_for(&config, modules);

    assert_eq!(
        processor.get_next("blackjack", &Oid::zero()),
        RequestResult::Value {
            oid: Oid::new(SYSTEM_BASE.to_vec()).append(&[1, 0]),
            value: ScalarValue::OctetString(
                "mibd - Fieldline TR-400 - Linux 6.1.57 (API 601) - Battery: 87% - Network: WIFI"
                    .to_string()
            ),
        }
    );

    let results = processor.walk("blackjack", &Oid::zero());
    assert_eq!(results.len(), 34);
    assert!(results
        .iter()
        .all(|r| matches!(r, RequestResult::Value { .. })));
    assert_eq!(
        oids(&results),
        oids(&processor.walk("blackjack", &Oid::from([1])))
    );
    assert!(processor.walk("public", &Oid::zero()).is_empty());
}

#[test]
fn broken_sensor_only_affects_its_own_objects() {
    let config = AgentConfig::default();
    let probe = Arc::new(StaticProbe::default());
    probe.fail(Metric::Battery);
    let modules = Modules::standard(&config, probe.clone(), Arc::new(MemoryPreferences::new()));
    let processor = processor_for(&config, modules);

    let results = processor.walk("blackjack", &Oid::from([1]));
    assert_eq!(results.len(), 34);
    let missing: Vec<Oid> = results
        .iter()
        .filter_map(|r| match r {
            RequestResult::NoSuchObject { oid } => Some(oid.clone()),
            _ => None,
        })
        .collect();
    let battery = Oid::new(DEVICE_BASE.to_vec()).append(&[4]);
    assert_eq!(missing.len(), 4);
    assert!(missing.iter().all(|oid| battery.is_prefix_of(oid)));

    probe.recover(Metric::Battery);
    let level = battery.append(&[1, 0]);
    assert_eq!(
        processor.get("blackjack", &level).value(),
        Some(&ScalarValue::Integer(87))
    );
}

#[test]
fn sample_object_round_trips_through_set_community() {
    let mut config = AgentConfig::default();
    config.agent.sample_object = true;
    let modules = Modules::standard(
        &config,
        Arc::new(StaticProbe::default()),
        Arc::new(MemoryPreferences::new()),
    );
    let processor = processor_for(&config, modules);
    assert_eq!(processor.walk("blackjack", &Oid::from([1])).len(), 35);

    let oid = SampleMib::oid();
    assert_eq!(
        processor.set("blackjack", &oid, Some(ScalarValue::Integer(9))),
        RequestResult::AccessDenied
    );
    assert_eq!(
        processor.set("blackjack007", &oid, Some(ScalarValue::Integer(9))),
        RequestResult::Value {
            oid: oid.clone(),
            value: ScalarValue::Integer(9)
        }
    );
    assert_eq!(
        processor.get("blackjack", &oid).value(),
        Some(&ScalarValue::Integer(9))
    );
    assert_eq!(
        processor.get("nobody", &oid),
        RequestResult::AccessDenied
    );
}

#[test]
fn system_location_persists_across_agent_instances() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("preferences.toml");
    let config = AgentConfig::default();
    let location = Oid::new(SYSTEM_BASE.to_vec()).append(&[6, 0]);

    {
        let preferences = Arc::new(TomlPreferences::open(&path).unwrap());
        let modules = Modules::standard(&config, Arc::new(StaticProbe::default()), preferences);
        let processor = processor_for(&config, modules);
        assert_eq!(
            processor.get("blackjack", &location).value(),
            Some(&ScalarValue::OctetString("Location not configured".into()))
        );
        let result = processor.set(
            "blackjack007",
            &location,
            Some(ScalarValue::OctetString("Rack 12".into())),
        );
        assert!(matches!(result, RequestResult::Value { .. }));
    }

    let preferences = Arc::new(TomlPreferences::open(&path).unwrap());
    let modules = Modules::standard(&config, Arc::new(StaticProbe::default()), preferences);
    let processor = processor_for(&config, modules);
    assert_eq!(
        processor.get("blackjack", &location).value(),
        Some(&ScalarValue::OctetString("Rack 12".into()))
    );
}
