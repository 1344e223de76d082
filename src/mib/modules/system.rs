//! Standard system group (`1.3.6.1.2.1.1`).

use super::MibModule;
use crate::config::{
    PreferenceStore, SystemConfig, KEY_SYSTEM_CONTACT, KEY_SYSTEM_LOCATION, KEY_SYSTEM_NAME,
};
use crate::mib::object::{Access, ManagedObject, PreferenceSource};
use crate::mib::value::{ScalarKind, ScalarValue};
use crate::oid::Oid;
use crate::telemetry::{DeviceIdentity, DeviceProbe};
use std::sync::Arc;

/// `system` group root
pub const SYSTEM_BASE: [u32; 7] = [1, 3, 6, 1, 2, 1, 1];

/// Value of `sysObjectID.0`
pub const AGENT_OBJECT_ID: [u32; 11] = [1, 3, 6, 1, 4, 1, 5380, 1, 16, 0, 1];

/// Application-layer services bit
const SYS_SERVICES: i32 = 64;

pub struct SystemMib {
    probe: Arc<dyn DeviceProbe>,
    preferences: Arc<dyn PreferenceStore>,
    defaults: SystemConfig,
}

impl SystemMib {
    pub fn new(
        probe: Arc<dyn DeviceProbe>,
        preferences: Arc<dyn PreferenceStore>,
        defaults: SystemConfig,
    ) -> Self {
        Self {
            probe,
            preferences,
            defaults,
        }
    }

    fn oid(column: u32) -> Oid {
        Oid::from(SYSTEM_BASE).append(&[column, 0])
    }

    /// Configured name, else `<model>-<last 6 of serial>`
    fn default_name(&self) -> String {
        if let Some(name) = &self.defaults.name {
            return name.clone();
        }
        match self.probe.identity() {
            Ok(identity) => derive_name(&identity),
            Err(_) => "mibd-agent".to_string(),
        }
    }

    fn preference_object(&self, column: u32, key: &str, default: String) -> ManagedObject {
        ManagedObject::new(
            Self::oid(column),
            Access::ReadWrite,
            ScalarKind::OctetString,
            PreferenceSource::new(self.preferences.clone(), key, default),
        )
    }
}

impl MibModule for SystemMib {
    fn name(&self) -> &'static str {
        "system"
    }

    fn oids(&self) -> Vec<Oid> {
        (1..=7).map(Self::oid).collect()
    }

    fn objects(&self) -> Vec<ManagedObject> {
        let descr_probe = self.probe.clone();
        let uptime_probe = self.probe.clone();

        vec![
            ManagedObject::computed(Self::oid(1), ScalarKind::OctetString, move || {
                Ok(ScalarValue::OctetString(describe(descr_probe.as_ref())))
            }),
            ManagedObject::constant(
                Self::oid(2),
                ScalarValue::ObjectIdentifier(Oid::from(AGENT_OBJECT_ID)),
            ),
            ManagedObject::computed(Self::oid(3), ScalarKind::TimeTicks, move || {
                let uptime = uptime_probe.uptime()?;
                Ok(ScalarValue::ticks_from_millis(uptime.as_millis() as u64))
            }),
            self.preference_object(4, KEY_SYSTEM_CONTACT, self.defaults.contact.clone()),
            self.preference_object(5, KEY_SYSTEM_NAME, self.default_name()),
            self.preference_object(6, KEY_SYSTEM_LOCATION, self.defaults.location.clone()),
            ManagedObject::constant(Self::oid(7), ScalarValue::Integer(SYS_SERVICES)),
        ]
    }
}

fn derive_name(identity: &DeviceIdentity) -> String {
    let model = identity.model.split_whitespace().collect::<Vec<_>>().join("-");
    let serial = identity.serial.trim();
    if serial.is_empty() || serial.eq_ignore_ascii_case("unknown") {
        return format!("{}-Device", model);
    }
    let chars: Vec<char> = serial.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(6)..].iter().collect();
    format!("{}-{}", model, tail)
}

/// One-line device description, degrading gracefully when parts are unavailable
fn describe(probe: &dyn DeviceProbe) -> String {
    let identity = match probe.identity() {
        Ok(identity) => identity,
        Err(_) => return "mibd - Device Information Unavailable".to_string(),
    };

    let mut descr = format!(
        "mibd - {} {} - Linux {} (API {})",
        identity.manufacturer, identity.model, identity.os_version, identity.api_level
    );
    if let Ok(battery) = probe.battery() {
        if battery.level > 0 {
            descr.push_str(&format!(" - Battery: {}%", battery.level));
        }
    }
    if let Ok(network) = probe.network() {
        descr.push_str(&format!(" - Network: {}", network.kind));
    }
    descr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryPreferences;
    use crate::mib::registry::MibRegistry;
    use crate::error::ProviderError;
    use crate::telemetry::{
        BatteryInfo, CpuInfo, MemoryInfo, Metric, NetworkInfo, StaticProbe, StorageInfo,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn module(probe: Arc<StaticProbe>) -> (SystemMib, Arc<MemoryPreferences>) {
        let prefs = Arc::new(MemoryPreferences::new());
        (
            SystemMib::new(probe, prefs.clone(), SystemConfig::default()),
            prefs,
        )
    }

    fn read(registry: &MibRegistry, oid: &str) -> ScalarValue {
        registry
            .lookup_exact("", &Oid::parse(oid).unwrap())
            .unwrap()
            .read()
            .unwrap()
    }

    #[test]
    fn test_system_group_values() {
        let probe = Arc::new(StaticProbe::default());
        let (mib, _prefs) = module(probe);
        let mut registry = MibRegistry::new();
        assert_eq!(mib.register(&mut registry, "").unwrap(), 7);

        assert_eq!(
            read(&registry, "1.3.6.1.2.1.1.1.0"),
            ScalarValue::OctetString(
                "mibd - Fieldline TR-400 - Linux 6.1.57 (API 601) - Battery: 87% - Network: WIFI"
                    .to_string()
            )
        );
        assert_eq!(
            read(&registry, "1.3.6.1.2.1.1.2.0"),
            ScalarValue::ObjectIdentifier(Oid::parse("1.3.6.1.4.1.5380.1.16.0.1").unwrap())
        );
        assert_eq!(
            read(&registry, "1.3.6.1.2.1.1.3.0"),
            ScalarValue::TimeTicks(9_378_400)
        );
        assert_eq!(
            read(&registry, "1.3.6.1.2.1.1.5.0"),
            ScalarValue::OctetString("TR-400-L4K2Q9".to_string())
        );
        assert_eq!(read(&registry, "1.3.6.1.2.1.1.7.0"), ScalarValue::Integer(64));
    }

    #[test]
    fn test_description_degrades_without_identity() {
        let probe = Arc::new(StaticProbe::default());
        probe.fail(Metric::Identity);
        assert_eq!(
            describe(probe.as_ref()),
            "mibd - Device Information Unavailable"
        );
        probe.recover(Metric::Identity);
        probe.fail(Metric::Battery);
        assert!(!describe(probe.as_ref()).contains("Battery"));
    }

    #[test]
    fn test_location_is_writable_through_preferences() {
        let probe = Arc::new(StaticProbe::default());
        let (mib, prefs) = module(probe);
        let mut registry = MibRegistry::new();
        mib.register(&mut registry, "").unwrap();

        let oid = Oid::parse("1.3.6.1.2.1.1.6.0").unwrap();
        let object = registry.lookup_exact("", &oid).unwrap();
        assert!(object.is_writable());
        object
            .write(ScalarValue::OctetString("Rack 12".to_string()))
            .unwrap();
        assert_eq!(prefs.get(KEY_SYSTEM_LOCATION).as_deref(), Some("Rack 12"));
    }

    /// Counts identity reads and answers everything else from a [`StaticProbe`]
    #[derive(Default)]
    struct CountingIdentity {
        inner: StaticProbe,
        identity_reads: AtomicUsize,
    }

    impl DeviceProbe for CountingIdentity {
        fn memory(&self) -> Result<MemoryInfo, ProviderError> {
            self.inner.memory()
        }

        fn storage(&self) -> Result<StorageInfo, ProviderError> {
            self.inner.storage()
        }

        fn battery(&self) -> Result<BatteryInfo, ProviderError> {
            self.inner.battery()
        }

        fn network(&self) -> Result<NetworkInfo, ProviderError> {
            self.inner.network()
        }

        fn cpu(&self) -> Result<CpuInfo, ProviderError> {
            self.inner.cpu()
        }

        fn process_count(&self) -> Result<i32, ProviderError> {
            self.inner.process_count()
        }

        fn uptime(&self) -> Result<Duration, ProviderError> {
            self.inner.uptime()
        }

        fn identity(&self) -> Result<DeviceIdentity, ProviderError> {
            self.identity_reads.fetch_add(1, Ordering::SeqCst);
            self.inner.identity()
        }
    }

    #[test]
    fn test_unregister_does_not_rebuild_objects() {
        let probe = Arc::new(CountingIdentity::default());
        let mib = SystemMib::new(
            probe.clone(),
            Arc::new(MemoryPreferences::new()),
            SystemConfig::default(),
        );
        let mut registry = MibRegistry::new();
        mib.register(&mut registry, "").unwrap();
        let after_register = probe.identity_reads.load(Ordering::SeqCst);

        assert_eq!(mib.unregister(&mut registry, ""), 7);
        assert_eq!(probe.identity_reads.load(Ordering::SeqCst), after_register);
        assert_eq!(registry.len(""), 0);
    }

    #[test]
    fn test_fixed_oids_match_built_objects() {
        let (mib, _prefs) = module(Arc::new(StaticProbe::default()));
        let built: Vec<Oid> = mib.objects().iter().map(|o| o.oid().clone()).collect();
        assert_eq!(mib.oids(), built);
    }

    #[test]
    fn test_default_name_uses_model_and_serial_tail() {
        let mut identity = StaticProbe::default().identity;
        identity.model = "Field Tab  X2".to_string();
        identity.serial = "R58M41ABCDEF".to_string();
        assert_eq!(derive_name(&identity), "Field-Tab-X2-ABCDEF");

        identity.serial = "A1B2".to_string();
        assert_eq!(derive_name(&identity), "Field-Tab-X2-A1B2");

        identity.serial = "unknown".to_string();
        assert_eq!(derive_name(&identity), "Field-Tab-X2-Device");
    }

    #[test]
    fn test_configured_name_wins_over_derived() {
        let probe = Arc::new(CountingIdentity::default());
        let defaults = SystemConfig {
            name: Some("rack-12-tablet".to_string()),
            ..SystemConfig::default()
        };
        let mib = SystemMib::new(probe.clone(), Arc::new(MemoryPreferences::new()), defaults);
        assert_eq!(mib.default_name(), "rack-12-tablet");
        assert_eq!(probe.identity_reads.load(Ordering::SeqCst), 0);
    }
}
