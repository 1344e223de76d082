//! Enterprise device group (`1.3.6.1.4.1.5380.1.16`) and the sample scalar.

use super::MibModule;
use crate::error::ProviderError;
use crate::mib::object::{Access, ManagedObject, VolatileSource};
use crate::mib::value::{ScalarKind, ScalarValue};
use crate::oid::Oid;
use crate::telemetry::DeviceProbe;
use std::sync::Arc;

/// Enterprise subtree root
pub const DEVICE_BASE: [u32; 9] = [1, 3, 6, 1, 4, 1, 5380, 1, 16];

fn device_oid(group: u32, column: u32) -> Oid {
    Oid::from(DEVICE_BASE).append(&[group, column, 0])
}

/// `(group, column)` of every device object, in registration order
#[rustfmt::skip]
const LAYOUT: [(u32, u32); 27] = [
    (2, 1), (2, 2), (2, 3), (2, 4),
    (3, 1), (3, 2), (3, 3), (3, 4),
    (4, 1), (4, 2), (4, 3), (4, 4),
    (5, 1), (5, 2), (5, 3), (5, 4), (5, 5),
    (6, 1), (6, 2), (6, 3),
    (7, 1), (7, 2),
    (10, 1), (10, 2), (10, 3), (10, 4), (10, 5),
];

/// Memory, storage, battery, network, CPU, process and identity metrics
pub struct DeviceMib {
    probe: Arc<dyn DeviceProbe>,
}

impl DeviceMib {
    pub fn new(probe: Arc<dyn DeviceProbe>) -> Self {
        Self { probe }
    }

    fn probed<F>(&self, group: u32, column: u32, kind: ScalarKind, f: F) -> ManagedObject
    where
        F: Fn(&dyn DeviceProbe) -> Result<ScalarValue, ProviderError> + Send + Sync + 'static,
    {
        let probe = self.probe.clone();
        ManagedObject::computed(device_oid(group, column), kind, move || f(probe.as_ref()))
    }
}

fn text(value: impl Into<String>) -> ScalarValue {
    ScalarValue::OctetString(value.into())
}

impl MibModule for DeviceMib {
    fn name(&self) -> &'static str {
        "device"
    }

    fn oids(&self) -> Vec<Oid> {
        LAYOUT
            .iter()
            .map(|&(group, column)| device_oid(group, column))
            .collect()
    }

    fn objects(&self) -> Vec<ManagedObject> {
        use ScalarKind::{Counter64, Integer, OctetString};
        use ScalarValue as V;

        vec![
            // .2 memory
            self.probed(2, 1, Counter64, |p| Ok(V::Counter64(p.memory()?.total))),
            self.probed(2, 2, Counter64, |p| Ok(V::Counter64(p.memory()?.available))),
            self.probed(2, 3, Counter64, |p| Ok(V::Counter64(p.memory()?.used()))),
            self.probed(2, 4, Integer, |p| Ok(V::Integer(p.memory()?.usage_percent()))),
            // .3 storage
            self.probed(3, 1, Counter64, |p| Ok(V::Counter64(p.storage()?.total))),
            self.probed(3, 2, Counter64, |p| Ok(V::Counter64(p.storage()?.available))),
            self.probed(3, 3, Counter64, |p| Ok(V::Counter64(p.storage()?.used()))),
            self.probed(3, 4, Integer, |p| Ok(V::Integer(p.storage()?.usage_percent()))),
            // .4 battery
            self.probed(4, 1, Integer, |p| Ok(V::Integer(p.battery()?.level))),
            self.probed(4, 2, Integer, |p| Ok(V::Integer(p.battery()?.temperature))),
            self.probed(4, 3, Integer, |p| Ok(V::Integer(p.battery()?.voltage))),
            self.probed(4, 4, OctetString, |p| Ok(text(p.battery()?.status.to_string()))),
            // .5 network
            self.probed(5, 1, OctetString, |p| Ok(text(p.network()?.kind))),
            self.probed(5, 2, OctetString, |p| Ok(text(p.network()?.ssid))),
            self.probed(5, 3, Integer, |p| Ok(V::Integer(p.network()?.signal))),
            self.probed(5, 4, OctetString, |p| Ok(text(p.network()?.ipv4))),
            self.probed(5, 5, OctetString, |p| Ok(text(p.network()?.mac))),
            // .6 cpu
            self.probed(6, 1, Integer, |p| Ok(V::Integer(p.cpu()?.cores))),
            self.probed(6, 2, Integer, |p| Ok(V::Integer(p.cpu()?.usage_percent))),
            self.probed(6, 3, Integer, |p| Ok(V::Integer(p.cpu()?.frequency_mhz))),
            // .7 application
            self.probed(7, 1, Integer, |p| Ok(V::Integer(p.process_count()?))),
            self.probed(7, 2, Counter64, |p| {
                Ok(V::Counter64(p.uptime()?.as_millis() as u64))
            }),
            // .10 identity
            self.probed(10, 1, OctetString, |p| Ok(text(p.identity()?.model))),
            self.probed(10, 2, OctetString, |p| Ok(text(p.identity()?.manufacturer))),
            self.probed(10, 3, OctetString, |p| Ok(text(p.identity()?.os_version))),
            self.probed(10, 4, Integer, |p| Ok(V::Integer(p.identity()?.api_level))),
            self.probed(10, 5, OctetString, |p| Ok(text(p.identity()?.serial))),
        ]
    }
}

/// Writable in-memory integer at `<base>.1.1.0`
pub struct SampleMib {
    initial: i32,
}

impl SampleMib {
    pub fn new(initial: i32) -> Self {
        Self { initial }
    }

    pub fn oid() -> Oid {
        device_oid(1, 1)
    }
}

impl MibModule for SampleMib {
    fn name(&self) -> &'static str {
        "sample"
    }

    fn oids(&self) -> Vec<Oid> {
        vec![Self::oid()]
    }

    fn objects(&self) -> Vec<ManagedObject> {
        vec![ManagedObject::new(
            Self::oid(),
            Access::ReadWrite,
            ScalarKind::Integer,
            VolatileSource::new(ScalarValue::Integer(self.initial)),
        )]
    }
}
