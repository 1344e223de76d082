//! Device telemetry probes.
//!
//! A [`DeviceProbe`] answers one metric group per call. Probes are consulted on every
//! managed object read, so implementations must be cheap and must not cache.

pub mod linux;

pub use linux::LinuxProbe;

use crate::error::ProviderError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Physical memory in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total: u64,
    pub available: u64,
}

impl MemoryInfo {
    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.available)
    }

    pub fn usage_percent(&self) -> i32 {
        usage_percent(self.used(), self.total)
    }
}

/// Capacity of the data filesystem in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub total: u64,
    pub available: u64,
}

impl StorageInfo {
    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.available)
    }

    pub fn usage_percent(&self) -> i32 {
        usage_percent(self.used(), self.total)
    }
}

fn usage_percent(used: u64, total: u64) -> i32 {
    if total == 0 {
        return 0;
    }
    ((u128::from(used) * 100) / u128::from(total)) as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatteryStatus {
    Charging,
    Discharging,
    Full,
    NotCharging,
    Unknown,
}

impl BatteryStatus {
    /// Map a power-supply `status` attribute
    pub fn from_sysfs(text: &str) -> Self {
        match text.trim() {
            "Charging" => BatteryStatus::Charging,
            "Discharging" => BatteryStatus::Discharging,
            "Full" => BatteryStatus::Full,
            "Not charging" => BatteryStatus::NotCharging,
            _ => BatteryStatus::Unknown,
        }
    }
}

impl fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BatteryStatus::Charging => "CHARGING",
            BatteryStatus::Discharging => "DISCHARGING",
            BatteryStatus::Full => "FULL",
            BatteryStatus::NotCharging => "NOT_CHARGING",
            BatteryStatus::Unknown => "UNKNOWN",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryInfo {
    /// Charge level, percent
    pub level: i32,
    /// Tenths of a degree Celsius
    pub temperature: i32,
    /// Millivolts
    pub voltage: i32,
    pub status: BatteryStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// `WIFI`, `ETHERNET`, `NONE` ...
    pub kind: String,
    pub ssid: String,
    /// dBm
    pub signal: i32,
    pub ipv4: String,
    pub mac: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuInfo {
    pub cores: i32,
    /// Busy share since boot, percent
    pub usage_percent: i32,
    pub frequency_mhz: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub model: String,
    pub manufacturer: String,
    pub os_version: String,
    pub api_level: i32,
    pub serial: String,
    pub hostname: String,
}

/// Source of device metrics
pub trait DeviceProbe: Send + Sync {
    fn memory(&self) -> Result<MemoryInfo, ProviderError>;

    fn storage(&self) -> Result<StorageInfo, ProviderError>;

    fn battery(&self) -> Result<BatteryInfo, ProviderError>;

    fn network(&self) -> Result<NetworkInfo, ProviderError>;

    fn cpu(&self) -> Result<CpuInfo, ProviderError>;

    fn process_count(&self) -> Result<i32, ProviderError>;

    /// Time since boot
    fn uptime(&self) -> Result<Duration, ProviderError>;

    fn identity(&self) -> Result<DeviceIdentity, ProviderError>;
}

/// Metric groups, used to inject failures into [`StaticProbe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Memory,
    Storage,
    Battery,
    Network,
    Cpu,
    Processes,
    Uptime,
    Identity,
}

/// Probe answering fixed values
#[derive(Debug)]
pub struct StaticProbe {
    pub memory: MemoryInfo,
    pub storage: StorageInfo,
    pub battery: BatteryInfo,
    pub network: NetworkInfo,
    pub cpu: CpuInfo,
    pub processes: i32,
    pub uptime: Duration,
    pub identity: DeviceIdentity,
    failing: RwLock<HashSet<Metric>>,
}

impl StaticProbe {
    /// Make every read of `metric` fail until [`StaticProbe::recover`] is called
    pub fn fail(&self, metric: Metric) {
        self.failing.write().insert(metric);
    }

    pub fn recover(&self, metric: Metric) {
        self.failing.write().remove(&metric);
    }

    fn answer<T: Clone>(&self, metric: Metric, value: &T) -> Result<T, ProviderError> {
        if self.failing.read().contains(&metric) {
            return Err(ProviderError::Unavailable(format!(
                "{:?} probe failure injected",
                metric
            )));
        }
        Ok(value.clone())
    }
}

impl Default for StaticProbe {
    fn default() -> Self {
        Self {
            memory: MemoryInfo {
                total: 8 * 1024 * 1024 * 1024,
                available: 3 * 1024 * 1024 * 1024,
            },
            storage: StorageInfo {
                total: 64 * 1024 * 1024 * 1024,
                available: 16 * 1024 * 1024 * 1024,
            },
            battery: BatteryInfo {
                level: 87,
                temperature: 312,
                voltage: 4180,
                status: BatteryStatus::Discharging,
            },
            network: NetworkInfo {
                kind: "WIFI".to_string(),
                ssid: "field-ops".to_string(),
                signal: -58,
                ipv4: "192.168.40.17".to_string(),
                mac: "02:00:5E:10:00:01".to_string(),
            },
            cpu: CpuInfo {
                cores: 8,
                usage_percent: 23,
                frequency_mhz: 1804,
            },
            processes: 211,
            uptime: Duration::from_secs(93_784),
            identity: DeviceIdentity {
                model: "TR-400".to_string(),
                manufacturer: "Fieldline".to_string(),
                os_version: "6.1.57".to_string(),
                api_level: 601,
                serial: "FL4K2Q9".to_string(),
                hostname: "tr400-bench".to_string(),
            },
            failing: RwLock::new(HashSet::new()),
        }
    }
}

impl DeviceProbe for StaticProbe {
    fn memory(&self) -> Result<MemoryInfo, ProviderError> {
        self.answer(Metric::Memory, &self.memory)
    }

    fn storage(&self) -> Result<StorageInfo, ProviderError> {
        self.answer(Metric::Storage, &self.storage)
    }

    fn battery(&self) -> Result<BatteryInfo, ProviderError> {
        self.answer(Metric::Battery, &self.battery)
    }

    fn network(&self) -> Result<NetworkInfo, ProviderError> {
        self.answer(Metric::Network, &self.network)
    }

    fn cpu(&self) -> Result<CpuInfo, ProviderError> {
        self.answer(Metric::Cpu, &self.cpu)
    }

    fn process_count(&self) -> Result<i32, ProviderError> {
        self.answer(Metric::Processes, &self.processes)
    }

    fn uptime(&self) -> Result<Duration, ProviderError> {
        self.answer(Metric::Uptime, &self.uptime)
    }

    fn identity(&self) -> Result<DeviceIdentity, ProviderError> {
        self.answer(Metric::Identity, &self.identity)
    }
}
