//! Probe backed by procfs, sysfs and `statvfs`.

use super::{
    BatteryInfo, BatteryStatus, CpuInfo, DeviceIdentity, DeviceProbe, MemoryInfo, NetworkInfo,
    StorageInfo,
};
use crate::error::ProviderError;
use std::net::{Ipv4Addr, UdpSocket};
use std::path::{Path, PathBuf};
use std::time::Duration;

const UNKNOWN: &str = "UNKNOWN";

/// Reads live metrics from the running Linux host
#[derive(Debug, Clone)]
pub struct LinuxProbe {
    proc_root: PathBuf,
    sys_root: PathBuf,
    data_path: PathBuf,
}

impl LinuxProbe {
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys", "/")
    }

    /// Probe alternate procfs/sysfs trees; `data_path` is the filesystem reported as storage
    pub fn with_roots(
        proc_root: impl Into<PathBuf>,
        sys_root: impl Into<PathBuf>,
        data_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
            data_path: data_path.into(),
        }
    }

    fn proc_file(&self, rel: &str) -> Result<String, ProviderError> {
        read_trimmed(&self.proc_root.join(rel))
    }

    fn sys_file(&self, rel: &str) -> Option<String> {
        read_trimmed(&self.sys_root.join(rel))
            .ok()
            .filter(|s| !s.is_empty())
    }

    fn default_interface(&self) -> Option<String> {
        let routes = self.proc_file("net/route").ok()?;
        parse_default_route(&routes)
    }

    fn is_wireless(&self, iface: &str) -> bool {
        self.sys_root
            .join("class/net")
            .join(iface)
            .join("wireless")
            .exists()
    }

    fn battery_dir(&self) -> Option<PathBuf> {
        let entries = std::fs::read_dir(self.sys_root.join("class/power_supply")).ok()?;
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                read_trimmed(&p.join("type"))
                    .map(|t| t == "Battery")
                    .unwrap_or(false)
            })
            .collect();
        dirs.sort();
        dirs.into_iter().next()
    }
}

impl Default for LinuxProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProbe for LinuxProbe {
    fn memory(&self) -> Result<MemoryInfo, ProviderError> {
        parse_meminfo(&self.proc_file("meminfo")?)
    }

    fn storage(&self) -> Result<StorageInfo, ProviderError> {
        filesystem_capacity(&self.data_path)
    }

    fn battery(&self) -> Result<BatteryInfo, ProviderError> {
        let dir = self
            .battery_dir()
            .ok_or_else(|| ProviderError::Unavailable("no battery present".to_string()))?;
        let level = parse_number::<i32>("capacity", &read_trimmed(&dir.join("capacity"))?)?;
        // Optional attributes report -1 when the driver omits them
        let temperature = read_trimmed(&dir.join("temp"))
            .ok()
            .and_then(|t| t.parse::<i32>().ok())
            .unwrap_or(-1);
        let voltage = read_trimmed(&dir.join("voltage_now"))
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .map(|microvolts| (microvolts / 1000) as i32)
            .unwrap_or(-1);
        let status = read_trimmed(&dir.join("status"))
            .map(|s| BatteryStatus::from_sysfs(&s))
            .unwrap_or(BatteryStatus::Unknown);

        Ok(BatteryInfo {
            level,
            temperature,
            voltage,
            status,
        })
    }

    fn network(&self) -> Result<NetworkInfo, ProviderError> {
        let Some(iface) = self.default_interface() else {
            return Ok(NetworkInfo {
                kind: "NONE".to_string(),
                ssid: "NONE".to_string(),
                signal: -999,
                ipv4: UNKNOWN.to_string(),
                mac: UNKNOWN.to_string(),
            });
        };

        let wireless = self.is_wireless(&iface);
        let signal = if wireless {
            self.proc_file("net/wireless")
                .ok()
                .and_then(|table| parse_wireless_level(&table, &iface))
                .unwrap_or(-999)
        } else {
            -999
        };
        let mac = self
            .sys_file(&format!("class/net/{}/address", iface))
            .map(|m| m.to_uppercase())
            .unwrap_or_else(|| UNKNOWN.to_string());

        Ok(NetworkInfo {
            kind: if wireless { "WIFI" } else { "ETHERNET" }.to_string(),
            // SSIDs are only reachable over nl80211
            ssid: if wireless { UNKNOWN } else { "NONE" }.to_string(),
            signal,
            ipv4: primary_ipv4()
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            mac,
        })
    }

    fn cpu(&self) -> Result<CpuInfo, ProviderError> {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get() as i32)
            .unwrap_or(1);
        let usage_percent = parse_cpu_usage(&self.proc_file("stat")?)?;
        let frequency_mhz = self
            .sys_file("devices/system/cpu/cpu0/cpufreq/scaling_cur_freq")
            .and_then(|khz| khz.parse::<i64>().ok())
            .map(|khz| (khz / 1000) as i32)
            .or_else(|| {
                self.proc_file("cpuinfo")
                    .ok()
                    .and_then(|info| parse_cpuinfo_mhz(&info))
            })
            .unwrap_or(-1);

        Ok(CpuInfo {
            cores,
            usage_percent,
            frequency_mhz,
        })
    }

    fn process_count(&self) -> Result<i32, ProviderError> {
        let count = std::fs::read_dir(&self.proc_root)?
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .map(|name| !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()))
                    .unwrap_or(false)
            })
            .count();
        Ok(count as i32)
    }

    fn uptime(&self) -> Result<Duration, ProviderError> {
        parse_uptime(&self.proc_file("uptime")?)
    }

    fn identity(&self) -> Result<DeviceIdentity, ProviderError> {
        let os_version = self.proc_file("sys/kernel/osrelease")?;
        let hostname = self.proc_file("sys/kernel/hostname")?;
        let model = self
            .sys_file("class/dmi/id/product_name")
            .or_else(|| {
                self.proc_file("device-tree/model")
                    .ok()
                    .map(|m| m.trim_end_matches('\0').to_string())
            })
            .unwrap_or_else(|| UNKNOWN.to_string());

        Ok(DeviceIdentity {
            model,
            manufacturer: self
                .sys_file("class/dmi/id/sys_vendor")
                .unwrap_or_else(|| UNKNOWN.to_string()),
            api_level: kernel_api_level(&os_version),
            os_version,
            serial: self
                .sys_file("class/dmi/id/product_serial")
                .unwrap_or_else(|| UNKNOWN.to_string()),
            hostname,
        })
    }
}

fn read_trimmed(path: &Path) -> Result<String, ProviderError> {
    Ok(std::fs::read_to_string(path)?.trim().to_string())
}

fn parse_number<T: std::str::FromStr>(source_name: &str, text: &str) -> Result<T, ProviderError> {
    text.trim().parse::<T>().map_err(|_| ProviderError::Parse {
        source_name: source_name.to_string(),
        reason: format!("not a number: {:?}", text),
    })
}

fn parse_meminfo(content: &str) -> Result<MemoryInfo, ProviderError> {
    let field = |name: &str| -> Option<u64> {
        content
            .lines()
            .find(|line| line.starts_with(name))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())
            .map(|kb| kb * 1024)
    };

    let total = field("MemTotal:").ok_or_else(|| ProviderError::Parse {
        source_name: "meminfo".to_string(),
        reason: "MemTotal missing".to_string(),
    })?;
    // Kernels before 3.14 have no MemAvailable
    let available = field("MemAvailable:")
        .or_else(|| field("MemFree:"))
        .unwrap_or(0);

    Ok(MemoryInfo { total, available })
}

/// Busy share of all CPU time since boot, from the aggregate `cpu` line
fn parse_cpu_usage(stat: &str) -> Result<i32, ProviderError> {
    let parse_err = |reason: &str| ProviderError::Parse {
        source_name: "stat".to_string(),
        reason: reason.to_string(),
    };

    let line = stat
        .lines()
        .find(|line| line.starts_with("cpu "))
        .ok_or_else(|| parse_err("aggregate cpu line missing"))?;
    let ticks: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|t| t.parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|_| parse_err("non-numeric cpu field"))?;
    if ticks.len() < 4 {
        return Err(parse_err("too few cpu fields"));
    }

    let idle = ticks[3];
    let total: u64 = ticks.iter().sum();
    if total == 0 {
        return Ok(0);
    }
    Ok(((total - idle) * 100 / total) as i32)
}

fn parse_uptime(content: &str) -> Result<Duration, ProviderError> {
    let seconds = content
        .split_whitespace()
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s >= 0.0)
        .ok_or_else(|| ProviderError::Parse {
            source_name: "uptime".to_string(),
            reason: format!("unexpected content {:?}", content),
        })?;
    Ok(Duration::from_secs_f64(seconds))
}

fn parse_cpuinfo_mhz(info: &str) -> Option<i32> {
    info.lines()
        .find(|line| line.starts_with("cpu MHz"))
        .and_then(|line| line.split(':').nth(1))
        .and_then(|mhz| mhz.trim().parse::<f64>().ok())
        .map(|mhz| mhz as i32)
}

/// Interface carrying the default route
fn parse_default_route(routes: &str) -> Option<String> {
    routes.lines().skip(1).find_map(|line| {
        let mut fields = line.split_whitespace();
        let iface = fields.next()?;
        let destination = fields.next()?;
        (destination == "00000000").then(|| iface.to_string())
    })
}

/// Signal level in dBm for `iface` from the wireless statistics table
fn parse_wireless_level(table: &str, iface: &str) -> Option<i32> {
    table.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != iface {
            return None;
        }
        let level = rest.split_whitespace().nth(2)?;
        level.trim_end_matches('.').parse::<f64>().ok().map(|l| l as i32)
    })
}

/// Kernel `major.minor` folded into one number: 6.1 -> 601
fn kernel_api_level(release: &str) -> i32 {
    let mut parts = release
        .split(|c: char| !c.is_ascii_digit())
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<i32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    major * 100 + minor
}

/// Source address the host would use for outbound traffic. Connecting a UDP socket
/// sends nothing.
fn primary_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    match socket.local_addr().ok()?.ip() {
        std::net::IpAddr::V4(ip) if !ip.is_unspecified() && !ip.is_loopback() => Some(ip),
        _ => None,
    }
}

#[cfg(target_os = "linux")]
fn filesystem_capacity(path: &Path) -> Result<StorageInfo, ProviderError> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        ProviderError::Unavailable(format!("path {} contains a NUL byte", path.display()))
    })?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(ProviderError::Io(std::io::Error::last_os_error()));
    }

    let block = stat.f_frsize as u64;
    Ok(StorageInfo {
        total: stat.f_blocks as u64 * block,
        available: stat.f_bavail as u64 * block,
    })
}

#[cfg(not(target_os = "linux"))]
fn filesystem_capacity(path: &Path) -> Result<StorageInfo, ProviderError> {
    Err(ProviderError::Unavailable(format!(
        "filesystem statistics for {} are not supported on this platform",
        path.display()
    )))
}
