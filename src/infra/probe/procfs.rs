//! Linux `/proc` telemetry.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::core::sampler::{ProbeError, ResourceProbe, ResourceReading};

const PROC_ROOT: &str = "/proc";

/// Aggregate CPU counters from the first line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuTimes {
    /// user + nice + system jiffies.
    pub busy: u64,
    /// busy + idle + iowait jiffies.
    pub total: u64,
}

impl CpuTimes {
    /// Utilization between two readings, 0-100.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent_since(&self, earlier: &Self) -> f64 {
        let total = self.total.saturating_sub(earlier.total);
        if total == 0 {
            return 0.0;
        }
        let busy = self.busy.saturating_sub(earlier.busy);
        (busy as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Memory figures from `/proc/meminfo`, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemInfo {
    /// `MemTotal`.
    pub total_bytes: u64,
    /// `MemAvailable`.
    pub available_bytes: u64,
}

impl MemInfo {
    /// Used share of total memory, 0-100.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn used_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        used as f64 / self.total_bytes as f64 * 100.0
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
pub fn parse_cpu_times(stat: &str) -> Result<CpuTimes, ProbeError> {
    let line = stat
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| ProbeError::Parse("missing aggregate cpu line".into()))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(5)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|e| ProbeError::Parse(format!("bad cpu counter: {e}")))?;
    if fields.len() < 4 {
        return Err(ProbeError::Parse(format!(
            "expected at least 4 cpu counters, got {}",
            fields.len()
        )));
    }
    let busy = fields[0] + fields[1] + fields[2];
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Ok(CpuTimes {
        busy,
        total: busy + idle,
    })
}

/// Parse `MemTotal` and `MemAvailable` from `/proc/meminfo`.
pub fn parse_meminfo(meminfo: &str) -> Result<MemInfo, ProbeError> {
    let mut total = None;
    let mut available = None;
    for line in meminfo.lines() {
        let mut parts = line.split_whitespace();
        let key = parts.next();
        let value = parts.next().and_then(|v| v.parse::<u64>().ok());
        match key {
            Some("MemTotal:") => total = value,
            Some("MemAvailable:") => available = value,
            _ => {}
        }
    }
    match (total, available) {
        (Some(total_kb), Some(available_kb)) => Ok(MemInfo {
            total_bytes: total_kb * 1024,
            available_bytes: available_kb * 1024,
        }),
        _ => Err(ProbeError::Parse(
            "MemTotal or MemAvailable missing from meminfo".into(),
        )),
    }
}

/// Parse the one-minute average from `/proc/loadavg`.
pub fn parse_loadavg(loadavg: &str) -> Result<f64, ProbeError> {
    loadavg
        .split_whitespace()
        .next()
        .ok_or_else(|| ProbeError::Parse("empty loadavg".into()))?
        .parse()
        .map_err(|e| ProbeError::Parse(format!("bad load average: {e}")))
}

/// Reads CPU, memory, and load from a procfs mount.
///
/// CPU utilization is the busy share between consecutive reads. Counters are
/// primed at construction; a read with no elapsed jiffies reports the
/// average since boot instead of 0.
#[derive(Debug)]
pub struct ProcfsProbe {
    root: PathBuf,
    previous: Mutex<Option<CpuTimes>>,
}

impl ProcfsProbe {
    /// Probe over `/proc`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(PROC_ROOT)
    }

    /// Probe over another directory laid out like `/proc`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let probe = Self {
            root: root.into(),
            previous: Mutex::new(None),
        };
        if let Ok(times) = probe.read_file("stat").and_then(|stat| parse_cpu_times(&stat)) {
            *probe.previous.lock() = Some(times);
        }
        probe
    }

    fn read_file(&self, name: &str) -> Result<String, ProbeError> {
        Ok(fs::read_to_string(self.root.join(name))?)
    }

    fn is_host_proc(&self) -> bool {
        self.root == Path::new(PROC_ROOT)
    }
}

impl Default for ProcfsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for ProcfsProbe {
    fn read(&self) -> Result<ResourceReading, ProbeError> {
        if !cfg!(target_os = "linux") && self.is_host_proc() {
            return Err(ProbeError::Unsupported("procfs is only available on linux"));
        }

        let times = parse_cpu_times(&self.read_file("stat")?)?;
        let mem = parse_meminfo(&self.read_file("meminfo")?)?;
        let load = parse_loadavg(&self.read_file("loadavg")?)?;

        let cpu_percent = {
            let mut previous = self.previous.lock();
            match *previous {
                Some(earlier) if times.total > earlier.total => {
                    *previous = Some(times);
                    times.percent_since(&earlier)
                }
                Some(_) => times.percent_since(&CpuTimes::default()),
                None => {
                    *previous = Some(times);
                    times.percent_since(&CpuTimes::default())
                }
            }
        };

        Ok(ResourceReading {
            cpu_percent,
            ram_percent: mem.used_percent(),
            free_ram_bytes: mem.available_bytes,
            total_ram_bytes: mem.total_bytes,
            load_avg_1m: load,
            cpu_count: num_cpus::get(),
        })
    }
}
