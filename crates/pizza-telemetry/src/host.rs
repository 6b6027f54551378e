//! Host CPU and memory sampling

use parking_lot::Mutex;
use sysinfo::System;

/// Raw host readings taken at flush time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostLoad {
    pub load_average_1m: f64,
    pub logical_cores: usize,
    pub total_memory: u64,
    pub free_memory: u64,
}

impl HostLoad {
    /// One-minute load average per logical core, as a percentage in `[0, 100]`
    pub fn cpu_usage_percent(&self) -> f64 {
        if self.logical_cores == 0 {
            return 0.0;
        }
        percent(self.load_average_1m / self.logical_cores as f64)
    }

    /// Used fraction of physical memory, as a percentage in `[0, 100]`
    pub fn memory_usage_percent(&self) -> f64 {
        if self.total_memory == 0 {
            return 0.0;
        }
        let used = self.total_memory.saturating_sub(self.free_memory);
        percent(used as f64 / self.total_memory as f64)
    }
}

fn percent(fraction: f64) -> f64 {
    if !fraction.is_finite() {
        return 0.0;
    }
    let clamped = (fraction * 100.0).clamp(0.0, 100.0);
    (clamped * 100.0).round() / 100.0
}

/// Source of host readings for the metrics flush
pub trait HostProbe: Send + Sync {
    fn sample(&self) -> HostLoad;
}

/// Fixed readings, handy for deterministic flushes
impl HostProbe for HostLoad {
    fn sample(&self) -> HostLoad {
        *self
    }
}

/// sysinfo-backed probe
pub struct SysinfoProbe {
    sys: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SysinfoProbe {
    fn sample(&self) -> HostLoad {
        let mut sys = self.sys.lock();
        sys.refresh_memory();

        let logical_cores = std::thread::available_parallelism()
            .map(|cores| cores.get())
            .unwrap_or(1);

        HostLoad {
            load_average_1m: System::load_average().one,
            logical_cores,
            total_memory: sys.total_memory(),
            free_memory: sys.free_memory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_usage_percent() {
        let load = HostLoad {
            load_average_1m: 1.0,
            logical_cores: 4,
            total_memory: 0,
            free_memory: 0,
        };
        assert_eq!(load.cpu_usage_percent(), 25.0);

        let overloaded = HostLoad {
            load_average_1m: 12.0,
            ..load
        };
        assert_eq!(overloaded.cpu_usage_percent(), 100.0);

        let no_cores = HostLoad {
            logical_cores: 0,
            ..load
        };
        assert_eq!(no_cores.cpu_usage_percent(), 0.0);
    }

    #[test]
    fn test_memory_usage_percent_rounds_to_two_places() {
        let load = HostLoad {
            load_average_1m: 0.0,
            logical_cores: 1,
            total_memory: 3,
            free_memory: 2,
        };
        assert_eq!(load.memory_usage_percent(), 33.33);

        let empty = HostLoad {
            total_memory: 0,
            ..load
        };
        assert_eq!(empty.memory_usage_percent(), 0.0);
    }

    #[test]
    fn test_sysinfo_probe_stays_in_range() {
        let probe = SysinfoProbe::new();
        let load = probe.sample();

        assert!(load.logical_cores >= 1);
        assert!((0.0..=100.0).contains(&load.cpu_usage_percent()));
        assert!((0.0..=100.0).contains(&load.memory_usage_percent()));
    }
}
