//! Host resource sampling
//!
//! [`ResourceSampler`] is the seam between the monitor and the operating
//! system; [`SysinfoSampler`] reads the host via `sysinfo`.

use crate::domain::{PhimaskError, Result};
use std::time::Instant;
use sysinfo::{Networks, Pid, System};

/// One utilization reading
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResourceSample {
    /// Global CPU usage, 0-100
    pub cpu_percent: f64,
    /// Used memory as a share of total, 0-100
    pub memory_percent: f64,
    /// Disk bytes read and written by this process per second
    pub disk_bytes_per_sec: f64,
    /// Network bytes received and transmitted on all interfaces per second
    pub network_bytes_per_sec: f64,
}

/// Source of utilization readings
///
/// Called on the blocking pool between monitor sleeps; implementations may
/// block.
pub trait ResourceSampler: Send + 'static {
    /// Take one reading
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be read; the monitor logs it and
    /// retries later.
    fn sample(&mut self) -> Result<ResourceSample>;
}

/// Sampler backed by `sysinfo`
pub struct SysinfoSampler {
    system: System,
    networks: Networks,
    pid: Option<Pid>,
    last_refresh: Instant,
}

impl SysinfoSampler {
    /// Create a sampler and take the baseline reading CPU deltas need
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();

        let pid = sysinfo::get_current_pid().ok();
        if let Some(pid) = pid {
            system.refresh_process(pid);
        }

        Self {
            system,
            networks: Networks::new_with_refreshed_list(),
            pid,
            last_refresh: Instant::now(),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SysinfoSampler {
    fn sample(&mut self) -> Result<ResourceSample> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.networks.refresh();

        let elapsed = self.last_refresh.elapsed().as_secs_f64().max(f64::EPSILON);
        self.last_refresh = Instant::now();

        let total_memory = self.system.total_memory();
        if total_memory == 0 {
            return Err(PhimaskError::Other(
                "Host reported zero total memory".to_string(),
            ));
        }
        let memory_percent = self.system.used_memory() as f64 / total_memory as f64 * 100.0;

        let disk_bytes = match self.pid {
            Some(pid) if self.system.refresh_process(pid) => self
                .system
                .process(pid)
                .map(|p| {
                    let usage = p.disk_usage();
                    usage.read_bytes + usage.written_bytes
                })
                .unwrap_or(0),
            _ => 0,
        };

        let network_bytes: u64 = self
            .networks
            .iter()
            .map(|(_, data)| data.received() + data.transmitted())
            .sum();

        Ok(ResourceSample {
            cpu_percent: f64::from(self.system.global_cpu_info().cpu_usage()),
            memory_percent,
            disk_bytes_per_sec: disk_bytes as f64 / elapsed,
            network_bytes_per_sec: network_bytes as f64 / elapsed,
        })
    }
}
