/*!
 * Host Sampler
 * Memory and per-CPU utilization of the machine
 */

use sysinfo::System;

use super::Sampler;
use crate::core::errors::SamplerError;
use crate::metric::Metric;

const NAME: &str = "host";

/// Emits `TotalMemory`, `FreeMemory` and one `CPUutilization<N>` gauge per
/// logical CPU, numbered from 1
pub struct HostSampler {
    system: System,
}

impl HostSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self { system }
    }
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for HostSampler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn sample(&mut self) -> Result<Vec<Metric>, SamplerError> {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return Err(SamplerError {
                sampler: NAME,
                measurement: "CPUutilization",
                reason: "no CPUs reported by the host".to_string(),
            });
        }

        let mut metrics = Vec::with_capacity(2 + cpus.len());
        metrics.push(Metric::gauge("TotalMemory", self.system.total_memory() as f64));
        metrics.push(Metric::gauge("FreeMemory", self.system.free_memory() as f64));
        for (idx, cpu) in cpus.iter().enumerate() {
            metrics.push(Metric::gauge(
                format!("CPUutilization{}", idx + 1),
                f64::from(cpu.cpu_usage()),
            ));
        }
        Ok(metrics)
    }
}
