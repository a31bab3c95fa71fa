/*!
 * Runtime Sampler
 * Statistics of the agent process itself
 */

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sysinfo::{Pid, ProcessesToUpdate, System};

use super::Sampler;
use crate::core::errors::SamplerError;
use crate::metric::Metric;

const NAME: &str = "runtime";

/// Process memory and CPU of the running agent, plus `RandomValue` and a
/// `PollCount` delta of one per tick
pub struct RuntimeSampler {
    system: System,
    pid: Pid,
    rng: StdRng,
}

impl RuntimeSampler {
    pub fn new() -> Result<Self, SamplerError> {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic `RandomValue` sequence
    pub fn with_seed(seed: u64) -> Result<Self, SamplerError> {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Result<Self, SamplerError> {
        let pid = sysinfo::get_current_pid().map_err(|e| SamplerError {
            sampler: NAME,
            measurement: "pid",
            reason: e.to_string(),
        })?;

        let mut system = System::new();
        // CPU usage is a delta between two refreshes
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        Ok(Self { system, pid, rng })
    }
}

impl Sampler for RuntimeSampler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn sample(&mut self) -> Result<Vec<Metric>, SamplerError> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);

        let process = self.system.process(self.pid).ok_or_else(|| SamplerError {
            sampler: NAME,
            measurement: "ResidentMemory",
            reason: format!("process {} not visible", self.pid),
        })?;

        Ok(vec![
            Metric::gauge("ResidentMemory", process.memory() as f64),
            Metric::gauge("VirtualMemory", process.virtual_memory() as f64),
            Metric::gauge("ProcessCPU", f64::from(process.cpu_usage())),
            Metric::gauge("RandomValue", self.rng.gen::<f64>()),
            Metric::counter("PollCount", 1),
        ])
    }
}
