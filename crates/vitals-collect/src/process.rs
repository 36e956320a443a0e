//! Process memory statistics sampler.

use sysinfo::{Pid, ProcessesToUpdate, System};

use vitals_metrics::MetricScope;

use crate::{SampleError, Sampler};

/// Samples resident and virtual memory of the current process.
pub struct ProcessStatsSampler {
    system: System,
    pid: Pid,
}

impl ProcessStatsSampler {
    pub fn new() -> Result<Self, SampleError> {
        let pid = sysinfo::get_current_pid().map_err(SampleError::Pid)?;
        Ok(Self {
            system: System::new(),
            pid,
        })
    }
}

impl Sampler for ProcessStatsSampler {
    fn name(&self) -> &'static str {
        "process_stats"
    }

    fn sample(&mut self, scope: &MetricScope) -> Result<(), SampleError> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        let process = self
            .system
            .process(self.pid)
            .ok_or(SampleError::ProcessNotFound)?;

        scope
            .gauge("ResidentMemory")
            .update(process.memory() as f64);
        scope
            .gauge("VirtualMemory")
            .update(process.virtual_memory() as f64);
        Ok(())
    }
}
