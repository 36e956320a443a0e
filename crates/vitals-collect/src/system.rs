//! Whole-machine memory and CPU utilization sampler.

use sysinfo::System;

use vitals_metrics::MetricScope;

use crate::{SampleError, Sampler};

/// Samples system memory and per-core CPU utilization.
///
/// CPU utilization is measured between consecutive refreshes, so the
/// first tick after startup reports zero for every core.
pub struct SystemStatsSampler {
    system: System,
}

impl SystemStatsSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemStatsSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SystemStatsSampler {
    fn name(&self) -> &'static str {
        "system_stats"
    }

    fn sample(&mut self, scope: &MetricScope) -> Result<(), SampleError> {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        scope
            .gauge("TotalMemory")
            .update(self.system.total_memory() as f64);
        scope
            .gauge("FreeMemory")
            .update(self.system.free_memory() as f64);

        for (i, cpu) in self.system.cpus().iter().enumerate() {
            scope
                .gauge(&format!("CPUutilization{}", i + 1))
                .update(cpu.cpu_usage() as f64);
        }
        Ok(())
    }
}
