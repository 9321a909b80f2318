//! System resource sampling feeding `MonitoringSink::update_system_metrics`.

use std::time::Duration;

use sysinfo::System;

use crate::context::SystemMetrics;

/// Wraps `sysinfo::System`, refreshing on every sample.
pub struct ResourceMonitor {
    system: System,
    pid: usize,
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        let pid = sysinfo::get_current_pid()
            .map(|p| p.as_u32() as usize)
            .unwrap_or(0);
        let mut system = System::new_all();
        system.refresh_all();
        Self { system, pid }
    }
}

impl ResourceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_metrics(&mut self) -> SystemMetrics {
        self.system.refresh_all();
        let process = self.system.process(sysinfo::Pid::from(self.pid));

        SystemMetrics {
            cpu_usage_percent: process.map(|p| p.cpu_usage() as f64).unwrap_or(0.0),
            memory_usage_bytes: process.map(|p| p.memory()).unwrap_or(0),
            virtual_memory_bytes: process.map(|p| p.virtual_memory()).unwrap_or(0),
            total_memory_bytes: self.system.total_memory(),
            used_memory_bytes: self.system.used_memory(),
            load_average: 0.0,
            process_count: self.system.processes().len(),
        }
    }

    /// Samples once per second for `duration` and returns the average.
    pub fn monitor_average(&mut self, duration: Duration) -> SystemMetrics {
        let start = std::time::Instant::now();
        let mut samples = Vec::new();
        while start.elapsed() < duration {
            samples.push(self.get_metrics());
            std::thread::sleep(Duration::from_secs(1));
        }
        self.average_metrics(&samples)
    }

    fn average_metrics(&self, samples: &[SystemMetrics]) -> SystemMetrics {
        let count = samples.len().max(1) as f64;
        SystemMetrics {
            cpu_usage_percent: samples.iter().map(|m| m.cpu_usage_percent).sum::<f64>() / count,
            memory_usage_bytes: (samples.iter().map(|m| m.memory_usage_bytes).sum::<u64>() as f64 / count) as u64,
            virtual_memory_bytes: (samples.iter().map(|m| m.virtual_memory_bytes).sum::<u64>() as f64 / count) as u64,
            total_memory_bytes: samples.first().map(|m| m.total_memory_bytes).unwrap_or(0),
            used_memory_bytes: (samples.iter().map(|m| m.used_memory_bytes).sum::<u64>() as f64 / count) as u64,
            load_average: samples.iter().map(|m| m.load_average).sum::<f64>() / count,
            process_count: (samples.iter().map(|m| m.process_count).sum::<usize>() as f64 / count) as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_metrics_reports_nonzero_total_memory() {
        let mut monitor = ResourceMonitor::new();
        let metrics = monitor.get_metrics();
        assert!(metrics.total_memory_bytes > 0);
    }
}
