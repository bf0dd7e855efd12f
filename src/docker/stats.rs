//! Derivation of percentages from raw Docker stats counters.
//!
//! Docker reports cumulative CPU time and raw memory counters. The functions here
//! turn a pair of samples into the figures `docker stats` shows.
use std::collections::HashMap;

/// Cumulative CPU counters from one stats sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuSample {
    /// Total CPU time consumed by the container, in nanoseconds.
    pub total_usage: u64,
    /// Total CPU time of the host, in nanoseconds.
    pub system_usage: u64,
    pub online_cpus: u32,
}

/// CPU usage between `previous` and `current`, in percent of one CPU.
///
/// Returns `0.0` if either delta is not positive.
pub fn cpu_percent(current: &CpuSample, previous: &CpuSample) -> f64 {
    let cpu_delta = current.total_usage.saturating_sub(previous.total_usage);
    let system_delta = current.system_usage.saturating_sub(previous.system_usage);
    if cpu_delta == 0 || system_delta == 0 {
        return 0.0;
    }
    let cpus = current.online_cpus.max(1);
    (cpu_delta as f64 / system_delta as f64) * f64::from(cpus) * 100.0
}

/// Memory in use, excluding the reclaimable page cache.
///
/// cgroup v2 reports the cache as `inactive_file`, cgroup v1 as `total_inactive_file`.
pub fn memory_used(usage: u64, stats: Option<&HashMap<String, u64>>) -> u64 {
    let cache = stats
        .and_then(|s| {
            s.get("inactive_file")
                .or_else(|| s.get("total_inactive_file"))
                .copied()
        })
        .unwrap_or(0);
    usage.saturating_sub(cache)
}

pub fn memory_percent(used: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    used as f64 / limit as f64 * 100.0
}
