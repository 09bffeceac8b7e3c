//! Resource metrics derivation from consecutive runtime statistics samples.

use log::trace;
use serde::Deserialize;
use std::collections::HashMap;

use super::types::MetricsSummary;

const MIB: f64 = 1024.0 * 1024.0;

/// Counters extracted from one statistics document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricSample {
    /// Cumulative CPU time consumed by the container.
    pub cpu_used: u64,
    /// Cumulative CPU time of the whole host.
    pub system_usage: u64,
    pub core_count: u32,
    pub memory_usage: u64,
    pub memory_cache: u64,
    pub memory_limit: u64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawStats {
    cpu_stats: RawCpuStats,
    memory_stats: RawMemoryStats,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawCpuStats {
    cpu_usage: RawCpuUsage,
    system_cpu_usage: u64,
    online_cpus: u32,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawCpuUsage {
    total_usage: u64,
    percpu_usage: Option<Vec<u64>>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawMemoryStats {
    usage: u64,
    limit: u64,
    stats: HashMap<String, u64>,
}

impl MetricSample {
    /// Parses one statistics document. Missing counters read as 0.
    ///
    /// Core count prefers `online_cpus` and falls back to the per-CPU usage list.
    /// Cache prefers `stats.cache` (cgroup v1) and falls back to `stats.inactive_file`
    /// (cgroup v2).
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let stats: RawStats = serde_json::from_str(raw)?;

        let core_count = match stats.cpu_stats.online_cpus {
            0 => stats
                .cpu_stats
                .cpu_usage
                .percpu_usage
                .as_ref()
                .map_or(0, |per_cpu| per_cpu.len() as u32),
            n => n,
        };
        let memory_cache = stats
            .memory_stats
            .stats
            .get("cache")
            .or_else(|| stats.memory_stats.stats.get("inactive_file"))
            .copied()
            .unwrap_or(0);

        Ok(Self {
            cpu_used: stats.cpu_stats.cpu_usage.total_usage,
            system_usage: stats.cpu_stats.system_cpu_usage,
            core_count,
            memory_usage: stats.memory_stats.usage,
            memory_cache,
            memory_limit: stats.memory_stats.limit,
        })
    }
}

/// Derives [`MetricsSummary`] values from a session's sample sequence.
///
/// Owns the "previous sample" slot of exactly one session. Every pushed sample
/// replaces it, whether or not a summary was emitted.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    previous: Option<MetricSample>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one sample.
    ///
    /// Returns `None` for the first sample (nothing to compare against) and for
    /// samples reporting a zero memory limit, where no percentage is defined.
    pub fn push(&mut self, sample: MetricSample) -> Option<MetricsSummary> {
        let previous = self.previous.replace(sample)?;

        if sample.memory_limit == 0 {
            trace!("Skipping metrics sample with zero memory limit");
            return None;
        }

        let cpu_delta = sample.cpu_used as f64 - previous.cpu_used as f64;
        let system_delta = sample.system_usage as f64 - previous.system_usage as f64;
        let cpu_percent = if system_delta > 0.0 && cpu_delta > 0.0 {
            (cpu_delta / system_delta) * f64::from(sample.core_count) * 100.0
        } else {
            0.0
        };

        let memory_used = sample.memory_usage.saturating_sub(sample.memory_cache) as f64;
        let memory_percent = (memory_used / sample.memory_limit as f64) * 100.0;

        Some(MetricsSummary {
            cpu_percent,
            memory_percent,
            memory_usage_mib: memory_used / MIB,
        })
    }
}
