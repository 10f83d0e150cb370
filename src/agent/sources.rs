//! Named metric sources polled by the agent
//!
//! Each gauge is a plain accessor over a refreshed `sysinfo` snapshot. The
//! table is fixed at compile time; per-CPU gauges depend on the host and are
//! produced separately by [`cpu_utilization`].

use reqwest::Url;
use sysinfo::{Pid, System};

use crate::metric::{Metric, MetricValue};

/// Counter incremented by one on every poll
pub const POLL_COUNT: &str = "PollCount";

/// What a source reads from: the refreshed system plus our own process id
pub struct Sample<'a> {
    pub system: &'a System,
    pub pid: Option<Pid>,
}

impl Sample<'_> {
    fn process(&self) -> Option<&sysinfo::Process> {
        self.pid.and_then(|pid| self.system.process(pid))
    }
}

/// One named gauge and how to read it
pub struct MetricSource {
    pub name: &'static str,
    pub read: fn(&Sample<'_>) -> Option<f64>,
}

pub const SOURCES: &[MetricSource] = &[
    MetricSource {
        name: "ProcessResidentMemory",
        read: |s| s.process().map(|p| p.memory() as f64),
    },
    MetricSource {
        name: "ProcessVirtualMemory",
        read: |s| s.process().map(|p| p.virtual_memory() as f64),
    },
    MetricSource {
        name: "ProcessCpuUsage",
        read: |s| s.process().map(|p| f64::from(p.cpu_usage())),
    },
    MetricSource {
        name: "TotalMemory",
        read: |s| Some(s.system.total_memory() as f64),
    },
    MetricSource {
        name: "FreeMemory",
        read: |s| Some(s.system.free_memory() as f64),
    },
    MetricSource {
        name: "UsedMemory",
        read: |s| Some(s.system.used_memory() as f64),
    },
    MetricSource {
        name: "AvailableMemory",
        read: |s| Some(s.system.available_memory() as f64),
    },
    MetricSource {
        name: "TotalSwap",
        read: |s| Some(s.system.total_swap() as f64),
    },
    MetricSource {
        name: "UsedSwap",
        read: |s| Some(s.system.used_swap() as f64),
    },
    MetricSource {
        name: "LoadAverage1",
        read: |_| Some(System::load_average().one),
    },
    MetricSource {
        name: "LoadAverage5",
        read: |_| Some(System::load_average().five),
    },
    MetricSource {
        name: "LoadAverage15",
        read: |_| Some(System::load_average().fifteen),
    },
    MetricSource {
        name: "RandomValue",
        read: |_| Some(rand::random::<f64>()),
    },
];

/// Read every table source; sources without a reading are skipped
pub fn read_all(sample: &Sample<'_>) -> Vec<Metric> {
    SOURCES
        .iter()
        .filter_map(|source| {
            (source.read)(sample)
                .filter(|v| v.is_finite())
                .map(|v| Metric::gauge(source.name, v))
        })
        .collect()
}

/// `CPUutilization1` .. `CPUutilizationN`, one per logical CPU
pub fn cpu_utilization(system: &System) -> Vec<Metric> {
    system
        .cpus()
        .iter()
        .enumerate()
        .map(|(i, cpu)| (i + 1, f64::from(cpu.cpu_usage())))
        .filter(|(_, usage)| usage.is_finite())
        .map(|(n, usage)| Metric::gauge(format!("CPUutilization{n}"), usage))
        .collect()
}

/// Raw update endpoint under `base` carrying `metric`
///
/// The id is percent-encoded as a single path segment.
pub fn raw_update_url(base: &Url, metric: &Metric) -> Url {
    let value = match metric.value {
        MetricValue::Counter(delta) => delta.to_string(),
        MetricValue::Gauge(value) => value.to_string(),
    };
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .extend(["update", metric.kind().as_str(), metric.id.as_str(), value.as_str()]);
    }
    url
}
