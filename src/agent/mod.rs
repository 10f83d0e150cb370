//! Metrics agent
//!
//! Polls process and system statistics into a local [`MemoryStore`] and
//! periodically reports the whole table to the server.
//!
//! ## Message Flow
//!
//! ```text
//! poll tick   → refresh sysinfo → set every source + PollCount(+1)
//! report tick → get_all → sign → POST /updates/ → subtract reported deltas
//!     ↑
//!     └─── shutdown future
//! ```
//!
//! Counters are delivered exactly once: after a successful report each
//! reported delta is merged back negated, so polls that landed while the
//! request was in flight are kept for the next report.

pub mod sources;

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::AgentConfig;
use crate::hash::IntegrityHasher;
use crate::metric::{Metric, MetricValue};
use crate::storage::{MemoryStore, Repository};

use sources::{POLL_COUNT, Sample};

/// Client side of the metrics pipeline
pub struct Agent {
    store: MemoryStore,
    system: System,
    pid: Option<Pid>,
    hasher: IntegrityHasher,
    client: reqwest::Client,
    base_url: String,
}

impl Agent {
    pub async fn new(config: &AgentConfig) -> Result<Self> {
        let mut store = MemoryStore::new();
        store.init().await;

        let pid = sysinfo::get_current_pid()
            .inspect_err(|e| warn!("process gauges disabled: {e}"))
            .ok();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            store,
            system: System::new(),
            pid,
            hasher: IntegrityHasher::new(config.key().unwrap_or_default()),
            client,
            base_url: config.base_url(),
        })
    }

    /// Metrics gathered but not yet reported
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Refresh statistics and record every source
    #[instrument(skip(self))]
    pub async fn poll(&mut self) {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();
        if let Some(pid) = self.pid {
            self.system
                .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        }

        let sample = Sample {
            system: &self.system,
            pid: self.pid,
        };
        let mut metrics = sources::read_all(&sample);
        metrics.extend(sources::cpu_utilization(&self.system));
        metrics.push(Metric::counter(POLL_COUNT, 1));

        let count = metrics.len();
        for metric in metrics {
            let id = metric.id.clone();
            if let Err(e) = self.store.set(metric).await {
                error!("failed to record {id}: {e}");
            }
        }
        trace!("polled {count} metrics");
    }

    /// Send the current table as one signed JSON batch
    ///
    /// Returns the number of metrics sent.
    #[instrument(skip(self))]
    pub async fn report(&self) -> Result<usize> {
        let mut snapshot = self.store.get_all().await;
        if snapshot.is_empty() {
            trace!("nothing to report");
            return Ok(0);
        }
        self.hasher.sign_all(&mut snapshot);

        let url = format!("{}/updates/", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&snapshot)
            .send()
            .await
            .context("failed to send HTTP request")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        for metric in &snapshot {
            self.settle(metric).await;
        }

        debug!("reported {} metrics", snapshot.len());
        Ok(snapshot.len())
    }

    /// Send one raw update request per metric
    ///
    /// Stops at the first failure; metrics sent before it stay settled.
    #[instrument(skip(self))]
    pub async fn report_raw(&self) -> Result<usize> {
        let snapshot = self.store.get_all().await;
        let base = Url::parse(&self.base_url)
            .with_context(|| format!("invalid server address {}", self.base_url))?;

        for metric in &snapshot {
            let url = sources::raw_update_url(&base, metric);
            let response = self
                .client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .send()
                .await
                .with_context(|| format!("failed to send {}", metric.id))?;

            if !response.status().is_success() {
                anyhow::bail!("HTTP error for {}: {}", metric.id, response.status());
            }
            self.settle(metric).await;
        }

        debug!("reported {} metrics one by one", snapshot.len());
        Ok(snapshot.len())
    }

    /// Subtract a delivered counter delta from the local table
    async fn settle(&self, sent: &Metric) {
        let MetricValue::Counter(delta) = sent.value else {
            return;
        };
        let Some(negated) = delta.checked_neg() else {
            warn!("cannot settle {} with delta {delta}", sent.id);
            return;
        };
        if let Err(e) = self.store.set(Metric::counter(sent.id.clone(), negated)).await {
            error!("failed to settle {}: {e}", sent.id);
        }
    }
}

/// Poll and report on their own intervals until `shutdown` resolves
pub async fn run<F>(config: AgentConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    if config.poll_interval.is_zero() || config.report_interval.is_zero() {
        anyhow::bail!("poll and report intervals must be positive");
    }

    let mut agent = Agent::new(&config).await?;
    info!(
        "reporting to {} every {:?}, polling every {:?}",
        agent.base_url, config.report_interval, config.poll_interval
    );

    let mut poll_ticker = time::interval(config.poll_interval);
    let mut report_ticker = time::interval_at(
        Instant::now() + config.report_interval,
        config.report_interval,
    );
    report_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = poll_ticker.tick() => agent.poll().await,

            _ = report_ticker.tick() => {
                let result = if config.raw {
                    agent.report_raw().await
                } else {
                    agent.report().await
                };
                if let Err(e) = result {
                    error!("failed to report metrics: {:#}", e);
                }
            }

            _ = &mut shutdown => {
                debug!("received shutdown signal");
                break;
            }
        }
    }

    info!("agent stopped");
    Ok(())
}
