//! Background resource monitor
//!
//! Samples the host on its own task, keeps a rolling window of readings and
//! publishes the classified load through a single-slot watch channel. It
//! never touches batch sizes; readers poll the latest state at batch
//! boundaries.

use crate::config::schema::ResourceConfig;
use crate::core::resources::sampler::{ResourceSample, ResourceSampler};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Classified host load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Room to grow batches
    Low,
    /// Hold batch size
    #[default]
    Normal,
    /// Shrink batches
    High,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoadState::Low => "low",
            LoadState::Normal => "normal",
            LoadState::High => "high",
        };
        write!(f, "{label}")
    }
}

/// Classification thresholds, in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadThresholds {
    pub cpu_high: f64,
    pub cpu_low: f64,
    pub memory_high: f64,
    pub memory_low: f64,
}

impl From<&ResourceConfig> for LoadThresholds {
    fn from(config: &ResourceConfig) -> Self {
        Self {
            cpu_high: config.cpu_high,
            cpu_low: config.cpu_low,
            memory_high: config.memory_high,
            memory_low: config.memory_low,
        }
    }
}

/// Bounded window of recent samples
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<ResourceSample>,
    capacity: usize,
}

impl SampleWindow {
    /// Create a window keeping at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a sample, evicting the oldest when full
    pub fn push(&mut self, sample: ResourceSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Number of samples held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no sample has been taken yet
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Field-wise average of the window
    pub fn average(&self) -> Option<ResourceSample> {
        if self.samples.is_empty() {
            return None;
        }
        let n = self.samples.len() as f64;
        let sum = self
            .samples
            .iter()
            .fold(ResourceSample::default(), |acc, s| ResourceSample {
                cpu_percent: acc.cpu_percent + s.cpu_percent,
                memory_percent: acc.memory_percent + s.memory_percent,
                disk_bytes_per_sec: acc.disk_bytes_per_sec + s.disk_bytes_per_sec,
                network_bytes_per_sec: acc.network_bytes_per_sec + s.network_bytes_per_sec,
            });
        Some(ResourceSample {
            cpu_percent: sum.cpu_percent / n,
            memory_percent: sum.memory_percent / n,
            disk_bytes_per_sec: sum.disk_bytes_per_sec / n,
            network_bytes_per_sec: sum.network_bytes_per_sec / n,
        })
    }

    /// Classify the window average; an empty window is normal
    pub fn classify(&self, thresholds: &LoadThresholds) -> LoadState {
        match self.average() {
            Some(avg) => classify(&avg, thresholds),
            None => LoadState::Normal,
        }
    }
}

/// Classify one (averaged) reading
pub fn classify(sample: &ResourceSample, thresholds: &LoadThresholds) -> LoadState {
    if sample.cpu_percent > thresholds.cpu_high || sample.memory_percent > thresholds.memory_high
    {
        LoadState::High
    } else if sample.cpu_percent < thresholds.cpu_low
        && sample.memory_percent < thresholds.memory_low
    {
        LoadState::Low
    } else {
        LoadState::Normal
    }
}

/// Handle to the monitor task
///
/// Dropping the handle stops the task.
pub struct ResourceMonitor {
    state: watch::Receiver<LoadState>,
    handle: Option<JoinHandle<()>>,
}

impl ResourceMonitor {
    /// Start monitoring
    ///
    /// The loop ends when `shutdown` turns true or the monitor is stopped.
    pub fn spawn<S: ResourceSampler>(
        mut sampler: S,
        config: &ResourceConfig,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (tx, rx) = watch::channel(LoadState::Normal);
        let thresholds = LoadThresholds::from(config);
        let interval = Duration::from_millis(config.sampling_interval_ms);
        let retry_delay = Duration::from_millis(config.retry_delay_ms);
        let mut window = SampleWindow::new(config.history_length);

        let handle = tokio::spawn(async move {
            let mut shutdown_open = true;
            loop {
                // Host reads hit /proc; keep them off the async workers
                let reading = tokio::task::spawn_blocking(move || {
                    let reading = sampler.sample();
                    (sampler, reading)
                })
                .await;
                let reading = match reading {
                    Ok((returned, reading)) => {
                        sampler = returned;
                        reading
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Resource sampler task failed");
                        break;
                    }
                };

                let delay = match reading {
                    Ok(sample) => {
                        window.push(sample);
                        let next = window.classify(&thresholds);
                        let previous = *tx.borrow();
                        if next != previous {
                            tracing::info!(
                                from = %previous,
                                to = %next,
                                cpu_percent = sample.cpu_percent,
                                memory_percent = sample.memory_percent,
                                "Resource load changed"
                            );
                            tx.send_replace(next);
                        }
                        tracing::trace!(
                            cpu_percent = sample.cpu_percent,
                            memory_percent = sample.memory_percent,
                            disk_bytes_per_sec = sample.disk_bytes_per_sec,
                            network_bytes_per_sec = sample.network_bytes_per_sec,
                            "Resource sample"
                        );
                        interval
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            retry_in_ms = retry_delay.as_millis() as u64,
                            "Resource sampling failed"
                        );
                        retry_delay
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = shutdown.changed(), if shutdown_open => {
                        match changed {
                            Ok(()) if *shutdown.borrow() => break,
                            Ok(()) => {}
                            Err(_) => shutdown_open = false,
                        }
                    }
                }
            }
            tracing::debug!("Resource monitor stopped");
        });

        Self {
            state: rx,
            handle: Some(handle),
        }
    }

    /// A monitor that always reports normal load
    pub fn disabled() -> Self {
        let (_tx, rx) = watch::channel(LoadState::Normal);
        Self {
            state: rx,
            handle: None,
        }
    }

    /// Latest published state
    pub fn state(&self) -> LoadState {
        *self.state.borrow()
    }

    /// Receiver for the published state
    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state.clone()
    }

    /// Whether a sampling task is running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the task and wait for it to exit
    pub async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
