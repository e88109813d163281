//! Resource monitoring and adaptive batch sizing
//!
//! - [`sampler`] - host utilization readings behind a trait
//! - [`monitor`] - background sampling task publishing a [`LoadState`]
//! - [`controller`] - [`BatchContext`], the bounded batch size of a run

pub mod controller;
pub mod monitor;
pub mod sampler;

pub use controller::BatchContext;
pub use monitor::{LoadState, LoadThresholds, ResourceMonitor, SampleWindow};
pub use sampler::{ResourceSample, ResourceSampler, SysinfoSampler};
