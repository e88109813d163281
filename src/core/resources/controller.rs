//! Adaptive batch sizing

use crate::config::schema::BatchConfig;
use crate::core::resources::monitor::LoadState;

/// Batch sizing state of one run
///
/// The size only changes through [`BatchContext::adjust`] and always stays
/// within `[min_size, max_size]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchContext {
    batch_size: usize,
    min_size: usize,
    max_size: usize,
    growth_factor: f64,
    shrink_factor: f64,
    resource_state: LoadState,
    documents_in_flight: usize,
}

impl BatchContext {
    /// Create a context starting at `initial_size`
    pub fn new(config: &BatchConfig) -> Self {
        let min_size = config.min_size.max(1);
        let max_size = config.max_size.max(min_size);
        Self {
            batch_size: config.initial_size.clamp(min_size, max_size),
            min_size,
            max_size,
            growth_factor: config.growth_factor,
            shrink_factor: config.shrink_factor,
            resource_state: LoadState::Normal,
            documents_in_flight: 0,
        }
    }

    /// Current batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Last load state applied
    pub fn resource_state(&self) -> LoadState {
        self.resource_state
    }

    /// Documents of the batch currently being processed
    pub fn documents_in_flight(&self) -> usize {
        self.documents_in_flight
    }

    /// Record the size of the batch being processed
    pub fn set_in_flight(&mut self, documents: usize) {
        self.documents_in_flight = documents;
    }

    /// Apply a load reading and return the next batch size
    ///
    /// Low load grows by `growth_factor` (at least one document), high load
    /// shrinks by `shrink_factor` (at least one document), normal holds.
    pub fn adjust(&mut self, state: LoadState) -> usize {
        let current = self.batch_size;
        let next = match state {
            LoadState::Low => {
                let grown = (current as f64 * self.growth_factor).ceil() as usize;
                grown.max(current.saturating_add(1))
            }
            LoadState::High => {
                let shrunk = (current as f64 * self.shrink_factor).floor() as usize;
                shrunk.min(current.saturating_sub(1))
            }
            LoadState::Normal => current,
        }
        .clamp(self.min_size, self.max_size);

        if next != current {
            tracing::debug!(
                from = current,
                to = next,
                load = %state,
                "Batch size adjusted"
            );
        }
        self.resource_state = state;
        self.batch_size = next;
        next
    }
}
