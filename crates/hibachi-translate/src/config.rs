//! Service configuration.
//!
//! Plain values only; reading them from a file or command line is the
//! embedding application's business.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::communication::BatchBudget;
use crate::engine::ComputeResource;
use crate::error::{Result, TranslateError};

/// Configuration consumed by [`TranslationService`](crate::TranslationService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Longest time (ms) the oldest queued sentence waits before an
    /// underfull batch is dispatched
    pub queue_timeout_ms: u64,

    /// Number of CPU workers. Ignored when `devices` is not empty.
    pub max_workers: usize,

    /// Accelerator device ids; one worker is started per device
    pub devices: Vec<usize>,

    /// Maximum sentences per batch
    pub max_batch_sentences: usize,

    /// Maximum input tokens per batch. Also the longest sentence accepted.
    pub max_batch_tokens: usize,

    /// Formed batches that may wait for an idle worker before new
    /// submissions are rejected
    pub dispatch_queue_capacity: usize,

    /// Sentences that may sit in the job queue at once
    pub max_queued_sentences: usize,

    /// Upper bound on a request's `n_best`
    pub max_n_best: usize,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue_timeout_ms: 100,
            max_workers: default_workers(),
            devices: vec![],
            max_batch_sentences: 32,
            max_batch_tokens: 2048,
            dispatch_queue_capacity: 4,
            max_queued_sentences: 10_000,
            max_n_best: 8,
        }
    }
}

impl ServiceConfig {
    pub fn with_queue_timeout_ms(mut self, ms: u64) -> Self {
        self.queue_timeout_ms = ms;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_devices(mut self, devices: Vec<usize>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_max_batch_sentences(mut self, sentences: usize) -> Self {
        self.max_batch_sentences = sentences;
        self
    }

    pub fn with_max_batch_tokens(mut self, tokens: usize) -> Self {
        self.max_batch_tokens = tokens;
        self
    }

    pub fn with_dispatch_queue_capacity(mut self, capacity: usize) -> Self {
        self.dispatch_queue_capacity = capacity;
        self
    }

    pub fn with_max_queued_sentences(mut self, sentences: usize) -> Self {
        self.max_queued_sentences = sentences;
        self
    }

    pub fn with_max_n_best(mut self, n_best: usize) -> Self {
        self.max_n_best = n_best;
        self
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub fn budget(&self) -> BatchBudget {
        BatchBudget::new(self.max_batch_sentences, self.max_batch_tokens)
    }

    /// One resource per worker: every listed device, or `max_workers` CPU slots.
    pub fn compute_resources(&self) -> Vec<ComputeResource> {
        if self.devices.is_empty() {
            (0..self.max_workers)
                .map(|slot| ComputeResource::Cpu { slot })
                .collect()
        } else {
            self.devices
                .iter()
                .map(|&id| ComputeResource::Device { id })
                .collect()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_batch_sentences", self.max_batch_sentences),
            ("max_batch_tokens", self.max_batch_tokens),
            ("dispatch_queue_capacity", self.dispatch_queue_capacity),
            ("max_queued_sentences", self.max_queued_sentences),
            ("max_n_best", self.max_n_best),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(TranslateError::InvalidConfig(format!("{name} must be > 0")));
        }
        if self.devices.is_empty() && self.max_workers == 0 {
            return Err(TranslateError::InvalidConfig(
                "max_workers must be > 0 when no devices are configured".into(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(id) = self.devices.iter().find(|id| !seen.insert(**id)) {
            return Err(TranslateError::InvalidConfig(format!(
                "device {id} is listed more than once"
            )));
        }
        Ok(())
    }
}
