//! Latest-metrics slot shared between the tick loop and rendering code

use crate::metrics::AudioMetrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pipeline status, for showing an inert placeholder when analysis is not running
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PipelineStatus {
    pub running: bool,
    pub source_id: Option<String>,
    pub sample_rate: u32,
    pub frequency_bin_count: usize,
    pub frames_analyzed: u64,
    pub error: Option<String>,
}

/// Pipeline state
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// Metrics of the most recent frame
    pub metrics: AudioMetrics,

    /// Pipeline status
    pub status: PipelineStatus,
}

/// Writer side of the slot. Held by the tick loop.
#[derive(Clone, Default)]
pub struct MetricsBoard(Arc<Mutex<PipelineState>>);

impl MetricsBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view for rendering code
    pub fn reader(&self) -> MetricsReader {
        MetricsReader(self.0.clone())
    }

    /// Mark the pipeline as running on a stream
    pub fn start(&self, source_id: &str, sample_rate: u32, frequency_bin_count: usize) {
        let mut state = self.0.lock();
        state.status = PipelineStatus {
            running: true,
            source_id: Some(source_id.to_string()),
            sample_rate,
            frequency_bin_count,
            frames_analyzed: 0,
            error: None,
        };
    }

    /// Replace the latest metrics
    pub fn publish(&self, metrics: AudioMetrics) {
        let mut state = self.0.lock();
        state.metrics = metrics;
        state.status.frames_analyzed += 1;
    }

    /// Record a failure that stopped (or prevented) analysis
    pub fn fail(&self, error: impl Into<String>) {
        let mut state = self.0.lock();
        state.status.running = false;
        state.status.error = Some(error.into());
    }

    /// Mark the pipeline as stopped, keeping the last metrics and any error
    pub fn stop(&self) {
        self.0.lock().status.running = false;
    }
}

/// Read-only view of the slot
#[derive(Clone)]
pub struct MetricsReader(Arc<Mutex<PipelineState>>);

impl MetricsReader {
    /// Metrics of the most recent frame
    pub fn latest(&self) -> AudioMetrics {
        self.0.lock().metrics.clone()
    }

    pub fn status(&self) -> PipelineStatus {
        self.0.lock().status.clone()
    }

    /// Metrics and status read under one lock
    pub fn snapshot(&self) -> PipelineState {
        self.0.lock().clone()
    }
}
