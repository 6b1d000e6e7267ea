//! Tick loop: one frame analyzed and published per refresh until stopped

use crate::adapter::StreamHandle;
use crate::analyzer::FrameAnalyzer;
use crate::state::{MetricsBoard, MetricsReader};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A running analysis loop over one stream.
///
/// Stopping cancels future ticks only; the tick in progress always completes.
/// The stream handle is closed when the loop exits, whether it was stopped or
/// the stream failed.
pub struct AnalysisSession {
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
    reader: MetricsReader,
}

impl AnalysisSession {
    /// Spawn the loop on the current tokio runtime
    pub fn start(
        handle: StreamHandle,
        analyzer: FrameAnalyzer,
        board: MetricsBoard,
        refresh: Duration,
    ) -> Self {
        board.start(handle.source_id(), handle.sample_rate(), handle.bin_count());

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let reader = board.reader();
        let refresh = refresh.max(Duration::from_millis(1));

        let task = tokio::spawn(run_ticks(handle, analyzer, board, refresh, shutdown_rx));

        Self {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
            reader,
        }
    }

    pub fn reader(&self) -> &MetricsReader {
        &self.reader
    }

    /// True once the loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Stop scheduling ticks and wait for the loop to release its stream
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("Analysis task failed: {}", e);
            }
        }
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        // Dropping the sender closes the channel, which ends the loop
        self.shutdown_tx.take();
    }
}

async fn run_ticks(
    mut handle: StreamHandle,
    analyzer: FrameAnalyzer,
    board: MetricsBoard,
    refresh: Duration,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut interval = tokio::time::interval(refresh);
    // Late ticks are dropped, never queued
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    log::info!(
        "Analysis started on {} every {:?}",
        handle.source_id(),
        refresh
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                log::info!("Analysis received shutdown signal");
                break;
            }
            _ = interval.tick() => {
                match handle.next_frame() {
                    Ok(frame) => board.publish(analyzer.analyze(frame)),
                    Err(e) => {
                        log::error!("Analysis stopped on {}: {}", handle.source_id(), e);
                        board.fail(e.to_string());
                        break;
                    }
                }
            }
        }
    }

    handle.close();
    board.stop();
    log::info!("Analysis stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::tests::{adapter, MockBackend};

    fn mock(frequency: f32) -> MockBackend {
        MockBackend {
            frequency,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn session_publishes_until_stopped() {
        let adapter = adapter(mock(3000.0));
        let handle = adapter.open("input:mic").unwrap();
        let session = AnalysisSession::start(
            handle,
            FrameAnalyzer::default(),
            MetricsBoard::new(),
            Duration::from_millis(5),
        );
        let reader = session.reader().clone();

        tokio::time::sleep(Duration::from_millis(60)).await;

        let state = reader.snapshot();
        assert!(state.status.running);
        assert!(state.status.frames_analyzed >= 1);
        assert_eq!(state.status.sample_rate, 48000);
        assert_eq!(state.status.frequency_bin_count, 256);
        assert!(state.metrics.spectral_centroid_hz > 0.0);
        assert!(state.metrics.crest_factor >= 1.0);

        session.stop().await;

        assert!(!reader.status().running);
        assert_eq!(adapter.active_taps(), 0);
    }

    #[tokio::test]
    async fn detached_stream_ends_session_with_error() {
        let adapter = adapter(mock(3000.0));
        let handle = adapter.open("system_audio").unwrap();
        let session = AnalysisSession::start(
            handle,
            FrameAnalyzer::default(),
            MetricsBoard::new(),
            Duration::from_millis(5),
        );

        let _replacement = adapter.open("system_audio").unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(session.is_finished());
        let status = session.reader().status();
        assert!(!status.running);
        assert!(status.error.is_some());
        // The replacement tap survives the old session's cleanup
        assert!(adapter.is_active("system_audio"));

        session.stop().await;
    }

    #[tokio::test]
    async fn dropping_session_releases_stream() {
        let adapter = adapter(mock(1000.0));
        let handle = adapter.open("input:mic").unwrap();
        let session = AnalysisSession::start(
            handle,
            FrameAnalyzer::default(),
            MetricsBoard::new(),
            Duration::from_millis(5),
        );

        drop(session);
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(adapter.active_taps(), 0);
    }
}
