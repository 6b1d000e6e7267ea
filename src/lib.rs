//! Audio Insight Library
//!
//! Real-time feature extraction from a live audio source. A tap on the
//! source yields one frame per display refresh; each frame is reduced to a
//! fixed set of level and spectral metrics that replace the previous ones.
//!
//! ```no_run
//! use audio_insight::{
//!     AnalysisSession, AudioConfig, CpalBackend, FrameAnalyzer, MetricsBoard,
//!     SignalSourceAdapter,
//! };
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AudioConfig::default();
//! let adapter = SignalSourceAdapter::new(CpalBackend, config.clone())?;
//! let handle = adapter.open("system_audio")?;
//!
//! let board = MetricsBoard::new();
//! let reader = board.reader();
//! let session = AnalysisSession::start(
//!     handle,
//!     FrameAnalyzer::from(&config),
//!     board,
//!     Duration::from_millis(config.refresh_interval_ms),
//! );
//!
//! println!("{:?}", reader.latest());
//! session.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod analyzer;
pub mod audio;
pub mod config;
pub mod frame;
pub mod metrics;
pub mod session;
pub mod state;

pub use adapter::{AdapterError, AudioBackend, SignalSourceAdapter, StreamHandle, Tap};
pub use analyzer::{analyze, FrameAnalyzer};
pub use audio::{list_sources, AudioConfig, AudioSource, CpalBackend};
pub use config::ConfigError;
pub use frame::{FrameError, SampleFrame};
pub use metrics::AudioMetrics;
pub use session::AnalysisSession;
pub use state::{MetricsBoard, MetricsReader, PipelineStatus};
