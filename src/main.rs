//! Audio Insight - prints live metrics for one audio source

mod cli;

use audio_insight::{
    list_sources, AnalysisSession, AudioMetrics, CpalBackend, FrameAnalyzer, MetricsBoard,
    SignalSourceAdapter,
};
use clap::Parser;
use cli::Args;
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    if args.list_sources {
        for source in list_sources()? {
            println!("{:<48} {}", source.id, source.name);
        }
        return Ok(());
    }

    let config = args.load_config()?;
    let adapter = SignalSourceAdapter::new(CpalBackend, config.clone())?;
    let board = MetricsBoard::new();
    let reader = board.reader();

    // A failed open is reported once; retrying is left to the user
    let handle = match adapter.open(&args.source) {
        Ok(handle) => handle,
        Err(e) => {
            board.fail(e.to_string());
            log::error!("Could not open {}: {}", args.source, e);
            print_metrics(&reader.latest(), args.json)?;
            return Err(e.into());
        }
    };

    let session = AnalysisSession::start(
        handle,
        FrameAnalyzer::from(&config),
        board,
        Duration::from_millis(config.refresh_interval_ms),
    );

    let seconds = if args.seconds.is_finite() {
        args.seconds.clamp(0.0, 86_400.0)
    } else {
        0.0
    };
    let deadline = Instant::now() + Duration::from_secs_f32(seconds);
    let mut ticker = tokio::time::interval(Duration::from_millis(args.print_every_ms.max(1)));

    while Instant::now() < deadline && !session.is_finished() {
        ticker.tick().await;
        print_metrics(&reader.latest(), args.json)?;
    }

    session.stop().await;

    let status = reader.status();
    log::info!("Analyzed {} frames", status.frames_analyzed);
    if let Some(error) = status.error {
        anyhow::bail!("analysis stopped: {}", error);
    }

    Ok(())
}

fn print_metrics(metrics: &AudioMetrics, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(metrics)?);
    } else {
        println!(
            "peak {:7.1} dB  rms {:7.1} dB  crest {:5.2}  centroid {:7.0} Hz  flatness {:.3}  rolloff {:7.0} Hz  zc {:4}",
            metrics.peak_level_db,
            metrics.rms_level_db,
            metrics.crest_factor,
            metrics.spectral_centroid_hz,
            metrics.spectral_flatness,
            metrics.spectral_rolloff_hz,
            metrics.zero_crossings,
        );
    }
    Ok(())
}
