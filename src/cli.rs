//! Command-line argument parsing.

use audio_insight::audio::SYSTEM_AUDIO_ID;
use audio_insight::{AudioConfig, ConfigError};
use clap::Parser;
use std::path::PathBuf;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "audio-insight")]
#[command(about = "Live audio levels and spectral features", long_about = None)]
pub struct Args {
    /// List capture sources and exit
    #[arg(long)]
    pub list_sources: bool,

    /// Source id to analyze (see --list-sources)
    #[arg(long, value_name = "ID", default_value = SYSTEM_AUDIO_ID)]
    pub source: String,

    /// JSON config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Frequency bins per frame (power of two), overrides the config
    #[arg(long, value_name = "N")]
    pub bins: Option<usize>,

    /// How long to analyze before exiting
    #[arg(long, value_name = "SECONDS", default_value = "10")]
    pub seconds: f32,

    /// Interval between printed readings
    #[arg(long, value_name = "MS", default_value = "250")]
    pub print_every_ms: u64,

    /// Print one JSON object per reading
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// Config file (or defaults) with command-line overrides applied
    pub fn load_config(&self) -> Result<AudioConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => AudioConfig::from_json_file(path)?,
            None => AudioConfig::default(),
        };
        if let Some(bins) = self.bins {
            config.frequency_bin_count = bins;
        }
        config.validate()?;
        Ok(config)
    }
}
