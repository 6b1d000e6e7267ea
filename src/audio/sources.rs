//! Audio source enumeration

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source id of the default output device captured as loopback
pub const SYSTEM_AUDIO_ID: &str = "system_audio";

/// Audio source information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSource {
    /// Unique identifier for the source
    pub id: String,

    /// Display name
    pub name: String,

    /// Source type
    pub source_type: SourceType,
}

/// Type of audio source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// System-wide audio (loopback)
    SystemAudio,

    /// Input device (microphone, line in)
    InputDevice,
}

/// Audio source errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to enumerate devices: {0}")]
    EnumerationError(String),
}

/// Parsed form of a source id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceSelector<'a> {
    /// Default output device, captured as loopback
    SystemAudio,
    /// Named output device, captured as loopback
    Output(&'a str),
    /// Named input device
    Input(&'a str),
}

impl<'a> SourceSelector<'a> {
    /// Parse a source id. Returns `None` for an empty or unknown id.
    pub(crate) fn parse(id: &'a str) -> Option<Self> {
        if id == SYSTEM_AUDIO_ID {
            return Some(Self::SystemAudio);
        }
        if let Some(name) = id.strip_prefix("output:") {
            return (!name.is_empty()).then_some(Self::Output(name));
        }
        if let Some(name) = id.strip_prefix("input:") {
            return (!name.is_empty()).then_some(Self::Input(name));
        }
        None
    }

    /// True when the selector captures an output device
    pub(crate) fn is_loopback(&self) -> bool {
        matches!(self, Self::SystemAudio | Self::Output(_))
    }
}

/// List available audio sources
pub fn list_sources() -> Result<Vec<AudioSource>, SourceError> {
    let mut sources = Vec::new();

    let host = cpal::default_host();
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    // System audio loopback first (uses default output device)
    if let Some(ref device_name) = default_output_name {
        sources.push(AudioSource {
            id: SYSTEM_AUDIO_ID.to_string(),
            name: format!("System Audio ({})", device_name),
            source_type: SourceType::SystemAudio,
        });
    }

    // Output devices as loopback sources
    match host.output_devices() {
        Ok(devices) => {
            for device in devices {
                let Ok(name) = device.name() else { continue };
                // Already listed as "System Audio"
                if default_output_name.as_deref() == Some(name.as_str()) {
                    continue;
                }
                sources.push(AudioSource {
                    id: format!("output:{}", name),
                    name: format!("Loopback: {}", name),
                    source_type: SourceType::SystemAudio,
                });
            }
        }
        Err(e) => log::warn!("Failed to enumerate output devices: {}", e),
    }

    // Input devices
    let devices = host
        .input_devices()
        .map_err(|e| SourceError::EnumerationError(e.to_string()))?;
    for device in devices {
        if let Ok(name) = device.name() {
            sources.push(AudioSource {
                id: format!("input:{}", name),
                name: format!("Input: {}", name),
                source_type: SourceType::InputDevice,
            });
        }
    }

    Ok(sources)
}
