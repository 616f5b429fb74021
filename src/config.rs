//! Synthesis configuration.
//!
//! Every value that used to be a module-level constant (context window,
//! sample rate, style dimension) lives here so tests can substitute their
//! own.  Missing JSON fields fall back to the values of the current Kokoro
//! model family.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::waveform;

/// Deserialised synthesis configuration (e.g. `synth.json`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthConfig {
    /// Maximum token sequence length the model accepts, sentinels included.
    pub context_window: usize,

    /// Sample rate of the model output, in Hz.
    pub sample_rate: u32,

    /// Length of one style vector.
    pub style_dim: usize,

    /// Fraction of the mean absolute amplitude below which edge samples are trimmed.
    pub trim_threshold_ratio: f32,

    /// Language used when a request names one the phonemizer does not know.
    pub default_language: String,

    /// Reject unknown languages instead of falling back to `default_language`.
    pub strict_language: bool,

    /// Accepted playback speed range (inclusive).
    pub min_speed: f32,
    pub max_speed: f32,

    /// Name or path of the espeak-ng executable.
    pub espeak_binary: String,

    /// Longest silence a single `[Ns]` directive may request.
    pub max_silence_seconds: f64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            context_window: 512,
            sample_rate: 24_000,
            style_dim: 256,
            trim_threshold_ratio: 0.05,
            default_language: "en-us".to_string(),
            strict_language: false,
            min_speed: 0.1,
            max_speed: 5.0,
            espeak_binary: "espeak-ng".to_string(),
            max_silence_seconds: 60.0,
        }
    }
}

impl SynthConfig {
    /// Parse a JSON document; absent fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse synth config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config: {}", path.display()))?;
        Self::from_json_str(&raw)
    }

    /// Tokens available to one chunk: the context window minus the start and
    /// end sentinels.
    pub fn token_budget(&self) -> usize {
        self.context_window.saturating_sub(2)
    }

    pub fn validate(&self) -> Result<()> {
        if self.context_window < 3 {
            bail!(
                "context_window must leave room for at least one token, got {}",
                self.context_window
            );
        }
        if self.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        if self.style_dim == 0 {
            bail!("style_dim must be positive");
        }
        if !(self.min_speed > 0.0 && self.min_speed <= self.max_speed) {
            bail!(
                "invalid speed range [{}, {}]",
                self.min_speed,
                self.max_speed
            );
        }
        if !(self.max_silence_seconds.is_finite() && self.max_silence_seconds >= 0.0) {
            bail!("max_silence_seconds must be a finite, non-negative number");
        }
        if waveform::silence_len(self.max_silence_seconds, self.sample_rate).is_none() {
            bail!(
                "max_silence_seconds {} is too long at {} Hz",
                self.max_silence_seconds,
                self.sample_rate
            );
        }
        Ok(())
    }
}
