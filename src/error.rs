//! Error taxonomy for a synthesis request.
//!
//! Adapters around external resources (ONNX session, voice files, espeak-ng)
//! work in [`anyhow::Result`] and are mapped into [`SynthError`] at the seam,
//! so callers can tell a bad request from a broken collaborator.

use thiserror::Error;

/// Everything that can fail a synthesis request.
///
/// No variant carries partial audio: any failure discards all chunk buffers
/// produced so far for that request.
#[derive(Debug, Error)]
pub enum SynthError {
    /// Malformed request: empty text, unknown voice or model, speed out of range.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Voice weight list is empty or holds a weight outside `[0, 1]`.
    #[error("invalid voice weight: {0}")]
    InvalidWeight(String),

    /// A text chunk's token length has no style vector.
    ///
    /// Unreachable when the chunker and combiner agree on the token budget.
    #[error("no style vector for chunk of {len} tokens (table covers 1..={domain})")]
    StyleIndexOutOfRange { len: usize, domain: usize },

    /// The inference engine rejected a chunk.
    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),

    /// Phonemizer or voice asset source could not be reached.
    #[error("upstream unavailable: {0:#}")]
    UpstreamUnavailable(anyhow::Error),

    /// The synthesizer was built with an unusable [`SynthConfig`](crate::SynthConfig).
    #[error("invalid configuration: {0:#}")]
    Config(anyhow::Error),

    /// The assembled waveform could not be speed-adjusted or encoded into the
    /// requested container.
    #[error("audio encoding failed: {0:#}")]
    Encoding(anyhow::Error),

    /// The caller abandoned the request between two chunks.
    #[error("synthesis cancelled")]
    Cancelled,
}

impl SynthError {
    /// `true` for failures caused by the request itself rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidWeight(_))
    }
}

pub type Result<T, E = SynthError> = std::result::Result<T, E>;
