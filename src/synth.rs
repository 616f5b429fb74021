//! Request-level entry point: validation, style blending, chunk
//! orchestration and final assembly.

use std::{
    collections::BTreeMap,
    sync::atomic::AtomicBool,
};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    config::SynthConfig,
    encode::{self, EncodedAudio, OutputFormat},
    error::{Result, SynthError},
    model::InferenceEngine,
    phonemize::Phonemizer,
    pipeline::{self, Chunk, Orchestrator},
    segment::{self, Segment},
    tokenize::Tokenizer,
    voice::{self, VoiceSource, VoiceWeight},
    waveform,
};

fn default_speed() -> f32 {
    1.0
}

/// A caller's synthesis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisRequest {
    pub text: String,
    pub language_id: String,
    pub voice_weights: Vec<VoiceWeight>,
    pub model_id: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub use_accelerated_backend: bool,
}

/// The assembled waveform before container encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SynthesizedAudio {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Owns the collaborators shared by every request.
pub struct Synthesizer {
    config: SynthConfig,
    phonemizer: Box<dyn Phonemizer>,
    tokenizer: Box<dyn Tokenizer>,
    voices: Box<dyn VoiceSource>,
    engines: BTreeMap<String, Box<dyn InferenceEngine>>,
}

impl Synthesizer {
    /// Fails with [`SynthError::Config`] if `config` does not pass
    /// [`SynthConfig::validate`].
    pub fn new(
        config: SynthConfig,
        phonemizer: Box<dyn Phonemizer>,
        tokenizer: Box<dyn Tokenizer>,
        voices: Box<dyn VoiceSource>,
    ) -> Result<Self> {
        config.validate().map_err(SynthError::Config)?;
        Ok(Self { config, phonemizer, tokenizer, voices, engines: BTreeMap::new() })
    }

    /// Register an inference engine under `model_id`.
    pub fn with_engine(mut self, model_id: impl Into<String>, engine: Box<dyn InferenceEngine>) -> Self {
        self.engines.insert(model_id.into(), engine);
        self
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Registered model ids, sorted.
    pub fn models(&self) -> Vec<String> {
        self.engines.keys().cloned().collect()
    }

    pub fn voices(&self) -> Vec<String> {
        self.voices.voice_ids()
    }

    /// Supported `(id, name)` language pairs.
    pub fn languages(&self) -> &'static [(&'static str, &'static str)] {
        crate::phonemize::LANGUAGES
    }

    /// Reject a malformed request before any work is done.
    pub fn validate(&self, req: &SynthesisRequest) -> Result<()> {
        if req.text.trim().is_empty() {
            return Err(SynthError::Validation("text is required".into()));
        }
        let Some(engine) = self.engines.get(&req.model_id) else {
            return Err(SynthError::Validation(format!(
                "unknown model '{}', use one of: {}",
                req.model_id,
                self.models().join(", ")
            )));
        };
        if !req.speed.is_finite()
            || req.speed < self.config.min_speed
            || req.speed > self.config.max_speed
        {
            return Err(SynthError::Validation(format!(
                "speed {} is outside [{}, {}]",
                req.speed, self.config.min_speed, self.config.max_speed
            )));
        }
        if let Some(duration) = segment::split(&req.text).into_iter().find_map(|seg| match seg {
            Segment::Silence { duration_seconds }
                if duration_seconds > self.config.max_silence_seconds =>
            {
                Some(duration_seconds)
            }
            _ => None,
        }) {
            return Err(pipeline::silence_too_long(duration, self.config.max_silence_seconds));
        }
        voice::validate_weights(&req.voice_weights)?;
        if let Some(unknown) = req.voice_weights.iter().find(|w| !self.voices.contains(&w.voice_id)) {
            return Err(SynthError::Validation(format!("unknown voice '{}'", unknown.voice_id)));
        }
        if self.config.strict_language && !self.phonemizer.supports_language(&req.language_id) {
            return Err(SynthError::Validation(format!(
                "unsupported language '{}'",
                req.language_id
            )));
        }
        if !req.output_format.is_supported() {
            return Err(SynthError::Validation(format!(
                "output format {:?} is not available in this build",
                req.output_format
            )));
        }
        if req.use_accelerated_backend && !engine.supports_acceleration() {
            return Err(SynthError::Validation(format!(
                "model '{}' has no accelerated backend",
                req.model_id
            )));
        }
        Ok(())
    }

    /// Split, phonemize, chunk and tokenize `text`.
    pub fn preprocess(&self, text: &str, lang: &str) -> Result<Vec<Chunk>> {
        pipeline::preprocess(
            text,
            lang,
            self.config.token_budget(),
            self.phonemizer.as_ref(),
            self.tokenizer.as_ref(),
        )
    }

    pub fn synthesize(&self, req: &SynthesisRequest) -> Result<SynthesizedAudio> {
        self.synthesize_cancellable(req, &AtomicBool::new(false))
    }

    /// Run a request, giving up with [`SynthError::Cancelled`] once `cancel`
    /// is set.  The flag is checked between chunks.
    pub fn synthesize_cancellable(
        &self,
        req: &SynthesisRequest,
        cancel: &AtomicBool,
    ) -> Result<SynthesizedAudio> {
        self.validate(req)?;
        let engine = self
            .engines
            .get(&req.model_id)
            .ok_or_else(|| SynthError::Validation(format!("unknown model '{}'", req.model_id)))?;

        let styles = voice::combine(&req.voice_weights, self.voices.as_ref(), self.config.style_dim)?;
        let chunks = self.preprocess(&req.text, &req.language_id)?;

        let buffers = Orchestrator::new(engine.as_ref(), &self.config)
            .run_cancellable(&chunks, &styles, cancel)?;
        let assembled = waveform::assemble(&buffers);
        let samples =
            waveform::apply_speed(&assembled, req.speed).map_err(SynthError::Encoding)?;

        let audio = SynthesizedAudio { samples, sample_rate: self.config.sample_rate };
        info!(
            model = %req.model_id,
            lang = %req.language_id,
            chunks = chunks.len(),
            seconds = audio.duration_secs(),
            "synthesized"
        );
        Ok(audio)
    }

    /// Synthesize and encode into the requested container.
    pub fn synthesize_encoded(&self, req: &SynthesisRequest) -> Result<EncodedAudio> {
        let audio = self.synthesize(req)?;
        encode::encode(&audio.samples, audio.sample_rate, req.output_format)
            .map_err(SynthError::Encoding)
    }
}
