//! # kokoro-synth
//!
//! Chunked text-to-speech orchestration for Kokoro-family ONNX models.
//!
//! The model only accepts a fixed number of tokens per call, so long input is
//! cut into model-sized chunks, each chunk is synthesized with the style
//! vector matching its token length, and the per-chunk audio is trimmed and
//! stitched back together.  Inline directives such as `[1.5s]` insert literal
//! silence.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::path::Path;
//! use kokoro_synth::{
//!     DirVoiceSource, EspeakPhonemizer, IpaTokenizer, OnnxEngine, SynthConfig,
//!     SynthesisRequest, Synthesizer, VoiceWeight,
//! };
//!
//! let config = SynthConfig::default();
//! let phonemizer = EspeakPhonemizer::new(&config.espeak_binary, &config.default_language);
//! let engine = OnnxEngine::load(Path::new("model_q8f16.onnx")).unwrap();
//!
//! let tts = Synthesizer::new(
//!     config,
//!     Box::new(phonemizer),
//!     Box::new(IpaTokenizer),
//!     Box::new(DirVoiceSource::new("voices")),
//! )
//! .unwrap()
//! .with_engine("model_q8f16", Box::new(engine));
//!
//! let audio = tts
//!     .synthesize_encoded(&SynthesisRequest {
//!         text: "Sometimes you win [1.5s] sometimes you learn.".into(),
//!         language_id: "en-us".into(),
//!         voice_weights: vec![VoiceWeight::new("af_heart", 0.7), VoiceWeight::new("am_adam", 0.3)],
//!         model_id: "model_q8f16".into(),
//!         speed: 1.0,
//!         output_format: Default::default(),
//!         use_accelerated_backend: false,
//!     })
//!     .unwrap();
//! std::fs::write("out.wav", &audio.bytes).unwrap();
//! ```
//!
//! ## Pipeline
//! 1. **Segment**: split raw text on `[Ns]` silence directives.
//! 2. **Phonemize**: each text segment goes through espeak-ng.
//! 3. **Chunk**: phonemes are cut at punctuation so each chunk fits the
//!    token budget (context window minus two sentinels).
//! 4. **Blend**: weighted voices are averaged into one length-indexed style table.
//! 5. **Infer**: chunks run in order; silence becomes zero samples.
//! 6. **Trim + concat**: near-silent edges are trimmed per chunk, then all
//!    buffers are concatenated.
//! 7. **Speed + encode**: playback speed is applied to the whole waveform,
//!    then WAV or MP3 encoding.

pub mod chunker;
pub mod config;
pub mod encode;
pub mod error;
pub mod model;
pub mod npz;
pub mod phonemize;
pub mod pipeline;
pub mod segment;
pub mod synth;
pub mod tokenize;
pub mod voice;
pub mod waveform;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use config::SynthConfig;
pub use encode::{EncodedAudio, OutputFormat};
pub use error::SynthError;
pub use model::{InferenceEngine, OnnxEngine};
pub use phonemize::{EspeakPhonemizer, Phonemizer};
pub use pipeline::{Chunk, Orchestrator};
pub use segment::Segment;
pub use synth::{SynthesisRequest, SynthesizedAudio, Synthesizer};
pub use tokenize::{IpaTokenizer, Tokenizer};
pub use voice::{DirVoiceSource, NpzVoiceSource, StyleTable, VoiceSource, VoiceWeight};
