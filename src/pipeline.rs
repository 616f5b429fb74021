//! Chunk preparation and per-chunk inference orchestration.
//!
//! ```text
//! raw text ─► segment::split ─┬─ Text ──► phonemize ─► chunk_phonemes ─► tokenize ─► Chunk::Text
//!                             └─ Silence ───────────────────────────────────────────► Chunk::Silence
//! ```
//!
//! [`Orchestrator::run`] then walks the chunks strictly in order: silence
//! becomes zero samples, text goes through the inference engine at speed
//! 1.0 and is edge-trimmed.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace};

use crate::{
    chunker::chunk_phonemes,
    config::SynthConfig,
    error::{Result, SynthError},
    model::InferenceEngine,
    phonemize::Phonemizer,
    segment::{self, Segment},
    tokenize::Tokenizer,
    voice::StyleTable,
    waveform,
};

/// Sentinel token placed at both ends of every model input.
pub const PAD_TOKEN: i64 = 0;

/// Model speed input.  Playback speed is applied to the assembled waveform
/// instead, because model-level speed control degrades quality.
pub const MODEL_SPEED: f32 = 1.0;

/// One unit of the synthesis timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    Text { phonemes: String, token_ids: Vec<i64> },
    Silence { duration_seconds: f64 },
}

impl Chunk {
    pub fn is_silence(&self) -> bool {
        matches!(self, Self::Silence { .. })
    }
}

/// Turn raw request text into an ordered chunk list.
///
/// Each text segment is trimmed before phonemisation.  Pieces that tokenize
/// to nothing are dropped, so every [`Chunk::Text`] holds between 1 and
/// `budget` ids.
pub fn preprocess(
    text: &str,
    lang: &str,
    budget: usize,
    phonemizer: &dyn Phonemizer,
    tokenizer: &dyn Tokenizer,
) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for seg in segment::split(text) {
        match seg {
            Segment::Silence { duration_seconds } => {
                chunks.push(Chunk::Silence { duration_seconds });
            }
            Segment::Text(raw) => {
                let phonemes = phonemizer.phonemize(raw.trim(), lang)?;
                for piece in chunk_phonemes(&phonemes, budget, tokenizer) {
                    let token_ids = tokenizer.tokenize(&piece);
                    if token_ids.is_empty() {
                        trace!(piece = %piece, "dropping chunk with no known tokens");
                        continue;
                    }
                    chunks.push(Chunk::Text { phonemes: piece, token_ids });
                }
            }
        }
    }
    debug!(
        chunks = chunks.len(),
        silences = chunks.iter().filter(|c| c.is_silence()).count(),
        "preprocessed input"
    );
    Ok(chunks)
}

pub(crate) fn silence_too_long(duration_seconds: f64, max_seconds: f64) -> SynthError {
    SynthError::Validation(format!(
        "silence of {duration_seconds}s exceeds the {max_seconds}s limit"
    ))
}

/// Drives the inference engine over a chunk list.
pub struct Orchestrator<'a> {
    engine: &'a dyn InferenceEngine,
    sample_rate: u32,
    trim_threshold_ratio: f32,
    max_silence_seconds: f64,
}

impl<'a> Orchestrator<'a> {
    pub fn new(engine: &'a dyn InferenceEngine, config: &SynthConfig) -> Self {
        Self {
            engine,
            sample_rate: config.sample_rate,
            trim_threshold_ratio: config.trim_threshold_ratio,
            max_silence_seconds: config.max_silence_seconds,
        }
    }

    /// Synthesize every chunk in order, one buffer per chunk.
    pub fn run(&self, chunks: &[Chunk], styles: &StyleTable) -> Result<Vec<Vec<f32>>> {
        self.run_cancellable(chunks, styles, &AtomicBool::new(false))
    }

    /// Like [`run`](Self::run), but stops with [`SynthError::Cancelled`] when
    /// `cancel` is set at a chunk boundary.
    pub fn run_cancellable(
        &self,
        chunks: &[Chunk],
        styles: &StyleTable,
        cancel: &AtomicBool,
    ) -> Result<Vec<Vec<f32>>> {
        let mut buffers = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                debug!(index, "synthesis cancelled");
                return Err(SynthError::Cancelled);
            }
            let buffer = match chunk {
                Chunk::Silence { duration_seconds } => self.silence(*duration_seconds)?,
                Chunk::Text { token_ids, .. } => self.synthesize_text(token_ids, styles)?,
            };
            debug!(index, samples = buffer.len(), silence = chunk.is_silence(), "chunk done");
            buffers.push(buffer);
        }
        Ok(buffers)
    }

    fn silence(&self, duration_seconds: f64) -> Result<Vec<f32>> {
        if duration_seconds > self.max_silence_seconds {
            return Err(silence_too_long(duration_seconds, self.max_silence_seconds));
        }
        waveform::silence(duration_seconds, self.sample_rate)
            .ok_or_else(|| silence_too_long(duration_seconds, self.max_silence_seconds))
    }

    fn synthesize_text(&self, token_ids: &[i64], styles: &StyleTable) -> Result<Vec<f32>> {
        let style = styles.vector_for_len(token_ids.len()).ok_or(
            SynthError::StyleIndexOutOfRange { len: token_ids.len(), domain: styles.domain() },
        )?;

        let mut padded = Vec::with_capacity(token_ids.len() + 2);
        padded.push(PAD_TOKEN);
        padded.extend_from_slice(token_ids);
        padded.push(PAD_TOKEN);

        let raw = self
            .engine
            .infer(&padded, style, MODEL_SPEED)
            .map_err(SynthError::Inference)?;
        Ok(waveform::trim(&raw, self.trim_threshold_ratio))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{atomic::AtomicUsize, Mutex};

    use super::*;
    use crate::tokenize::IpaTokenizer;

    struct IdentityPhonemizer;

    impl Phonemizer for IdentityPhonemizer {
        fn phonemize(&self, text: &str, _lang: &str) -> Result<String> {
            Ok(text.to_string())
        }
    }

    struct CharTokenizer;

    impl Tokenizer for CharTokenizer {
        fn tokenize(&self, phonemes: &str) -> Vec<i64> {
            phonemes.chars().map(|c| c as i64).collect()
        }
    }

    /// Records every call and answers with `[0, 0.5 × n, 0]` for `n` padded ids.
    #[derive(Default)]
    struct RecordingEngine {
        calls: Mutex<Vec<(Vec<i64>, Vec<f32>, f32)>>,
        fail_on: Option<usize>,
    }

    impl InferenceEngine for RecordingEngine {
        fn infer(&self, ids: &[i64], style: &[f32], speed: f32) -> anyhow::Result<Vec<f32>> {
            let mut calls = self.calls.lock().unwrap();
            if self.fail_on == Some(calls.len()) {
                anyhow::bail!("token id out of embedding range");
            }
            calls.push((ids.to_vec(), style.to_vec(), speed));
            let mut out = vec![0.0];
            out.extend(std::iter::repeat(0.5).take(ids.len()));
            out.push(0.0);
            Ok(out)
        }
    }

    fn table(rows: usize) -> StyleTable {
        let data = (0..rows * 2).map(|i| i as f32).collect();
        StyleTable::from_flat(data, 2).unwrap()
    }

    #[test]
    fn test_end_to_end_chunk_sequence() {
        let chunks = preprocess(
            "Hello, world! This is a looonnng test. [1.5s] Test test test.",
            "en-us",
            7,
            &IdentityPhonemizer,
            &CharTokenizer,
        )
        .unwrap();
        let kinds: Vec<&str> =
            chunks.iter().map(|c| if c.is_silence() { "silence" } else { "text" }).collect();
        let mut expected = vec!["text"; 7];
        expected.push("silence");
        expected.extend(["text"; 3]);
        assert_eq!(kinds, expected);
        assert_eq!(chunks[7], Chunk::Silence { duration_seconds: 1.5 });
        for c in &chunks {
            if let Chunk::Text { token_ids, .. } = c {
                assert!(!token_ids.is_empty() && token_ids.len() <= 7);
            }
        }
    }

    #[test]
    fn test_preprocess_simple_marker() {
        let chunks =
            preprocess("Test [1.5s] test", "en-us", 1000, &IdentityPhonemizer, &CharTokenizer)
                .unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(!chunks[0].is_silence());
        assert_eq!(chunks[1], Chunk::Silence { duration_seconds: 1.5 });
        assert!(!chunks[2].is_silence());
    }

    #[test]
    fn test_preprocess_drops_untokenizable_pieces() {
        let chunks =
            preprocess("中文 [1s]", "en-us", 10, &IdentityPhonemizer, &IpaTokenizer).unwrap();
        assert_eq!(chunks, vec![Chunk::Silence { duration_seconds: 1.0 }]);
    }

    #[test]
    fn test_run_pads_selects_style_and_fixes_speed() {
        let engine = RecordingEngine::default();
        let config = SynthConfig { sample_rate: 10, ..SynthConfig::default() };
        let orch = Orchestrator::new(&engine, &config);
        let chunks = vec![
            Chunk::Text { phonemes: "ab".into(), token_ids: vec![7, 8] },
            Chunk::Silence { duration_seconds: 0.5 },
            Chunk::Text { phonemes: "c".into(), token_ids: vec![9] },
        ];

        let buffers = orch.run(&chunks, &table(4)).unwrap();
        assert_eq!(buffers.len(), 3);
        // Engine output is trimmed to the audible middle.
        assert_eq!(buffers[0], vec![0.5; 4]);
        assert_eq!(buffers[1], vec![0.0; 5]);
        assert_eq!(buffers[2], vec![0.5; 3]);

        let calls = engine.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, vec![PAD_TOKEN, 7, 8, PAD_TOKEN]);
        assert_eq!(calls[0].1, vec![2.0, 3.0]); // row for length 2
        assert_eq!(calls[1].1, vec![0.0, 1.0]); // row for length 1
        assert!(calls.iter().all(|c| c.2 == MODEL_SPEED));
    }

    #[test]
    fn test_style_out_of_range() {
        let engine = RecordingEngine::default();
        let orch = Orchestrator::new(&engine, &SynthConfig::default());
        let too_long = vec![Chunk::Text { phonemes: "abc".into(), token_ids: vec![1, 2, 3] }];
        assert!(matches!(
            orch.run(&too_long, &table(2)),
            Err(SynthError::StyleIndexOutOfRange { len: 3, domain: 2 })
        ));
        let empty = vec![Chunk::Text { phonemes: String::new(), token_ids: vec![] }];
        assert!(matches!(
            orch.run(&empty, &table(2)),
            Err(SynthError::StyleIndexOutOfRange { len: 0, .. })
        ));
    }

    #[test]
    fn test_inference_failure_is_fatal() {
        let engine = RecordingEngine { fail_on: Some(1), ..Default::default() };
        let orch = Orchestrator::new(&engine, &SynthConfig::default());
        let chunks = vec![
            Chunk::Text { phonemes: "a".into(), token_ids: vec![1] },
            Chunk::Text { phonemes: "b".into(), token_ids: vec![2] },
            Chunk::Text { phonemes: "c".into(), token_ids: vec![3] },
        ];
        let err = orch.run(&chunks, &table(4)).unwrap_err();
        assert!(matches!(err, SynthError::Inference(_)));
        assert!(err.to_string().contains("embedding range"));
        assert_eq!(engine.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_silence_over_limit_is_rejected() {
        let engine = RecordingEngine::default();
        let config = SynthConfig { max_silence_seconds: 2.0, ..SynthConfig::default() };
        let orch = Orchestrator::new(&engine, &config);
        let huge: f64 = "99999999999999999999".parse().unwrap();
        for duration_seconds in [2.5, huge, f64::INFINITY] {
            let chunks = vec![Chunk::Silence { duration_seconds }];
            assert!(matches!(orch.run(&chunks, &table(4)), Err(SynthError::Validation(_))));
        }
        let ok = vec![Chunk::Silence { duration_seconds: 2.0 }];
        assert_eq!(orch.run(&ok, &table(4)).unwrap()[0].len(), 48_000);
    }

    /// Raises the cancel flag from inside its first call.
    #[derive(Default)]
    struct CancellingEngine {
        cancel: AtomicBool,
        calls: AtomicUsize,
    }

    impl InferenceEngine for CancellingEngine {
        fn infer(&self, ids: &[i64], _style: &[f32], _speed: f32) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cancel.store(true, Ordering::SeqCst);
            Ok(vec![0.5; ids.len()])
        }
    }

    #[test]
    fn test_cancelled_between_chunks() {
        let engine = CancellingEngine::default();
        let orch = Orchestrator::new(&engine, &SynthConfig::default());
        let chunks = vec![
            Chunk::Text { phonemes: "a".into(), token_ids: vec![1] },
            Chunk::Silence { duration_seconds: 0.1 },
            Chunk::Text { phonemes: "b".into(), token_ids: vec![2] },
        ];
        assert!(matches!(
            orch.run_cancellable(&chunks, &table(4), &engine.cancel),
            Err(SynthError::Cancelled)
        ));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancelled_before_first_chunk() {
        let engine = RecordingEngine::default();
        let orch = Orchestrator::new(&engine, &SynthConfig::default());
        let chunks = vec![Chunk::Text { phonemes: "a".into(), token_ids: vec![1] }];
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            orch.run_cancellable(&chunks, &table(4), &cancel),
            Err(SynthError::Cancelled)
        ));
        assert!(engine.calls.lock().unwrap().is_empty());
    }
}
