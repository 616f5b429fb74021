//! Command-line synthesis.
//!
//! Usage:
//!   kokoro-synth --model model_q8f16.onnx --voices voices/ \
//!       --voice af_heart:0.7 --voice am_adam:0.3 \
//!       --text "Hello there. [1s] Goodbye." --output out.wav
//!
//! Requirements:
//!   - espeak-ng on $PATH (apk add espeak-ng / apt install espeak-ng)

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use kokoro_synth::{
    DirVoiceSource, EspeakPhonemizer, IpaTokenizer, NpzVoiceSource, OnnxEngine, OutputFormat,
    SynthConfig, SynthesisRequest, Synthesizer, VoiceSource, VoiceWeight,
};

#[derive(Debug, Parser)]
#[command(name = "kokoro-synth", about = "Synthesize speech with a Kokoro ONNX model")]
struct Args {
    /// Text to speak; `[1.5s]` inserts 1.5 seconds of silence.
    #[arg(long)]
    text: String,

    /// Language id (e.g. en-us, en-gb, es, fr).
    #[arg(long, default_value = "en-us")]
    lang: String,

    /// Voice and optional weight, `id[:weight]`.  Repeat to blend voices.
    #[arg(long = "voice", value_parser = parse_voice, required = true)]
    voice: Vec<VoiceWeight>,

    /// Path to the ONNX model.
    #[arg(long)]
    model: PathBuf,

    /// Directory of `<voice>.bin` files, or a `.npz` voice archive.
    #[arg(long = "voices")]
    voice_store: PathBuf,

    /// Playback speed multiplier.
    #[arg(long, default_value_t = 1.0)]
    speed: f32,

    /// Output container: wav or mp3.
    #[arg(long, default_value = "wav")]
    format: OutputFormat,

    #[arg(long, default_value = "output.wav")]
    output: PathBuf,

    /// Optional JSON config overriding the model defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_voice(s: &str) -> Result<VoiceWeight> {
    match s.split_once(':') {
        Some((id, w)) => {
            let weight = w.parse::<f32>().with_context(|| format!("bad weight in '{s}'"))?;
            Ok(VoiceWeight::new(id, weight))
        }
        None if !s.is_empty() => Ok(VoiceWeight::new(s, 1.0)),
        None => bail!("empty voice id"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SynthConfig::from_json_file(path)?,
        None => SynthConfig::default(),
    };

    let phonemizer = EspeakPhonemizer::new(&config.espeak_binary, &config.default_language);
    if !phonemizer.is_available() {
        tracing::warn!(
            binary = %config.espeak_binary,
            "espeak-ng not found; install it with `apk add espeak-ng`, `apt install espeak-ng` or `brew install espeak-ng`"
        );
    }

    let voices: Box<dyn VoiceSource> =
        if args.voice_store.extension().is_some_and(|ext| ext == "npz") {
            Box::new(NpzVoiceSource::open(&args.voice_store)?)
        } else {
            Box::new(DirVoiceSource::new(&args.voice_store))
        };

    let model_id = args
        .model
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    let engine = OnnxEngine::load(&args.model)?;

    let tts = Synthesizer::new(config, Box::new(phonemizer), Box::new(IpaTokenizer), voices)?
        .with_engine(model_id.clone(), Box::new(engine));

    let request = SynthesisRequest {
        text: args.text,
        language_id: args.lang,
        voice_weights: args.voice,
        model_id,
        speed: args.speed,
        output_format: args.format,
        use_accelerated_backend: false,
    };

    let audio = tts.synthesize_encoded(&request)?;
    std::fs::write(&args.output, &audio.bytes)
        .with_context(|| format!("Cannot write {}", args.output.display()))?;

    tracing::info!(
        bytes = audio.bytes.len(),
        mime = audio.mime_type,
        path = %args.output.display(),
        "saved"
    );
    Ok(())
}
