//! Inference engines.
//!
//! [`OnnxEngine`] runs a Kokoro ONNX graph with [`ort`].  The three model
//! inputs are positional:
//!
//! | Name        | Shape         | dtype   |
//! |-------------|---------------|---------|
//! | `input_ids` | `[1, seq_len]`| int64   |
//! | `style`     | `[1, style_d]`| float32 |
//! | `speed`     | `[1]`         | float32 |

use std::{path::Path, sync::Mutex};

use anyhow::{anyhow, Context, Result};
use ort::{session::Session, value::Tensor};
use tracing::{debug, info};

/// Runs one model invocation.
///
/// `ids` already carry the sentinel token at both ends.  Implementations
/// serialise access internally; callers may share an engine across threads.
pub trait InferenceEngine: Send + Sync {
    fn infer(&self, ids: &[i64], style: &[f32], speed: f32) -> Result<Vec<f32>>;

    /// Whether the engine runs on a hardware-accelerated backend.
    fn supports_acceleration(&self) -> bool {
        false
    }
}

/// A CPU ONNX Runtime session.
pub struct OnnxEngine {
    session: Mutex<Session>,
}

impl OnnxEngine {
    pub fn load(model_path: &Path) -> Result<Self> {
        let session = Session::builder()
            .context("Failed to create ORT session builder")?
            .commit_from_file(model_path)
            .with_context(|| format!("Cannot load ONNX model: {}", model_path.display()))?;
        info!(path = %model_path.display(), "loaded ONNX model");
        Ok(Self { session: Mutex::new(session) })
    }
}

impl InferenceEngine for OnnxEngine {
    fn infer(&self, ids: &[i64], style: &[f32], speed: f32) -> Result<Vec<f32>> {
        let t_input_ids = Tensor::<i64>::from_array(([1usize, ids.len()], ids.to_vec()))
            .context("Failed to build input_ids tensor")?;
        let t_style = Tensor::<f32>::from_array(([1usize, style.len()], style.to_vec()))
            .context("Failed to build style tensor")?;
        let t_speed = Tensor::<f32>::from_array(([1usize], vec![speed]))
            .context("Failed to build speed tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("ORT session mutex poisoned"))?;
        let outputs = session
            .run(ort::inputs![t_input_ids, t_style, t_speed])
            .context("ONNX inference failed")?;

        // Output 0 is the waveform, shaped [1, T] or [T].
        let (_shape, audio) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract audio tensor")?;

        debug!(tokens = ids.len(), samples = audio.len(), "inference done");
        Ok(audio.to_vec())
    }
}
