//! Waveform post-processing: edge trimming, silence, concatenation and
//! playback speed.

use anyhow::{anyhow, ensure, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Default trim threshold as a fraction of the mean absolute amplitude.
pub const TRIM_THRESHOLD_RATIO: f32 = 0.05;

/// Strip near-silent samples from both ends of `samples`.
///
/// A sample is audible when `|s| > mean(|s|) * threshold_ratio`.  The result
/// runs from the first to the last audible sample, inclusive.  Buffers with no
/// audible sample are returned unchanged.
pub fn trim(samples: &[f32], threshold_ratio: f32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mean = samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32;
    let threshold = mean * threshold_ratio;
    let audible = |s: &f32| s.abs() > threshold;

    let start = samples.iter().position(audible);
    let end = samples.iter().rposition(audible).map(|i| i + 1);
    match (start, end) {
        (Some(start), Some(end)) if start < end => samples[start..end].to_vec(),
        _ => samples.to_vec(),
    }
}

/// Upper bound on the samples a single silence buffer may hold.
pub const MAX_SILENCE_SAMPLES: usize = u32::MAX as usize;

/// Frames fed to the resampler per call.
const RESAMPLE_CHUNK: usize = 1024;

/// `floor(duration_seconds * sample_rate)`, or `None` when that is not a
/// representable buffer length.
pub fn silence_len(duration_seconds: f64, sample_rate: u32) -> Option<usize> {
    let n = (duration_seconds.max(0.0) * sample_rate as f64).floor();
    (n.is_finite() && n <= MAX_SILENCE_SAMPLES as f64).then_some(n as usize)
}

/// `floor(duration_seconds * sample_rate)` zero samples, or `None` if the
/// duration is too long to allocate.
pub fn silence(duration_seconds: f64, sample_rate: u32) -> Option<Vec<f32>> {
    silence_len(duration_seconds, sample_rate).map(|n| vec![0.0; n])
}

/// Concatenate buffers in order.  No cross-fade, no gaps.
pub fn assemble(buffers: &[Vec<f32>]) -> Vec<f32> {
    let total = buffers.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total);
    for b in buffers {
        out.extend_from_slice(b);
    }
    out
}

/// Time-scale `samples` by `speed` through a polynomial resampler.
///
/// `speed > 1` shortens the audio, `speed < 1` lengthens it.  Pitch shifts
/// along with tempo.  The result holds `round(len / speed)` samples.
pub fn apply_speed(samples: &[f32], speed: f32) -> Result<Vec<f32>> {
    ensure!(speed.is_finite() && speed > 0.0, "playback speed must be positive, got {speed}");
    if samples.is_empty() || speed == 1.0 {
        return Ok(samples.to_vec());
    }

    let ratio = 1.0 / speed as f64;
    let target = ((samples.len() as f64) * ratio).round().max(1.0) as usize;
    let mut resampler =
        FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Septic, RESAMPLE_CHUNK, 1)
            .map_err(|e| anyhow!("Resampler init failed: {e}"))?;
    let delay = resampler.output_delay();
    let mut out = Vec::with_capacity(target + delay + RESAMPLE_CHUNK);

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let n = resampler.input_frames_next();
        let block = resampler
            .process(&[&samples[pos..pos + n]], None)
            .map_err(|e| anyhow!("Resampling failed: {e}"))?;
        out.extend_from_slice(&block[0]);
        pos += n;
    }
    if pos < samples.len() {
        let tail: [&[f32]; 1] = [&samples[pos..]];
        let block = resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(|e| anyhow!("Resampling failed: {e}"))?;
        out.extend_from_slice(&block[0]);
    }
    // Drain the delay line until the tail of the input has come out.
    while out.len() < target + delay {
        let block = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| anyhow!("Resampler flush failed: {e}"))?;
        if block[0].is_empty() {
            break;
        }
        out.extend_from_slice(&block[0]);
    }

    out.drain(..delay.min(out.len()));
    out.resize(target, 0.0);
    Ok(out)
}
