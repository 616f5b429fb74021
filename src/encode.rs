//! Container encoding for the assembled waveform.

use std::io::Cursor;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Output container requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Wav,
    Mp3,
}

impl OutputFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
        }
    }

    /// Whether this build can produce the format.
    pub fn is_supported(self) -> bool {
        match self {
            Self::Wav => true,
            Self::Mp3 => cfg!(feature = "mp3"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "wav" => Ok(Self::Wav),
            "mp3" => Ok(Self::Mp3),
            other => anyhow::bail!("unknown output format '{}', expected wav or mp3", other),
        }
    }
}

/// Encoded audio plus the MIME type to serve it with.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

pub fn encode(samples: &[f32], sample_rate: u32, format: OutputFormat) -> Result<EncodedAudio> {
    let bytes = match format {
        OutputFormat::Wav => encode_wav(samples, sample_rate)?,
        OutputFormat::Mp3 => encode_mp3(samples, sample_rate)?,
    };
    Ok(EncodedAudio { bytes, mime_type: format.mime_type() })
}

/// Mono 32-bit float WAV.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 4));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).context("Cannot start WAV")?;
        for &s in samples {
            writer.write_sample(s).context("WAV write error")?;
        }
        writer.finalize().context("WAV finalise error")?;
    }
    Ok(cursor.into_inner())
}

/// f32 [-1.0, 1.0] → i16 [-32768, 32767].
#[cfg_attr(not(feature = "mp3"), allow(dead_code))]
fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

#[cfg(feature = "mp3")]
pub fn encode_mp3(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    use anyhow::anyhow;
    use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, MonoPcm, Quality};

    let mut builder = Builder::new().context("Cannot create LAME encoder")?;
    builder.set_num_channels(1).map_err(|e| anyhow!("LAME channels: {e:?}"))?;
    builder.set_sample_rate(sample_rate).map_err(|e| anyhow!("LAME sample rate: {e:?}"))?;
    builder.set_brate(Bitrate::Kbps128).map_err(|e| anyhow!("LAME bitrate: {e:?}"))?;
    builder.set_quality(Quality::Best).map_err(|e| anyhow!("LAME quality: {e:?}"))?;
    let mut encoder = builder.build().map_err(|e| anyhow!("LAME init: {e:?}"))?;

    let pcm = to_pcm16(samples);
    // Both calls write into spare capacity only, so reserve before each.
    let mut out = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(pcm.len()));
    encoder
        .encode_to_vec(MonoPcm(&pcm), &mut out)
        .map_err(|e| anyhow!("LAME encode: {e:?}"))?;
    out.reserve(7200);
    encoder
        .flush_to_vec::<FlushNoGap>(&mut out)
        .map_err(|e| anyhow!("LAME flush: {e:?}"))?;

    Ok(out)
}

#[cfg(not(feature = "mp3"))]
pub fn encode_mp3(_samples: &[f32], _sample_rate: u32) -> Result<Vec<u8>> {
    anyhow::bail!("MP3 output requires the `mp3` feature")
}
