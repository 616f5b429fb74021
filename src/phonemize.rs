//! Phonemisation through the `espeak-ng` command-line tool.
//!
//! The input is normalised (quotes, CJK punctuation, line breaks), then
//! written to the stdin of `espeak-ng -q --ipa -v <voice> --stdin`, so text
//! is never parsed as an option.  Output lines are joined with spaces and
//! trimmed.
//!
//! ## Requirements
//! | Platform             | Install                                        |
//! |----------------------|------------------------------------------------|
//! | Alpine               | `apk add espeak-ng`                            |
//! | Debian / Ubuntu      | `apt install espeak-ng`                        |
//! | macOS (Homebrew)     | `brew install espeak-ng`                       |

use std::{
    io::Write,
    process::{Command, Stdio},
    thread,
};

use anyhow::{anyhow, Context};
use tracing::{debug, warn};

use crate::error::{Result, SynthError};

/// Converts text in a given language into a phoneme string.
pub trait Phonemizer: Send + Sync {
    fn phonemize(&self, text: &str, lang: &str) -> Result<String>;

    /// Whether `lang` is handled without falling back to a default.
    fn supports_language(&self, _lang: &str) -> bool {
        true
    }
}

// ─── Languages ────────────────────────────────────────────────────────────────

/// Supported language ids.  Each id is also the espeak-ng voice name.
pub const LANGUAGES: &[(&str, &str)] = &[
    ("en-us", "English (US)"),
    ("en-gb", "English (UK)"),
    ("pt-br", "Portuguese (Brazil)"),
    ("fo-st", "Forro (Sao Tome and Principe)"),
    ("es-419", "Spanish (Latin America)"),
    ("es", "Spanish (Spain)"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("cmn", "Chinese (Mandarin)"),
    ("ko", "Korean"),
    ("ru", "Russian"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
    ("nl", "Dutch"),
    ("pl", "Polish"),
    ("tr", "Turkish"),
];

/// Short and legacy codes accepted alongside the canonical ids.
const ALIASES: &[(&str, &str)] = &[
    ("a", "en-us"),
    ("en", "en-us"),
    ("b", "en-gb"),
    ("en-uk", "en-gb"),
    ("e", "es-419"),
    ("es-la", "es-419"),
    ("es-es", "es"),
];

/// Canonical espeak-ng voice for `lang`, if known.
pub fn resolve_language(lang: &str) -> Option<&'static str> {
    let lang = lang.trim().to_ascii_lowercase();
    LANGUAGES
        .iter()
        .map(|(id, _)| *id)
        .find(|id| *id == lang)
        .or_else(|| ALIASES.iter().find(|(alias, _)| *alias == lang).map(|(_, id)| *id))
}

// ─── Normalisation ────────────────────────────────────────────────────────────

/// Map typographic quotes and full-width punctuation to the ASCII forms
/// espeak-ng phrases on, and turn line breaks into pauses.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '«' => out.push('('),
            '»' => out.push(')'),
            '、' | '，' => out.push_str(", "),
            '。' => out.push_str(". "),
            '！' => out.push_str("! "),
            '：' => out.push_str(": "),
            '；' => out.push_str("; "),
            '？' => out.push_str("? "),
            '\n' | '\t' => out.push_str("  "),
            other => out.push(other),
        }
    }
    out.trim().to_string()
}

// ─── espeak-ng backend ────────────────────────────────────────────────────────

/// Runs the `espeak-ng` binary once per call.
#[derive(Debug, Clone)]
pub struct EspeakPhonemizer {
    binary: String,
    default_language: String,
}

impl EspeakPhonemizer {
    pub fn new(binary: impl Into<String>, default_language: impl Into<String>) -> Self {
        Self { binary: binary.into(), default_language: default_language.into() }
    }

    /// Returns `true` if the binary can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn voice_for(&self, lang: &str) -> String {
        match resolve_language(lang) {
            Some(voice) => voice.to_string(),
            None => {
                warn!(lang, fallback = %self.default_language, "unknown language, using default");
                self.default_language.clone()
            }
        }
    }
}

impl Phonemizer for EspeakPhonemizer {
    fn phonemize(&self, text: &str, lang: &str) -> Result<String> {
        let text = normalize_text(text);
        if text.is_empty() {
            return Ok(String::new());
        }
        let voice = self.voice_for(lang);

        let mut child = Command::new(&self.binary)
            .args(["-q", "--ipa", "-v", voice.as_str(), "--stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Cannot run {}", self.binary))
            .map_err(SynthError::UpstreamUnavailable)?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            SynthError::UpstreamUnavailable(anyhow!("espeak-ng stdin was not captured"))
        })?;
        // Write from a separate thread so a full stdout pipe cannot deadlock us.
        let input = text.clone();
        let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child
            .wait_with_output()
            .with_context(|| format!("Cannot wait for {}", self.binary))
            .map_err(SynthError::UpstreamUnavailable)?;
        let written = writer
            .join()
            .map_err(|_| SynthError::UpstreamUnavailable(anyhow!("espeak-ng stdin writer panicked")))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() || !stderr.trim().is_empty() {
            return Err(SynthError::UpstreamUnavailable(anyhow!(
                "espeak-ng ({}) failed: {}",
                voice,
                stderr.trim()
            )));
        }
        written
            .context("Cannot write text to espeak-ng")
            .map_err(SynthError::UpstreamUnavailable)?;

        let phonemes = String::from_utf8(output.stdout)
            .context("espeak-ng returned non-UTF-8 phonemes")
            .map_err(SynthError::UpstreamUnavailable)?;
        let phonemes = phonemes.lines().collect::<Vec<_>>().join(" ").trim().to_string();

        debug!(voice = %voice, chars = text.len(), phonemes = phonemes.len(), "phonemized");
        Ok(phonemes)
    }

    fn supports_language(&self, lang: &str) -> bool {
        resolve_language(lang).is_some()
    }
}
