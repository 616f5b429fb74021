//! Silence directive parsing: splits raw input into text and silence spans.
//!
//! A directive is exactly `[<digits>[.<digits>]s]`, e.g. `[2s]` or `[1.5s]`.
//! Anything else in brackets (`[1.5]`, `[s2]`, `[abc]`) is ordinary text.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([0-9]+(?:\.[0-9]+)?)s\]").expect("directive pattern"));

static RE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([0-9]+(?:\.[0-9]+)?)s\]$").expect("marker pattern"));

/// One span of the input, in timeline order.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Free text, untrimmed, as it appeared between directives.
    Text(String),
    /// Literal silence requested by a directive.
    Silence { duration_seconds: f64 },
}

/// `true` when `segment` (surrounding whitespace ignored) is a whole directive.
pub fn is_silence_marker(segment: &str) -> bool {
    RE_MARKER.is_match(segment.trim())
}

/// Seconds encoded in a directive, or `None` if `marker` is not one.
pub fn extract_silence_duration(marker: &str) -> Option<f64> {
    RE_MARKER
        .captures(marker.trim())
        .and_then(|caps| caps[1].parse::<f64>().ok())
}

/// Split `raw` on silence directives, keeping order.
///
/// Whitespace-only fragments between directives are dropped; every other
/// fragment is kept verbatim.
pub fn split(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    fn push_text(text: &str, segments: &mut Vec<Segment>) {
        if !text.trim().is_empty() {
            segments.push(Segment::Text(text.to_string()));
        }
    }

    for caps in RE_DIRECTIVE.captures_iter(raw) {
        let Some(whole) = caps.get(0) else { continue };
        push_text(&raw[cursor..whole.start()], &mut segments);
        // The pattern only admits digits with an optional fraction, so this parses.
        if let Ok(duration_seconds) = caps[1].parse::<f64>() {
            segments.push(Segment::Silence { duration_seconds });
        }
        cursor = whole.end();
    }
    push_text(&raw[cursor..], &mut segments);

    segments
}
