//! Character-level phoneme tokeniser.
//!
//! Maps each Unicode character in a phoneme string to its integer ID in a
//! fixed vocabulary.  Unknown characters are silently skipped.  Sentinel
//! padding is *not* added here: the chunk orchestrator pads each chunk, and
//! the chunker needs raw lengths to measure chunks against the token budget.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Anything that turns phoneme text into model token IDs.
///
/// Implementations must be pure and deterministic: the chunker calls
/// `tokenize` repeatedly on growing prefixes and trusts the lengths.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, phonemes: &str) -> Vec<i64>;

    /// Number of tokens `phonemes` produces.
    fn token_count(&self, phonemes: &str) -> usize {
        self.tokenize(phonemes).len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vocabulary definition (char ordering matters)
// ─────────────────────────────────────────────────────────────────────────────

const PAD: char = '$';

/// Characters: ; : , . ! ? ¡ ¿ — … " « » " "  (space at end)
const PUNCTUATION: &str = ";:,.!?¡¿—…\u{201C}«»\u{201D}\" ";

const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// The combining character ̩ (U+0329) and curly quotes are individual entries.
const IPA_LETTERS: &str =
    "ɑɐɒæɓʙβɔɕçɗɖðʤəɘɚɛɜɝɞɟʄɡɠɢʛɦɧħɥʜɨɪʝɭɬɫɮʟɱɯɰŋɳɲɴøɵɸθœɶʘɹɺɾɻʀʁɽʂʃʈʧʉʊʋⱱʌɣɤʍχʎʏʑʐʒʔʡʕʢǀǁǂǃˈˌːˑʼʴʰʱʲʷˠˤ˞↓↑→↗↘\u{2019}\u{0329}\u{2018}ᵻ";

static VOCAB: Lazy<HashMap<char, i64>> = Lazy::new(|| {
    std::iter::once(PAD)
        .chain(PUNCTUATION.chars())
        .chain(LETTERS.chars())
        .chain(IPA_LETTERS.chars())
        .enumerate()
        .map(|(i, c)| (c, i as i64))
        .collect()
});

/// Map a character to its vocabulary index, returning `None` for unknowns.
pub fn char_to_id(c: char) -> Option<i64> {
    VOCAB.get(&c).copied()
}

/// The default tokeniser: one ID per known character.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpaTokenizer;

impl Tokenizer for IpaTokenizer {
    fn tokenize(&self, phonemes: &str) -> Vec<i64> {
        phonemes.chars().filter_map(char_to_id).collect()
    }

    fn token_count(&self, phonemes: &str) -> usize {
        phonemes.chars().filter(|c| VOCAB.contains_key(c)).count()
    }
}
