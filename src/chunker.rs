//! Token-budget chunker: splits phoneme text into model-sized pieces.
//!
//! The text is cut into alternating word runs and punctuation runs
//! (`[,.;:!?]+`).  Fragments are accumulated greedily while the buffer still
//! tokenizes within the budget, so trailing punctuation stays with the words
//! before it.  A fragment that cannot fit even on its own is hard-split into
//! character windows.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::tokenize::Tokenizer;

static RE_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,.;:!?]+").expect("punctuation pattern"));

/// Split `text` into word and punctuation fragments, in order.
///
/// Punctuation runs are kept as their own fragments; whitespace-only
/// fragments are dropped.
pub fn split_fragments(text: &str) -> Vec<&str> {
    let mut fragments = Vec::new();
    let mut cursor = 0;
    for m in RE_PUNCTUATION.find_iter(text) {
        fragments.push(&text[cursor..m.start()]);
        fragments.push(m.as_str());
        cursor = m.end();
    }
    fragments.push(&text[cursor..]);
    fragments.retain(|f| !f.trim().is_empty());
    fragments
}

/// Slice `segment` into windows of `size` characters; the last may be shorter.
///
/// Not word-aware.  Only used for fragments with no internal punctuation
/// that exceed the budget on their own.
pub fn split_long_segment(segment: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let chars: Vec<char> = segment.chars().collect();
    chars.chunks(size).map(|w| w.iter().collect()).collect()
}

/// Hard-split a fragment, re-splitting any window that still exceeds the
/// budget because the tokenizer emits more than one token per character.
fn hard_split(fragment: &str, budget: usize, tokenizer: &dyn Tokenizer, out: &mut Vec<String>) {
    for window in split_long_segment(fragment, budget) {
        if tokenizer.token_count(&window) <= budget {
            out.push(window);
            continue;
        }
        // A single character over budget still becomes its own chunk.
        let mut current = String::new();
        for c in window.chars() {
            let mut candidate = current.clone();
            candidate.push(c);
            if !current.is_empty() && tokenizer.token_count(&candidate) > budget {
                out.push(std::mem::take(&mut current));
                current.push(c);
            } else {
                current = candidate;
            }
        }
        if !current.is_empty() {
            out.push(current);
        }
    }
}

/// Split `phonemes` into chunks that each tokenize to at most `budget` tokens.
///
/// Concatenating the chunks reproduces the input up to dropped
/// whitespace-only fragments.  Empty input yields no chunks.
pub fn chunk_phonemes(phonemes: &str, budget: usize, tokenizer: &dyn Tokenizer) -> Vec<String> {
    let budget = budget.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for fragment in split_fragments(phonemes) {
        let candidate = format!("{current}{fragment}");
        if tokenizer.token_count(&candidate) <= budget {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if tokenizer.token_count(fragment) > budget {
            hard_split(fragment, budget, tokenizer, &mut chunks);
        } else {
            current.push_str(fragment);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One token per character.
    struct CharTokenizer;

    impl Tokenizer for CharTokenizer {
        fn tokenize(&self, phonemes: &str) -> Vec<i64> {
            phonemes.chars().map(|c| c as i64).collect()
        }
    }

    /// Two tokens per character.
    struct WideTokenizer;

    impl Tokenizer for WideTokenizer {
        fn tokenize(&self, phonemes: &str) -> Vec<i64> {
            phonemes.chars().flat_map(|c| [c as i64, 1]).collect()
        }
    }

    fn squash(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_split_fragments_keeps_punctuation() {
        assert_eq!(
            split_fragments("Hello, world! This is a test."),
            vec!["Hello", ",", " world", "!", " This is a test", "."]
        );
        assert_eq!(split_fragments("wait... what?!"), vec!["wait", "...", " what", "?!"]);
    }

    #[test]
    fn test_split_long_segment() {
        assert_eq!(split_long_segment("abcdefghij", 3), vec!["abc", "def", "ghi", "j"]);
        assert_eq!(split_long_segment("həloʊ", 2), vec!["hə", "lo", "ʊ"]);
    }

    #[test]
    fn test_irreducible_fragment_hard_split() {
        let chunks = chunk_phonemes("abcdefghij", 3, &CharTokenizer);
        assert_eq!(chunks, vec!["abc", "def", "ghi", "j"]);
    }

    #[test]
    fn test_large_budget_single_chunk() {
        let text = "Hello, world! This is a test.";
        assert_eq!(chunk_phonemes(text, 1000, &CharTokenizer), vec![text]);
    }

    #[test]
    fn test_punctuation_attaches_left() {
        let chunks = chunk_phonemes("Hello, world! This is a looonnng test.", 7, &CharTokenizer);
        assert_eq!(
            chunks,
            vec!["Hello,", " world!", " This i", "s a loo", "onnng t", "est", "."]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk_phonemes("", 5, &CharTokenizer).is_empty());
        assert!(chunk_phonemes("   ", 5, &CharTokenizer).is_empty());
    }

    #[test]
    fn test_budget_smaller_than_a_character() {
        let chunks = chunk_phonemes("abc", 1, &WideTokenizer);
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_wide_tokens_respect_budget() {
        let chunks = chunk_phonemes("abcdefghij", 4, &WideTokenizer);
        assert_eq!(chunks, vec!["ab", "cd", "ef", "gh", "ij"]);
    }

    #[test]
    fn test_budget_and_order_hold_across_inputs() {
        let texts = [
            "ðɪs ɪz ə tˈɛst, wɪð sˌʌm pˈʌŋktʃuːˈeɪʃən. ænd mɔːɹ!",
            "no punctuation at all in this rather long line of text",
            "a,b.c;d:e!f?g",
            ",,,...!!!",
            "short.",
            "x. . y",
        ];
        for text in texts {
            for budget in 1..=12 {
                let chunks = chunk_phonemes(text, budget, &CharTokenizer);
                for c in &chunks {
                    assert!(
                        CharTokenizer.token_count(c) <= budget,
                        "chunk {c:?} over budget {budget} for {text:?}"
                    );
                }
                assert_eq!(squash(&chunks.concat()), squash(text), "budget {budget}");
            }
            for budget in 2..=12 {
                for c in chunk_phonemes(text, budget, &WideTokenizer) {
                    assert!(WideTokenizer.token_count(&c) <= budget);
                }
            }
        }
    }
}
