use crate::traits::TokenCounter;

/// Word-based token estimate: `ceil(words * tokens_per_word)`.
///
/// Good enough for packing when no tokenizer file is available; the default
/// ratio of 1.3 tokens per word tracks BPE tokenizers on prose.
#[derive(Debug, Clone, Copy)]
pub struct WordCounter {
    tokens_per_word: f32,
}

impl WordCounter {
    pub fn new(tokens_per_word: f32) -> Self { Self { tokens_per_word } }

    /// One token per whitespace-separated word.
    pub fn exact() -> Self { Self::new(1.0) }
}

impl Default for WordCounter {
    fn default() -> Self { Self::new(1.3) }
}

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        let words = text.split_whitespace().count();
        (words as f32 * self.tokens_per_word).ceil() as usize
    }
}
