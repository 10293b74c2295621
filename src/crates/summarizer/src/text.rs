//! Token-window truncation and summary reflow.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

fn bpe() -> &'static CoreBPE {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| tiktoken_rs::cl100k_base().expect("embedded tokenizer tables load"))
}

/// Number of tokens in `text`.
pub fn token_count(text: &str) -> usize {
    bpe().encode_with_special_tokens(text).len()
}

/// Truncate `text` to at most `max_tokens` tokens.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let tokens = bpe().encode_with_special_tokens(text);
    if tokens.len() <= max_tokens {
        return text.to_string();
    }
    bpe()
        .decode(tokens[..max_tokens].to_vec())
        // Decode only fails on a split multi-byte boundary; fall back to
        // a character cut sized roughly like the token cut.
        .unwrap_or_else(|_| text.chars().take(max_tokens * 4).collect())
}

/// Split `text` into consecutive chunks of at most `chunk_tokens`
/// tokens each.
pub fn chunk_by_tokens(text: &str, chunk_tokens: usize) -> Vec<String> {
    let tokens = bpe().encode_with_special_tokens(text);
    let size = chunk_tokens.max(1);
    tokens
        .chunks(size)
        .map(|chunk| {
            bpe().decode(chunk.to_vec()).unwrap_or_default()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Reflow running text into paragraphs, one blank line every
/// `words_per_line` words.
pub fn reflow_paragraphs(text: &str, words_per_line: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(words_per_line.max(1))
        .map(|chunk| chunk.join(" "))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        let text = "a handful of tokens";
        assert_eq!(truncate_to_tokens(text, 100), text);
    }

    #[test]
    fn long_text_is_cut_to_the_window() {
        let text = "word ".repeat(500);
        let cut = truncate_to_tokens(&text, 50);
        assert!(token_count(&cut) <= 50);
        assert!(cut.len() < text.len());
    }

    #[test]
    fn chunks_cover_the_whole_text() {
        let text = "lorem ipsum dolor sit amet ".repeat(100);
        let chunks = chunk_by_tokens(&text, 50);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| token_count(c) <= 50));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn reflow_inserts_paragraph_breaks() {
        let text = (1..=45).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let reflowed = reflow_paragraphs(&text, 20);
        assert_eq!(reflowed.matches("\n\n").count(), 2);
        assert!(reflowed.starts_with("1 2 3"));
        assert!(reflowed.ends_with("44 45"));
    }

    #[test]
    fn reflow_of_short_text_is_one_paragraph() {
        assert_eq!(reflow_paragraphs("just a few words", 20), "just a few words");
    }
}
