//! Token and word accounting for extracted text
//!
//! A token is a maximal run of non-whitespace characters. A word is a token containing at
//! least one alphanumeric character, so stray punctuation and bullet glyphs left behind by
//! boilerplate stripping do not count towards the minimum.

/// Truncates `text` after its first `max_tokens` tokens
///
/// The cut is made right after the last kept token, so the original spacing inside the kept
/// prefix is preserved byte for byte. Returns the kept prefix and whether anything was cut.
///
/// # Examples
///
/// ```
/// use corpus_harvest::dedup::truncate_tokens;
///
/// assert_eq!(truncate_tokens("one  two three", 2), ("one  two", true));
/// assert_eq!(truncate_tokens("one two ", 2), ("one two ", false));
/// ```
pub fn truncate_tokens(text: &str, max_tokens: usize) -> (&str, bool) {
    let mut count = 0;
    let mut in_token = false;
    let mut cut = 0;

    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if in_token {
                in_token = false;
                if count == max_tokens {
                    cut = idx;
                }
            }
        } else if !in_token {
            if count == max_tokens {
                return (&text[..cut], true);
            }
            in_token = true;
            count += 1;
        }
    }

    (text, false)
}

/// Counts words in `text`
pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .count()
}
