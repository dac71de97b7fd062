//! Boundary-aware truncation of long descriptions.

/// Appended when no clean boundary was found.
pub const ELLIPSIS: &str = "...";

const SENTENCE_ENDINGS: [&str; 4] = [". ", ".\n", "!\n", "?\n"];

/// Truncate `text` to at most `max_chars` characters (plus [`ELLIPSIS`] on a hard cut).
///
/// Prefers a paragraph break, then a sentence end, each only when it lies past
/// 60% of `max_chars`. `max_chars == 0` disables truncation.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut = text
        .char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(idx, _)| idx);
    let window = &text[..cut];
    let past_floor = |byte_idx: usize| window[..byte_idx].chars().count() * 10 > max_chars * 6;

    if let Some(idx) = window.rfind("\n\n").filter(|&i| past_floor(i)) {
        return window[..idx].trim_end().to_string();
    }

    for sep in SENTENCE_ENDINGS {
        if let Some(idx) = window.rfind(sep).filter(|&i| past_floor(i)) {
            return window[..=idx].trim_end().to_string();
        }
    }

    format!("{}{ELLIPSIS}", window.trim_end())
}
