// Bounded text helpers for log lines and error messages

/// Keep the first `max_chars` characters of `text`, marking the cut with `...`.
pub fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Keep the last `max_chars` characters of `text`, prefixed with a marker when cut.
pub fn tail(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let skip = total - max_chars;
    let start = text
        .char_indices()
        .nth(skip)
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    format!("... (last {} chars)\n{}", max_chars, &text[start..])
}
