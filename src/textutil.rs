/// Lowercased with whitespace runs collapsed to one space; used for content matching.
pub fn normalize_for_match(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Cuts `text` to at most `max_chars` characters, dropping a trailing partial word.
/// Falls back to a hard cut when not even the first word fits.
pub fn truncate_at_word_boundary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let head = &text[..cut];
    let next_is_break = text[cut..].chars().next().is_some_and(char::is_whitespace);
    if next_is_break {
        return head.trim_end().to_string();
    }
    match head.rfind(char::is_whitespace) {
        Some(ws) if !head[..ws].trim().is_empty() => head[..ws].trim_end().to_string(),
        _ => head.to_string(),
    }
}

/// Single-line preview for log messages.
pub fn clip_for_log(text: &str, max_chars: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let head: String = flat.chars().take(max_chars).collect();
    format!("{head}…")
}
