//! Boundary to the external title-naming service.

use async_trait::async_trait;

use crate::error::Result;

/// Given a bounded transcript excerpt, produce a short conversation title.
///
/// The returned title is only ever used for display (`rename_title` and the
/// page title); it never feeds into any tab lookup.
#[async_trait]
pub trait TitleNamer: Send + Sync {
    async fn name(&self, excerpt: &str) -> Result<String>;
}

/// Normalise a naming-service reply into a single-line display title.
///
/// Returns `None` when nothing usable remains.
pub fn sanitize_title(raw: &str, max_len: usize) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .trim_start_matches("Title:")
        .trim_start_matches("title:")
        .trim()
        .trim_end_matches('.')
        .trim_matches(|c| c == '"' || c == '\'' || c == '`' || c == '*')
        .trim();
    if line.is_empty() {
        return None;
    }
    let title: String = line.chars().take(max_len).collect();
    Some(title.trim_end().to_string())
}

/// Cut a transcript to at most `max_chars` characters, keeping the leading
/// part (the opening prompt names a conversation best).
pub fn excerpt(transcript: &str, max_chars: usize) -> &str {
    match transcript.char_indices().nth(max_chars) {
        Some((idx, _)) => &transcript[..idx],
        None => transcript,
    }
}
