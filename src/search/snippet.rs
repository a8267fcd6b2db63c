//! Bounded snippet extraction with highlight spans.
//!
//! All offsets are character offsets, never bytes, so multi-byte content can
//! be sliced by clients without panics. The window is centered on the first
//! case-insensitive occurrence of any query term; a trailing ellipsis marks
//! truncation.

/// Appended when the source field was cut to fit the window.
pub const ELLIPSIS: &str = "...";

/// A snippet plus the `[start, end)` character spans to highlight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snippet {
    pub text: String,
    pub spans: Vec<(usize, usize)>,
}

/// Build a snippet for one document.
///
/// Prefers the description (the richest text field) and falls back to the
/// name; with neither available returns an empty snippet rather than an
/// error.
pub fn build(
    description: Option<&str>,
    name: &str,
    terms: &[String],
    window_chars: usize,
) -> Snippet {
    let source = description
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| name.trim());
    if source.is_empty() || window_chars == 0 {
        return Snippet::default();
    }

    let chars: Vec<char> = source.chars().collect();
    let folded = fold_chars(&chars);
    let anchor = terms
        .iter()
        .filter_map(|t| find_folded(&folded, t, 0))
        .min()
        .unwrap_or(0);

    let (start, end) = window_bounds(chars.len(), anchor, window_chars);
    let window: String = chars[start..end].iter().collect();
    let spans = highlight_spans(&folded[start..end], terms);

    let mut text = window;
    if start > 0 || end < chars.len() {
        text.push_str(ELLIPSIS);
    }
    Snippet { text, spans }
}

/// Window of at most `window` characters around `anchor` within `len`.
fn window_bounds(len: usize, anchor: usize, window: usize) -> (usize, usize) {
    if len <= window {
        return (0, len);
    }
    let mut start = anchor.saturating_sub(window / 2);
    if start + window > len {
        start = len - window;
    }
    (start, start + window)
}

/// Every non-overlapping case-insensitive match of every term, ascending by
/// start offset.
fn highlight_spans(folded: &[char], terms: &[String]) -> Vec<(usize, usize)> {
    let mut all = Vec::new();
    for term in terms {
        let needle: Vec<char> = term.chars().collect();
        if needle.is_empty() {
            continue;
        }
        let mut from = 0;
        while let Some(start) = find_folded_chars(folded, &needle, from) {
            all.push((start, start + needle.len()));
            from = start + needle.len();
        }
    }
    all.sort_unstable();
    let mut spans: Vec<(usize, usize)> = Vec::with_capacity(all.len());
    for (start, end) in all {
        match spans.last() {
            Some(&(_, prev_end)) if start < prev_end => {}
            _ => spans.push((start, end)),
        }
    }
    spans
}

/// One-to-one case fold: each char maps to the first char of its lowercase
/// expansion, keeping offsets stable.
fn fold_chars(chars: &[char]) -> Vec<char> {
    chars
        .iter()
        .map(|c| c.to_lowercase().next().unwrap_or(*c))
        .collect()
}

fn find_folded(folded: &[char], term: &str, from: usize) -> Option<usize> {
    let needle: Vec<char> = term.chars().collect();
    find_folded_chars(folded, &needle, from)
}

fn find_folded_chars(folded: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() || folded.len() < needle.len() {
        return None;
    }
    (from..=folded.len() - needle.len()).find(|&i| folded[i..i + needle.len()] == *needle)
}
