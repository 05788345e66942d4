//! Deterministic question fitting.
//!
//! [`fit_question`] is both the offline fallback (applied to the headline)
//! and the final guard on generated text. For any input and any
//! `max_chars >= 1` the result is 1..=`max_chars` characters long and ends
//! with `?`. Lengths are counted in `char`s, never bytes.

/// Marks removed from the end before the closing `?` is appended.
const TRAILING_MARKS: [char; 6] = ['.', '!', ';', ':', ',', '?'];

/// Fit `text` into a question of at most `max_chars` characters.
///
/// A `max_chars` of zero is treated as one.
pub fn fit_question(text: &str, max_chars: usize) -> String {
    let max_chars = max_chars.max(1);
    let text = text.trim();

    if text.ends_with('?') && text.chars().count() <= max_chars {
        return text.to_string();
    }

    // One slot is reserved for the closing mark.
    let budget = max_chars - 1;
    let stem = strip_trailing(text);
    if stem.chars().count() <= budget {
        return format!("{stem}?");
    }

    let cut: String = stem.chars().take(budget).collect();
    let on_boundary = stem.chars().nth(budget).is_some_and(char::is_whitespace);
    let cut = if on_boundary {
        cut.as_str()
    } else {
        match cut.rfind(char::is_whitespace) {
            Some(idx) => &cut[..idx],
            None => cut.as_str(),
        }
    };

    format!("{}?", strip_trailing(cut))
}

fn strip_trailing(text: &str) -> &str {
    text.trim_end_matches(|c: char| c.is_whitespace() || TRAILING_MARKS.contains(&c))
}
