//! Refusal heuristic.
//!
//! Vision models decline in free text ("I'm sorry, I can't help with that"),
//! so a refusal is recognised by a marker word rather than an error code.

pub const REFUSAL_MARKER: &str = "sorry";

/// True when `text` contains the refusal marker, ignoring case.
pub fn is_refusal(text: &str) -> bool {
    text.to_lowercase().contains(REFUSAL_MARKER)
}
