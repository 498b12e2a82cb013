//! Narration cleanup before synthesis.

use std::sync::LazyLock;

use regex::Regex;

/// Non-greedy `[...]` span, matching within a single line.
static STAGE_DIRECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*?\]").expect("valid stage direction pattern"));

/// Remove bracketed stage directions such as `[Dramatic pause]`.
pub fn strip_stage_directions(text: &str) -> String {
    STAGE_DIRECTION.replace_all(text, "").into_owned()
}

/// Text actually sent to the synthesizer.
pub fn prepare(text: &str, strip: bool, lead_in: Option<&str>) -> String {
    let body = if strip {
        strip_stage_directions(text)
    } else {
        text.to_string()
    };
    match lead_in {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}{body}"),
        _ => body,
    }
}
