use std::sync::OnceLock;
use regex::Regex;

/// Matches a parenthesised percentage such as `(12.5%)` or `(13 %)`
fn progress_regex() -> &'static Regex {
    static PROGRESS_RE: OnceLock<Regex> = OnceLock::new();
    PROGRESS_RE.get_or_init(|| {
        Regex::new(r"\((\d+\.?\d*)\s*%\)").expect("progress pattern is valid")
    })
}

/// Return the last percentage marker found in `chunk`, clamped to [0, 100].
///
/// Only this chunk is scanned. A marker split across two reads is missed.
pub fn extract_progress(chunk: &str) -> Option<f64> {
    progress_regex()
        .captures_iter(chunk)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .last()
        .map(|value| value.clamp(0.0, 100.0))
}

/// Decode a raw output chunk, replacing malformed byte sequences
pub fn decode_chunk(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Integer percentage shown to the user
pub fn display_percent(value: f64) -> u8 {
    value.clamp(0.0, 100.0).floor() as u8
}
