use regex::Regex;
use std::sync::LazyLock;

/// Candidate timestamp anywhere in the line: date, `T` or space separator,
/// time, plus whatever non-space trailing the writer appended (fractional
/// seconds, zone offset, or both).
static TS_CANDIDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}\S*").unwrap());

/// Trailing `±HH`, `±HHMM` or `±HH:MM` zone offset.
static TZ_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[+-]\d{2}(:?\d{2})?$").unwrap());

/// Formats tried in priority order against the captured candidate.
const FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse the first timestamp found in a free-text log line into UTC epoch
/// seconds.
///
/// Returns `None` when no known encoding matches; callers treat that as
/// "exclude this line from window calculations", never as an error. The
/// function is pure and never panics on malformed input.
///
/// # Examples
///
/// ```
/// use pipemon_extract::timestamp::parse;
///
/// let a = parse("2026-01-16 02:37:45.992228+00 LOG: done").unwrap();
/// let b = parse("2026-01-16 02:37:45").unwrap();
/// assert_eq!(a, b);
/// assert!(parse("no timestamp here").is_none());
/// ```
pub fn parse(line: &str) -> Option<i64> {
    let candidate = TS_CANDIDATE.find(line)?.as_str();
    if let Some(epoch) = try_formats(candidate) {
        return Some(epoch);
    }
    // Second attempt with any trailing zone offset stripped. Offsets other
    // than +00 would need real zone math; the monitored daemons log in UTC.
    let stripped = TZ_SUFFIX.replace(candidate, "");
    if stripped.len() < candidate.len() {
        if let Some(epoch) = try_formats(&stripped) {
            return Some(epoch);
        }
    }
    None
}

fn try_formats(s: &str) -> Option<i64> {
    for fmt in FORMATS {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::parse;

    #[test]
    fn parses_all_supported_encodings_to_the_same_epoch() {
        let plain = parse("2026-01-16 02:37:45").unwrap();
        for line in [
            "2026-01-16 02:37:45.992228",
            "2026-01-16T02:37:45",
            "2026-01-16T02:37:45.992228",
            "2026-01-16 02:37:45+00",
            "2026-01-16 02:37:45.992228+00",
            "2026-01-16 02:37:45.992228+00:00",
        ] {
            assert_eq!(parse(line), Some(plain), "line: {line}");
        }
    }

    #[test]
    fn finds_timestamp_embedded_in_a_line() {
        let epoch = parse("2026-01-16 02:37:45 UTC [1234] LOG: cycle done").unwrap();
        assert_eq!(epoch, parse("2026-01-16 02:37:45").unwrap());
    }

    #[test]
    fn returns_none_on_unknown_shapes() {
        for line in [
            "",
            "Jan 16 02:37:45 host daemon[1]: done",
            "16/01/2026 02:37:45",
            "2026-01-16",
            "garbage 9999",
        ] {
            assert!(parse(line).is_none(), "line: {line}");
        }
    }
}
