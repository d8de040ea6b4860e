use std::time::Duration;

/// Parse a duration such as `300ms`, `1m30s` or `2h 30m`.
///
/// Units are whatever `humantime` accepts (`ns`, `us`, `ms`, `s`, `m`, `h`
/// and the longer spellings, plus `d` and `w`). Fractional values like
/// `1.5h` are rejected and fall back to the directive default. A bare `0`
/// needs no unit. Negative durations parse and clamp to zero, which the pool
/// and the refresh scheduler both read as "no limit" / "disabled".
pub fn parse_duration(input: &str) -> Option<Duration> {
    let mut s = input.trim();
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    if s == "0" {
        return Some(Duration::ZERO);
    }

    // Micro sign spellings of `us`
    let s = s.replace(['µ', 'μ'], "u");
    let parsed = humantime::parse_duration(&s).ok()?;

    if negative {
        return Some(Duration::ZERO);
    }
    Some(parsed)
}
