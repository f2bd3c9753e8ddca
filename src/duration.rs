//! Human-readable duration parsing for `--duration`.

use std::time::Duration;

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds
/// - `m`: minutes
/// - `h`: hours
/// - `ms`: milliseconds
///
/// # Examples
/// ```
/// use beacon_advertiser::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    // "ms" must be tried before "m" and "s"
    let (num, unit, millis_per_unit) = if let Some(num) = src.strip_suffix("ms") {
        (num, "milliseconds", 1)
    } else if let Some(num) = src.strip_suffix('h') {
        (num, "hours", 3_600_000)
    } else if let Some(num) = src.strip_suffix('m') {
        (num, "minutes", 60_000)
    } else if let Some(num) = src.strip_suffix('s') {
        (num, "seconds", 1000)
    } else {
        (src, "duration", 1000)
    };

    let value: u64 = num
        .trim()
        .parse()
        .map_err(|_| format!("invalid {}: {}", unit, num))?;
    value
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("{} out of range: {}", unit, num))
}
