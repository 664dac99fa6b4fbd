//! Clock-token parsing shared by the row decoders.
//!
//! Game-list rows carry elapsed times as `H:MM:SS` or `M:SS`, optionally
//! with a trailing `.cc` centisecond fraction; position and history rows
//! carry per-move times as `(M:SS)`.

use std::time::Duration;

/// Parse `H:MM:SS` or `M:SS`, optionally suffixed `.cc`.
pub(crate) fn parse_clock(token: &str) -> Option<Duration> {
    let (clock, centis) = match token.split_once('.') {
        Some((clock, frac)) => {
            let centis: u64 = frac.parse().ok()?;
            (clock, centis)
        },
        None => (token, 0),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    let seconds = match parts.as_slice() {
        [m, s] => {
            let m: u64 = m.parse().ok()?;
            let s: u64 = s.parse().ok()?;
            m * 60 + s
        },
        [h, m, s] => {
            let h: u64 = h.parse().ok()?;
            let m: u64 = m.parse().ok()?;
            let s: u64 = s.parse().ok()?;
            h * 3600 + m * 60 + s
        },
        _ => return None,
    };

    Some(Duration::from_secs(seconds) + Duration::from_millis(centis * 10))
}

/// Parse a parenthesized per-move time token such as `(0:06)`.
pub(crate) fn parse_paren_clock(token: &str) -> Option<Duration> {
    let inner = token.strip_prefix('(')?.strip_suffix(')')?;
    parse_clock(inner)
}
