//! Request-side freshness directive and the stored save-time stamp.

use crate::http::Headers;
use time::OffsetDateTime;

/// Request header carrying the freshness directive, in seconds.
pub const MAX_AGE_HEADER: &str = "X-Max-Age";
/// Stored header holding the save time in epoch milliseconds.
pub const CACHE_DATE_HEADER: &str = "X-Cache-Date";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxAge {
    /// Always go to the network first.
    #[default]
    NoCache,
    /// Any cached entry is acceptable.
    Forever,
    /// A cached entry younger than this many seconds is acceptable.
    Seconds(u64),
}

impl MaxAge {
    /// `-1` means forever, a positive number is a window in seconds, and
    /// anything else (missing, `0`, malformed, other negatives) is no-cache.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim).and_then(|v| v.parse::<i64>().ok()) {
            Some(-1) => MaxAge::Forever,
            Some(n) if n > 0 => MaxAge::Seconds(n as u64),
            _ => MaxAge::NoCache,
        }
    }

    pub fn from_headers(headers: &Headers) -> Self {
        Self::parse(headers.value(MAX_AGE_HEADER))
    }

    /// Whether a lookup should be attempted before the network.
    pub fn consults_cache(&self) -> bool {
        !matches!(self, MaxAge::NoCache)
    }

    /// Whether an entry saved at `saved_ms` may be served at `now_ms`.
    pub fn is_fresh(&self, saved_ms: Option<i64>, now_ms: i64) -> bool {
        match self {
            MaxAge::NoCache => false,
            MaxAge::Forever => true,
            MaxAge::Seconds(secs) => saved_ms.is_some_and(|saved| {
                let window = i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX);
                now_ms.saturating_sub(saved) < window
            }),
        }
    }
}

pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// The stamped save time of stored headers.
pub fn cache_date(headers: &Headers) -> Option<i64> {
    headers
        .value(CACHE_DATE_HEADER)
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_max_age() {
        assert_eq!(MaxAge::parse(None), MaxAge::NoCache);
        assert_eq!(MaxAge::parse(Some("0")), MaxAge::NoCache);
        assert_eq!(MaxAge::parse(Some("-1")), MaxAge::Forever);
        assert_eq!(MaxAge::parse(Some(" 60 ")), MaxAge::Seconds(60));
        assert_eq!(MaxAge::parse(Some("-5")), MaxAge::NoCache);
        assert_eq!(MaxAge::parse(Some("soon")), MaxAge::NoCache);
    }

    #[test]
    fn test_freshness_window() {
        let age = MaxAge::Seconds(10);
        assert!(age.is_fresh(Some(1_000), 10_999));
        assert!(!age.is_fresh(Some(1_000), 11_000));
        assert!(!age.is_fresh(None, 0));
        assert!(MaxAge::Forever.is_fresh(None, i64::MAX));
        assert!(!MaxAge::NoCache.is_fresh(Some(0), 0));
    }

    #[test]
    fn test_cache_date_header() {
        let mut headers = Headers::new();
        assert_eq!(cache_date(&headers), None);
        headers.insert(CACHE_DATE_HEADER, "1700000000000").unwrap();
        assert_eq!(cache_date(&headers), Some(1_700_000_000_000));
        assert!(now_millis() > 1_700_000_000_000);
    }
}
