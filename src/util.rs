use std::time::Duration;

/// Statuses worth another attempt: overloaded or briefly unavailable servers.
pub(crate) fn retriable_status(code: u16) -> bool {
    matches!(code, 500 | 502 | 503 | 504 | 429 | 408)
}

/// Delay before retry number `retry` (1-based): `factor * 2^(retry - 1)`
/// seconds, capped at `max`.
pub(crate) fn backoff(factor: f64, retry: usize, max: Duration) -> Duration {
    let exp = retry.saturating_sub(1).min(30) as i32;
    let secs = factor * 2f64.powi(exp);
    if !secs.is_finite() || secs <= 0.0 {
        return Duration::ZERO;
    }
    let next = Duration::try_from_secs_f64(secs).unwrap_or(max);
    if next > max { max } else { next }
}

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Shortens a response body for error messages and logs.
pub(crate) fn truncate_body(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes total)", &body[..end], body.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_the_factor() {
        let max = Duration::from_secs(120);
        let delays: Vec<u64> = (1..=4).map(|n| backoff(2.0, n, max).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16]);
    }

    #[test]
    fn backoff_is_capped() {
        let max = Duration::from_secs(120);
        assert_eq!(backoff(2.0, 10, max), max);
    }

    #[test]
    fn zero_factor_disables_sleeping() {
        assert_eq!(backoff(0.0, 3, Duration::from_secs(120)), Duration::ZERO);
    }

    #[test]
    fn urljoin_handles_slashes() {
        assert_eq!(urljoin("https://h/api/", "login"), "https://h/api/login");
        assert_eq!(urljoin("https://h/api", "/login"), "https://h/api/login");
        assert_eq!(urljoin("https://h/api", "https://o/x"), "https://o/x");
    }

    #[test]
    fn retriable_statuses() {
        assert!(retriable_status(503));
        assert!(retriable_status(429));
        assert!(!retriable_status(404));
        assert!(!retriable_status(200));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "ééééé";
        let out = truncate_body(s, 3);
        assert!(out.starts_with('é'));
        assert!(out.ends_with("(10 bytes total)"));
        assert_eq!(truncate_body("short", 10), "short");
    }
}
