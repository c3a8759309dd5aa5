/// A parsed entry of `health_check.allow_status_codes`: either an exact
/// three-digit code or an `Nxx` wildcard family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPattern {
    Exact(u16),
    Wildcard(u16),
}

impl StatusPattern {
    /// Parses one pattern. Anything that isn't exactly three ASCII digits
    /// or one digit followed by `xx` is unrecognized and matches nothing.
    pub fn parse(raw: &str) -> Option<Self> {
        let bytes = raw.as_bytes();
        if bytes.len() != 3 {
            return None;
        }
        if bytes[1] == b'x' && bytes[2] == b'x' {
            let digit = (bytes[0] as char).to_digit(10)?;
            return Some(StatusPattern::Wildcard(digit as u16));
        }
        if bytes.iter().all(u8::is_ascii_digit) {
            let code: u16 = raw.parse().ok()?;
            return Some(StatusPattern::Exact(code));
        }
        None
    }

    pub fn matches(&self, code: u16) -> bool {
        match self {
            StatusPattern::Exact(c) => *c == code,
            StatusPattern::Wildcard(n) => {
                let lo = n * 100;
                let hi = lo + 100;
                (lo..hi).contains(&code)
            }
        }
    }
}

/// Classifies a probe response status code against the configured
/// `allow_status_codes` patterns. An empty pattern list falls back to the
/// plain "2xx or 3xx" default.
pub fn classify(code: u16, patterns: &[StatusPattern]) -> bool {
    if patterns.is_empty() {
        return (200..400).contains(&code);
    }
    patterns.iter().any(|p| p.matches(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exact_and_wildcard() {
        assert_eq!(StatusPattern::parse("503"), Some(StatusPattern::Exact(503)));
        assert_eq!(StatusPattern::parse("2xx"), Some(StatusPattern::Wildcard(2)));
        assert_eq!(StatusPattern::parse("bogus"), None);
        assert_eq!(StatusPattern::parse("5x"), None);
    }

    #[test]
    fn empty_pattern_list_is_2xx_or_3xx() {
        assert!(classify(200, &[]));
        assert!(classify(399, &[]));
        assert!(!classify(400, &[]));
        assert!(!classify(199, &[]));
    }

    #[test]
    fn wildcard_2xx_rejects_everything_else() {
        let patterns = vec![StatusPattern::parse("2xx").unwrap()];
        assert!(classify(200, &patterns));
        assert!(classify(299, &patterns));
        assert!(!classify(300, &patterns));
        assert!(!classify(500, &patterns));
    }

    #[test]
    fn exact_500_matches_only_500() {
        let patterns = vec![StatusPattern::parse("500").unwrap()];
        assert!(classify(500, &patterns));
        assert!(!classify(501, &patterns));
        assert!(!classify(200, &patterns));
    }
}
