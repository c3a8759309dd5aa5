use vanguard_config::CookieConfig;

/// Extracts one cookie's value from a raw `Cookie:` request header line.
/// Case-sensitive on the cookie name, per RFC 6265.
pub fn extract_cookie(headers: &str, name: &str) -> Option<String> {
    for line in headers.lines().skip(1) {
        let line = line.trim();
        let Some((header_name, value)) = line.split_once(':') else {
            continue;
        };
        if !header_name.trim().eq_ignore_ascii_case("cookie") {
            continue;
        }
        for pair in value.split(';') {
            let pair = pair.trim();
            if let Some((k, v)) = pair.split_once('=') {
                if k.trim() == name {
                    return Some(v.trim().to_string());
                }
            }
        }
    }
    None
}

/// Builds the `Set-Cookie` header value that installs the token on the
/// target host, applied by the login-finish handler per §1's "cross-host
/// redirect that installs the cookie on the target host".
pub fn build_set_cookie(cfg: &CookieConfig, token: &str) -> String {
    let mut out = format!("{}={token}; Path={}; Max-Age={}", cfg.name(), cfg.path(), cfg.max_age_secs());
    if let Some(domain) = cfg.domain() {
        out.push_str("; Domain=");
        out.push_str(domain);
    }
    if cfg.http_only() {
        out.push_str("; HttpOnly");
    }
    if cfg.secure() {
        out.push_str("; Secure");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_named_cookie_among_several() {
        let headers = "GET / HTTP/1.1\r\nHost: x\r\nCookie: a=1; vanguard_token=abc.def; b=2\r\n\r\n";
        assert_eq!(extract_cookie(headers, "vanguard_token").as_deref(), Some("abc.def"));
    }

    #[test]
    fn missing_cookie_header_returns_none() {
        let headers = "GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        assert_eq!(extract_cookie(headers, "vanguard_token"), None);
    }

    #[test]
    fn set_cookie_includes_attributes() {
        let cfg = CookieConfig::default();
        let value = build_set_cookie(&cfg, "tok123");
        assert!(value.starts_with("vanguard_token=tok123;"));
        assert!(value.contains("HttpOnly"));
    }
}
