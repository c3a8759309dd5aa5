//! Header rewrite applied to a request before it is forwarded to the
//! Upstream a Selector chose: strips hop-by-hop and previously-set
//! forwarded headers, then injects `X-Forwarded-*`/`X-Real-IP` the way a
//! reverse proxy is expected to.

use std::collections::HashSet;

/// Rewrites `req_headers` (the raw header block, request line included)
/// for forwarding. The body is always sent with an explicit
/// `Content-Length` — requests reaching this point have already been
/// fully buffered by the HTTP edge, so there is no chunked passthrough to
/// preserve on the request side.
pub(crate) fn rewrite_request_headers(
    req_headers: &str,
    client_ip: &str,
    scheme: &str,
    keep_alive: bool,
    body_len: usize,
) -> String {
    let connection_tokens = collect_connection_tokens(req_headers);
    let mut lines = req_headers.lines();
    let _request_line = lines.next();

    let mut headers: Vec<(String, String)> = Vec::new();
    let mut host_value = None;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_string();
        let value = value.trim().to_string();
        let name_lower = name.to_ascii_lowercase();

        if name.eq_ignore_ascii_case("host") {
            host_value = Some(value.clone());
        }

        if matches!(
            name_lower.as_str(),
            "x-forwarded-for" | "x-real-ip" | "x-forwarded-proto" | "x-forwarded-host"
        ) {
            continue;
        }

        if matches!(
            name_lower.as_str(),
            "connection"
                | "keep-alive"
                | "proxy-connection"
                | "te"
                | "trailer"
                | "transfer-encoding"
                | "upgrade"
                | "content-length"
        ) {
            continue;
        }

        if connection_tokens.contains(&name_lower) {
            continue;
        }

        headers.push((name, value));
    }

    headers.push(("X-Forwarded-For".into(), client_ip.to_string()));
    headers.push(("X-Real-IP".into(), client_ip.to_string()));
    headers.push(("X-Forwarded-Proto".into(), scheme.to_string()));
    if let Some(host) = host_value {
        headers.push(("X-Forwarded-Host".into(), host));
    }
    headers.push(("Connection".into(), if keep_alive { "keep-alive" } else { "close" }.into()));
    headers.push(("Content-Length".into(), body_len.to_string()));

    let mut out = String::new();
    for (name, value) in headers {
        out.push_str(&name);
        out.push_str(": ");
        out.push_str(&value);
        out.push_str("\r\n");
    }
    out
}

fn collect_connection_tokens(req_headers: &str) -> HashSet<String> {
    let mut tokens = HashSet::new();
    let mut lines = req_headers.lines();
    let _ = lines.next();
    for line in lines {
        let line = line.trim();
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("connection") {
            continue;
        }
        for token in value.split(',') {
            let trimmed = token.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase();
            if !trimmed.is_empty() {
                tokens.insert(trimmed);
            }
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_hop_by_hop_and_adds_forwarded_headers() {
        let req = "GET / HTTP/1.1\r\nHost: app.internal\r\nConnection: keep-alive\r\nX-Test: ok\r\n\r\n";
        let out = rewrite_request_headers(req, "203.0.113.4", "http", true, 0);
        assert!(!out.contains("Connection: keep-alive\r\nX-Test"));
        assert!(out.contains("X-Test: ok\r\n"));
        assert!(out.contains("X-Forwarded-For: 203.0.113.4\r\n"));
        assert!(out.contains("X-Forwarded-Host: app.internal\r\n"));
        assert!(out.contains("Connection: keep-alive\r\n"));
    }

    #[test]
    fn drops_headers_named_by_the_connection_token_list() {
        let req = "GET / HTTP/1.1\r\nHost: app.internal\r\nConnection: \"Foo\"\r\nFoo: bar\r\n\r\n";
        let out = rewrite_request_headers(req, "127.0.0.1", "http", false, 0);
        assert!(!out.contains("Foo: bar"));
    }
}
