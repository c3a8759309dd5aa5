//! The cookie-bound bearer-token gate: JWT minting and verification, the
//! login form contract, and the cross-host redirect dance that installs
//! the cookie on the target host. Traced from `ipfans/authgate`'s
//! `routers/routes.go`, since the teacher repo has no auth layer of its
//! own to adapt — implemented to the depth the contract with the
//! selection core needs (a request either carries a valid signed token
//! or is redirected), not gold-plated (no CSRF token, no refresh flow,
//! no password hashing beyond the traced original's plain comparison).

mod cookie;
mod gate;
mod token;

pub use cookie::{build_set_cookie, extract_cookie};
pub use gate::{GateDecision, decide};
pub use token::{AuthError, Claims, mint_token, verify_token};

/// Path the auth host serves the login form on.
pub const LOGIN_PATH: &str = "/login";
/// Path the target host serves the cookie-install redirect on, matching
/// the traced original's `/authgate/login/finish`.
pub const LOGIN_FINISH_PATH: &str = "/authgate/login/finish";

/// Renders the (intentionally minimal) login form. `host` is the
/// percent-decoded target-host URL the login POST should redirect back
/// to once credentials check out.
pub fn render_login_page(host: &str) -> String {
    format!(
        "<!doctype html><html><body>\
<form method=\"post\" action=\"{LOGIN_PATH}\">\
<input type=\"hidden\" name=\"host\" value=\"{host}\">\
<label>Username <input type=\"text\" name=\"username\"></label>\
<label>Password <input type=\"password\" name=\"password\"></label>\
<button type=\"submit\">Sign in</button>\
</form></body></html>"
    )
}

/// Builds the auth-host login URL a gated request is redirected to,
/// carrying the original target host as a query parameter — the
/// "cross-host redirect" named in the spec's purpose statement.
pub fn login_redirect_url(scheme: &str, auth_host: &str, target_host_url: &str) -> String {
    format!(
        "{scheme}://{auth_host}{LOGIN_PATH}?host={}",
        urlencode(target_host_url)
    )
}

/// Builds the redirect from the auth host back to the target host's
/// login-finish endpoint, carrying the freshly minted token.
pub fn login_finish_url(target_host_url: &str, token: &str) -> String {
    format!("{target_host_url}{LOGIN_FINISH_PATH}?token={}", urlencode(token))
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Reverses `urlencode`; used to read `host`/`token` query parameters
/// back out of a request path.
pub fn urldecode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(&raw[i + 1..i + 3], 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(bytes[i]);
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parses a `key=value&key2=value2` query string into owned, URL-decoded
/// pairs, the shape both the login GET (`?host=`) and the login-finish
/// redirect (`?token=`) use.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (urldecode(k), urldecode(v)),
            None => (urldecode(pair), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_round_trips_a_url_value() {
        let target = "http://app.internal:8080/dashboard";
        let url = login_redirect_url("http", "auth.internal", target);
        let query = url.split_once('?').unwrap().1;
        let pairs = parse_query(query);
        assert_eq!(pairs, vec![("host".to_string(), target.to_string())]);
    }

    #[test]
    fn login_finish_url_carries_the_token() {
        let url = login_finish_url("http://app.internal", "abc.def.ghi");
        assert_eq!(url, "http://app.internal/authgate/login/finish?token=abc.def.ghi");
    }
}
