use crate::token::verify_token;
use crate::login_redirect_url;

/// Outcome of gating one request against a virtual host that is not the
/// auth host. `decide` never looks at the auth host's own routes (login
/// GET/POST/finish) — those are dispatched separately once the caller
/// has already recognized `Host == auth_host`.
#[derive(Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// A valid, unexpired token was presented; forward to the selection
    /// core.
    Allow,
    /// No token, or an invalid one; redirect to the auth host's login
    /// form, carrying the original target host.
    RedirectToLogin(String),
}

/// Mirrors `authCheckMiddleware`/the `NoRoute` handler in the traced
/// original: a missing or unverifiable cookie always redirects, never
/// 401s, because the auth host is expected to collect credentials and
/// send the client back.
pub fn decide(
    target_host: &str,
    auth_host: &str,
    scheme: &str,
    token: Option<&str>,
    jwt_secret: &str,
) -> GateDecision {
    let target_url = format!("{scheme}://{target_host}");
    let redirect = || GateDecision::RedirectToLogin(login_redirect_url(scheme, auth_host, &target_url));

    let Some(token) = token else {
        return redirect();
    };
    match verify_token(token, jwt_secret) {
        Ok(_) => GateDecision::Allow,
        Err(_) => redirect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::mint_token;

    #[test]
    fn missing_cookie_redirects() {
        let decision = decide("app.internal", "auth.internal", "http", None, "secret");
        assert!(matches!(decision, GateDecision::RedirectToLogin(_)));
    }

    #[test]
    fn valid_token_allows() {
        let token = mint_token("alice", "secret", 1_700_000_000).unwrap();
        let decision = decide("app.internal", "auth.internal", "http", Some(&token), "secret");
        assert_eq!(decision, GateDecision::Allow);
    }

    #[test]
    fn token_signed_with_wrong_secret_redirects() {
        let token = mint_token("alice", "other-secret", 1_700_000_000).unwrap();
        let decision = decide("app.internal", "auth.internal", "http", Some(&token), "secret");
        assert!(matches!(decision, GateDecision::RedirectToLogin(_)));
    }

    #[test]
    fn redirect_url_carries_target_host() {
        let decision = decide("app.internal", "auth.internal", "http", None, "secret");
        let GateDecision::RedirectToLogin(url) = decision else {
            panic!("expected redirect");
        };
        assert!(url.starts_with("http://auth.internal/login?host="));
        assert!(url.contains("app.internal"));
    }
}
