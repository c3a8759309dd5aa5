//! Per-connection HTTP/1 handler: reads each request, dispatches the auth
//! host's login routes, gates every other host behind a valid token, then
//! forwards to the `Upstream` the matching `Selector` picks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::Duration;
use tracing::{debug, info, warn};
use vanguard_auth::{
    GateDecision, LOGIN_FINISH_PATH, LOGIN_PATH, build_set_cookie, decide, extract_cookie,
    login_finish_url, mint_token, parse_query, render_login_page, verify_token,
};
use vanguard_config::GatewayConfig;
use vanguard_http::responses::{send_401, send_404, send_500, send_503, send_redirect, send_response};
use vanguard_http::{ParsedRequest, extract_host_header, read_http_request};
use vanguard_proxy::{Registry, forward_once};

const MAX_HEADERS_BYTES: usize = 64 * 1024;
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(15);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(65);
const BODY_READ_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn handle_connection(
    mut stream: TcpStream,
    client_addr: SocketAddr,
    cfg: Arc<GatewayConfig>,
    registry: Arc<Registry>,
) -> anyhow::Result<()> {
    info!(target: "vanguard::worker", "handling new client connection");

    let mut buf = BytesMut::new();
    let mut first_request = true;

    loop {
        let idle_timeout = if first_request { CLIENT_READ_TIMEOUT } else { KEEPALIVE_TIMEOUT };

        let req = match read_http_request(
            &mut stream,
            &mut buf,
            idle_timeout,
            BODY_READ_TIMEOUT,
            MAX_HEADERS_BYTES,
            MAX_BODY_BYTES,
        )
        .await?
        {
            Some(req) => req,
            None => break,
        };

        debug!(
            target: "vanguard::worker",
            method = %req.method,
            path = %req.path,
            "parsed request line"
        );

        let close_after = req.close_after;
        let force_close = dispatch(&mut stream, &cfg, &registry, &req, client_addr).await?;

        if force_close || close_after {
            break;
        }
        first_request = false;
    }

    info!(target: "vanguard::worker", %client_addr, "finished handling connection");
    Ok(())
}

fn split_path_query(path: &str) -> (&str, &str) {
    match path.split_once('?') {
        Some((p, q)) => (p, q),
        None => (path, ""),
    }
}

/// Handles one request. Returns whether the connection must be closed
/// regardless of what the request itself asked for (a write failure, or
/// a response whose framing makes keep-alive unsafe).
async fn dispatch(
    stream: &mut TcpStream,
    cfg: &Arc<GatewayConfig>,
    registry: &Arc<Registry>,
    req: &ParsedRequest,
    client_addr: SocketAddr,
) -> anyhow::Result<bool> {
    let host = match extract_host_header(&req.headers) {
        Some(h) => h,
        None => {
            send_404(stream, "missing Host header").await?;
            return Ok(true);
        }
    };
    let (path, query) = split_path_query(&req.path);

    if host == cfg.auth_host() {
        return handle_auth_host(stream, cfg, req, path, query).await;
    }

    if path == LOGIN_FINISH_PATH && req.method.eq_ignore_ascii_case("GET") {
        return handle_login_finish(stream, cfg, &host, query).await;
    }

    let token = extract_cookie(&req.headers, cfg.cookie().name());
    let scheme = cfg.scheme();
    match decide(&host, cfg.auth_host(), scheme, token.as_deref(), cfg.jwt_secret()) {
        GateDecision::RedirectToLogin(url) => {
            send_redirect(stream, &url, &[]).await?;
            Ok(false)
        }
        GateDecision::Allow => forward_to_backend(stream, registry, &host, req, client_addr, scheme).await,
    }
}

async fn handle_auth_host(
    stream: &mut TcpStream,
    cfg: &Arc<GatewayConfig>,
    req: &ParsedRequest,
    path: &str,
    query: &str,
) -> anyhow::Result<bool> {
    match (req.method.as_str(), path) {
        ("GET", "/") => {
            send_response(stream, "200 OK", "text/plain; charset=utf-8", b"vanguard is running\n").await?;
            Ok(false)
        }
        ("GET", p) if p == LOGIN_PATH => {
            let target_host = parse_query(query)
                .into_iter()
                .find(|(k, _)| k == "host")
                .map(|(_, v)| v)
                .unwrap_or_default();
            let body = render_login_page(&target_host);
            send_response(stream, "200 OK", "text/html; charset=utf-8", body.as_bytes()).await?;
            Ok(false)
        }
        ("POST", p) if p == LOGIN_PATH => handle_login_post(stream, cfg, req).await,
        _ => {
            send_404(stream, "no route on auth host").await?;
            Ok(true)
        }
    }
}

async fn handle_login_post(
    stream: &mut TcpStream,
    cfg: &Arc<GatewayConfig>,
    req: &ParsedRequest,
) -> anyhow::Result<bool> {
    let body = String::from_utf8_lossy(&req.body);
    let form = parse_query(&body);
    let find = |key: &str| form.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()).unwrap_or_default();
    let host = find("host");
    let username = find("username");
    let password = find("password");

    if !cfg.credential().matches(&username, &password) {
        send_401(stream).await?;
        return Ok(true);
    }

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let token = match mint_token(&username, cfg.jwt_secret(), now) {
        Ok(token) => token,
        Err(err) => {
            warn!(target: "vanguard::worker", error = %err, "failed to mint auth token");
            send_500(stream).await?;
            return Ok(true);
        }
    };

    let location = login_finish_url(&host, &token);
    send_redirect(stream, &location, &[]).await?;
    Ok(false)
}

async fn handle_login_finish(
    stream: &mut TcpStream,
    cfg: &Arc<GatewayConfig>,
    host: &str,
    query: &str,
) -> anyhow::Result<bool> {
    if host == cfg.auth_host() {
        send_404(stream, "login finish is not served on the auth host").await?;
        return Ok(true);
    }

    let token = parse_query(query).into_iter().find(|(k, _)| k == "token").map(|(_, v)| v);
    let Some(token) = token else {
        send_401(stream).await?;
        return Ok(true);
    };

    if verify_token(&token, cfg.jwt_secret()).is_err() {
        send_401(stream).await?;
        return Ok(true);
    }

    let cookie = build_set_cookie(cfg.cookie(), &token);
    send_redirect(stream, "/", &[("Set-Cookie", &cookie)]).await?;
    Ok(false)
}

async fn forward_to_backend(
    stream: &mut TcpStream,
    registry: &Arc<Registry>,
    host: &str,
    req: &ParsedRequest,
    client_addr: SocketAddr,
    scheme: &str,
) -> anyhow::Result<bool> {
    let Some(selector) = registry.lookup(host) else {
        send_404(stream, "no backend for this host").await?;
        return Ok(true);
    };

    let client_ip = client_addr.ip().to_string();
    let attempts = selector.pool_len().max(1);

    for _ in 0..attempts {
        let upstream = match selector.next(host) {
            Ok(upstream) => upstream,
            Err(err) => {
                send_503(stream, &err.to_string()).await?;
                return Ok(true);
            }
        };

        match forward_once(&upstream, req, &client_ip, scheme, stream).await? {
            vanguard_proxy::ForwardOutcome::Served => return Ok(false),
            vanguard_proxy::ForwardOutcome::ConnectionFailed => continue,
        }
    }

    send_503(stream, "all upstreams unreachable").await?;
    stream.flush().await?;
    Ok(true)
}
