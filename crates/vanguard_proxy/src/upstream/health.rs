use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::status::classify;

use super::Upstream;

/// Runs for the lifetime of the Upstream (or until its cancellation token
/// fires). The first probe runs immediately; results are published before
/// the prober sleeps, and ticks are never skipped to catch up.
pub(super) async fn run_prober(upstream: Arc<Upstream>) {
    loop {
        let healthy = probe_once(&upstream).await;
        upstream.set_healthy(healthy);

        tokio::select! {
            _ = upstream.cancel.cancelled() => return,
            _ = tokio::time::sleep(upstream.health_config.interval) => {}
        }
    }
}

async fn probe_once(upstream: &Upstream) -> bool {
    let cfg = &upstream.health_config;
    let addr = match upstream.url.socket_addrs(|| default_port(&upstream.url)) {
        Ok(addrs) if !addrs.is_empty() => addrs[0],
        _ => {
            warn!(
                target: "vanguard_proxy::upstream::health",
                url = %upstream.url,
                "probe failed: could not resolve upstream address"
            );
            return false;
        }
    };

    match timeout(cfg.timeout, run_probe_request(addr, cfg.method.as_str(), cfg.host.as_str(), cfg.path.as_str())).await {
        Ok(Ok(status)) => {
            let ok = classify(status, &cfg.allow_status_codes);
            debug!(
                target: "vanguard_proxy::upstream::health",
                url = %upstream.url,
                status,
                ok,
                "probe completed"
            );
            ok
        }
        Ok(Err(e)) => {
            debug!(
                target: "vanguard_proxy::upstream::health",
                url = %upstream.url,
                error = %e,
                "probe transport failure"
            );
            false
        }
        Err(_) => {
            debug!(
                target: "vanguard_proxy::upstream::health",
                url = %upstream.url,
                "probe timed out"
            );
            false
        }
    }
}

fn default_port(url: &url::Url) -> u16 {
    match url.scheme() {
        "https" => 443,
        _ => 80,
    }
}

async fn run_probe_request(
    addr: std::net::SocketAddr,
    method: &str,
    host: &str,
    path: &str,
) -> anyhow::Result<u16> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("{method} {path} HTTP/1.1\r\nHost: {host}\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut buf = Vec::with_capacity(512);
    let mut tmp = [0u8; 512];
    loop {
        if let Some(line_end) = find_crlf(&buf) {
            return parse_status_line(&buf[..line_end]);
        }
        let n = stream.read(&mut tmp).await?;
        if n == 0 {
            anyhow::bail!("connection closed before a status line was received");
        }
        buf.extend_from_slice(&tmp[..n]);
        if buf.len() > 4096 {
            anyhow::bail!("probe response status line too long");
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_status_line(line: &[u8]) -> anyhow::Result<u16> {
    let text = std::str::from_utf8(line)?;
    let mut parts = text.split_whitespace();
    let _version = parts.next().ok_or_else(|| anyhow::anyhow!("malformed status line"))?;
    let code = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("malformed status line"))?;
    Ok(code.parse()?)
}
