//! Ties the connection pool, header rewrite, and response streaming
//! together into one request/response round trip against a chosen
//! Upstream.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};
use vanguard_http::ParsedRequest;

use crate::headers::rewrite_request_headers;
use crate::response::stream_http_response;
use crate::upstream::Upstream;

/// Outcome of one forwarding attempt. `ConnectionFailed` tells the caller
/// the chosen Upstream's connection was unusable before any bytes of the
/// response reached the client — safe to retry against a different
/// Upstream. `Served` means a response (success or upstream-side error)
/// was already written to the client and must not be retried.
pub enum ForwardOutcome {
    Served,
    ConnectionFailed,
}

/// Sends `req` to `upstream` and streams its response back to
/// `client_stream`. Per SPEC_FULL's Proxying module, a write failure or a
/// dead pooled connection on the very first attempt is reported as
/// `ConnectionFailed` so the caller can ask the Selector for another
/// Upstream; once any response bytes have reached the client the attempt
/// is committed and errors are swallowed (the client has already started
/// reading a reply).
pub async fn forward_once<S>(
    upstream: &Arc<Upstream>,
    req: &ParsedRequest,
    client_ip: &str,
    scheme: &str,
    client_stream: &mut S,
) -> anyhow::Result<ForwardOutcome>
where
    S: AsyncWrite + Unpin,
{
    let mut pooled = match upstream.checkout().await {
        Ok(p) => p,
        Err(err) => {
            warn!(target: "vanguard_proxy::forward", url = %upstream.origin(), error = %err, "failed to obtain upstream connection");
            return Ok(ForwardOutcome::ConnectionFailed);
        }
    };

    let keep_alive = !req.close_after;
    let rewritten_headers =
        rewrite_request_headers(&req.headers, client_ip, scheme, keep_alive, req.body.len());

    let request_line = req
        .headers
        .lines()
        .next()
        .unwrap_or("GET / HTTP/1.1")
        .to_string();

    let mut wire = Vec::with_capacity(rewritten_headers.len() + req.body.len() + request_line.len() + 4);
    wire.extend_from_slice(request_line.as_bytes());
    wire.extend_from_slice(b"\r\n");
    wire.extend_from_slice(rewritten_headers.as_bytes());
    wire.extend_from_slice(b"\r\n");
    wire.extend_from_slice(&req.body);

    if let Err(err) = pooled.stream.write_all(&wire).await {
        debug!(target: "vanguard_proxy::forward", url = %upstream.origin(), error = %err, "write to upstream failed, discarding connection");
        upstream.discard_checked_out();
        return Ok(ForwardOutcome::ConnectionFailed);
    }

    let read_timeout = upstream.client_options.read_timeout;
    match stream_http_response(
        &mut pooled,
        client_stream,
        &req.method,
        read_timeout,
        1 << 20,
        0,
    )
    .await
    {
        Ok(reusable) => {
            upstream.checkin(pooled, reusable);
            Ok(ForwardOutcome::Served)
        }
        Err(err) => {
            warn!(target: "vanguard_proxy::forward", url = %upstream.origin(), error = %err, "error streaming upstream response");
            upstream.discard_checked_out();
            Ok(ForwardOutcome::Served)
        }
    }
}
