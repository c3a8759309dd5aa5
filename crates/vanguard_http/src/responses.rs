//! The gateway's own responses: the ones it writes itself rather than
//! relaying from an Upstream (errors, redirects, the login page).

use tokio::io::{AsyncWrite, AsyncWriteExt};

pub async fn send_response<W: AsyncWrite + Unpin + ?Sized>(
    stream: &mut W,
    status: &str,
    content_type: &str,
    body: &[u8],
) -> anyhow::Result<()> {
    let head = format!(
        "HTTP/1.1 {status}\r\nServer: vanguard/0.1.0\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await?;
    Ok(())
}

/// Sends a response carrying one or more extra headers verbatim (used for
/// the advisory `X-Error` header on 404/503, and `Set-Cookie` on the
/// auth-finish redirect).
pub async fn send_response_with_headers<W: AsyncWrite + Unpin + ?Sized>(
    stream: &mut W,
    status: &str,
    content_type: &str,
    extra_headers: &[(&str, &str)],
    body: &[u8],
) -> anyhow::Result<()> {
    let mut head = format!(
        "HTTP/1.1 {status}\r\nServer: vanguard/0.1.0\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n",
        body.len()
    );
    for (name, value) in extra_headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("Connection: close\r\n\r\n");
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await?;
    Ok(())
}

async fn send_text<W: AsyncWrite + Unpin + ?Sized>(
    stream: &mut W,
    status: &str,
    body: &str,
) -> anyhow::Result<()> {
    send_response(stream, status, "text/plain; charset=utf-8", body.as_bytes()).await
}

pub async fn send_400<W: AsyncWrite + Unpin + ?Sized>(stream: &mut W) -> anyhow::Result<()> {
    send_text(stream, "400 Bad Request", "400 Bad Request\n").await
}

pub async fn send_401<W: AsyncWrite + Unpin + ?Sized>(stream: &mut W) -> anyhow::Result<()> {
    send_text(stream, "401 Unauthorized", "401 Unauthorized\n").await
}

pub async fn send_404<W: AsyncWrite + Unpin + ?Sized>(stream: &mut W, reason: &str) -> anyhow::Result<()> {
    send_response_with_headers(
        stream,
        "404 Not Found",
        "text/plain; charset=utf-8",
        &[("X-Error", reason)],
        b"404 Not Found\n",
    )
    .await
}

pub async fn send_503<W: AsyncWrite + Unpin + ?Sized>(stream: &mut W, reason: &str) -> anyhow::Result<()> {
    send_response_with_headers(
        stream,
        "503 Service Unavailable",
        "text/plain; charset=utf-8",
        &[("X-Error", reason)],
        b"503 Service Unavailable\n",
    )
    .await
}

pub async fn send_408<W: AsyncWrite + Unpin + ?Sized>(stream: &mut W) -> anyhow::Result<()> {
    send_text(stream, "408 Request Timeout", "408 Request Timeout\n").await
}

pub async fn send_413<W: AsyncWrite + Unpin + ?Sized>(stream: &mut W) -> anyhow::Result<()> {
    send_text(stream, "413 Payload Too Large", "413 Payload Too Large\n").await
}

pub async fn send_431<W: AsyncWrite + Unpin + ?Sized>(stream: &mut W) -> anyhow::Result<()> {
    send_text(
        stream,
        "431 Request Header Fields Too Large",
        "431 Request Header Fields Too Large\n",
    )
    .await
}

pub async fn send_500<W: AsyncWrite + Unpin + ?Sized>(stream: &mut W) -> anyhow::Result<()> {
    send_text(stream, "500 Internal Server Error", "Internal Server Error\n").await
}

/// Sends an HTTP 307 redirect with the given `Location`, plus any
/// additional headers (used to attach `Set-Cookie` on the login-finish
/// redirect that installs the token cookie on the target host).
pub async fn send_redirect<W: AsyncWrite + Unpin + ?Sized>(
    stream: &mut W,
    location: &str,
    extra_headers: &[(&str, &str)],
) -> anyhow::Result<()> {
    let mut head = format!(
        "HTTP/1.1 307 Temporary Redirect\r\nServer: vanguard/0.1.0\r\nLocation: {location}\r\nContent-Length: 0\r\n"
    );
    for (name, value) in extra_headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("Connection: close\r\n\r\n");
    stream.write_all(head.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
