use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Duration;
use tracing::{debug, warn};

use crate::responses::{send_400, send_408, send_413, send_431};
use crate::timeouts::{ReadOutcome, read_more};

/// A fully-read HTTP/1.x request: request line, the header block verbatim
/// (used for host extraction and for forwarding to an Upstream), and the
/// body fully buffered up to the configured limit.
#[derive(Debug)]
pub struct ParsedRequest {
    pub headers: String,
    pub method: String,
    pub path: String,
    pub http_version: String,
    pub body: Vec<u8>,
    pub close_after: bool,
}

/// Reads one full request off `stream`: headers up to `\r\n\r\n`, then the
/// body (Content-Length or chunked, fully buffered — this edge does not
/// stream a client body incrementally). `Ok(None)` means the connection
/// should close without a response (EOF, or a malformed request for which
/// an error response has already been written).
pub async fn read_http_request<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    idle_timeout: Duration,
    read_timeout: Duration,
    max_headers: usize,
    max_body: usize,
) -> anyhow::Result<Option<ParsedRequest>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let headers_end = loop {
        if let Some(pos) = find_headers_end(buf) {
            break pos;
        }
        if max_headers > 0 && buf.len() > max_headers {
            send_431(stream).await?;
            return Ok(None);
        }
        let deadline = if buf.is_empty() { idle_timeout } else { read_timeout };
        match read_more(stream, buf, deadline).await? {
            ReadOutcome::Timeout => {
                if buf.is_empty() {
                    return Ok(None);
                }
                send_408(stream).await?;
                return Ok(None);
            }
            ReadOutcome::Read(0) => return Ok(None),
            ReadOutcome::Read(_) => {}
        }
    };

    let header_bytes = buf.split_to(headers_end + 4);
    let headers_str = String::from_utf8_lossy(&header_bytes[..header_bytes.len() - 4]).to_string();

    debug!(target: "vanguard_http::request", header_len = headers_str.len(), "parsed request headers");

    let meta = match parse_request_metadata(&headers_str) {
        Ok(meta) => meta,
        Err(err) => {
            warn!(target: "vanguard_http::request", error = ?err, "invalid request headers");
            send_400(stream).await?;
            return Ok(None);
        }
    };

    if !meta.is_chunked && max_body > 0 && meta.content_length > max_body {
        send_413(stream).await?;
        return Ok(None);
    }

    let body = if meta.is_chunked {
        match read_chunked_body(stream, buf, read_timeout, max_body).await? {
            Some(body) => body,
            None => {
                send_400(stream).await?;
                return Ok(None);
            }
        }
    } else {
        read_fixed_body(stream, buf, meta.content_length, read_timeout).await?
    };

    Ok(Some(ParsedRequest {
        headers: headers_str,
        method: meta.method,
        path: meta.path,
        http_version: meta.http_version,
        body,
        close_after: meta.close_after,
    }))
}

async fn read_fixed_body<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    content_length: usize,
    read_timeout: Duration,
) -> anyhow::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut body = Vec::with_capacity(content_length.min(1 << 20));
    while body.len() < content_length {
        if !buf.is_empty() {
            let take = (content_length - body.len()).min(buf.len());
            body.extend_from_slice(&buf[..take]);
            buf.advance(take);
            continue;
        }
        match read_more(stream, buf, read_timeout).await? {
            ReadOutcome::Timeout => anyhow::bail!("timed out reading request body"),
            ReadOutcome::Read(0) => anyhow::bail!("connection closed mid-body"),
            ReadOutcome::Read(_) => {}
        }
    }
    Ok(body)
}

/// Fully decodes a chunked request body into its constituent bytes (chunk
/// framing removed), bounded by `max_body`. `Ok(None)` signals a malformed
/// chunk stream.
async fn read_chunked_body<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    read_timeout: Duration,
    max_body: usize,
) -> anyhow::Result<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let Some(line) = read_line(stream, buf, read_timeout).await? else {
            return Ok(None);
        };
        let size_str = match std::str::from_utf8(&line) {
            Ok(s) => s.split(';').next().unwrap_or("").trim(),
            Err(_) => return Ok(None),
        };
        let Ok(chunk_size) = usize::from_str_radix(size_str, 16) else {
            return Ok(None);
        };

        if chunk_size == 0 {
            loop {
                match read_line(stream, buf, read_timeout).await? {
                    Some(trailer) if trailer.is_empty() => return Ok(Some(body)),
                    Some(_) => continue,
                    None => return Ok(None),
                }
            }
        }

        if max_body > 0 && body.len() + chunk_size > max_body {
            return Ok(None);
        }

        while buf.len() < chunk_size + 2 {
            match read_more(stream, buf, read_timeout).await? {
                ReadOutcome::Timeout | ReadOutcome::Read(0) => return Ok(None),
                ReadOutcome::Read(_) => {}
            }
        }
        body.extend_from_slice(&buf[..chunk_size]);
        buf.advance(chunk_size + 2); // chunk data + trailing CRLF
    }
}

/// Reads one CRLF-terminated line, without the terminator. `Ok(None)` on
/// timeout, EOF, or a line lacking the terminator.
async fn read_line<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    read_timeout: Duration,
) -> anyhow::Result<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(pos) = buf.windows(2).position(|w| w == b"\r\n") {
            let line = buf[..pos].to_vec();
            buf.advance(pos + 2);
            return Ok(Some(line));
        }
        match read_more(stream, buf, read_timeout).await? {
            ReadOutcome::Timeout | ReadOutcome::Read(0) => return Ok(None),
            ReadOutcome::Read(_) => {}
        }
    }
}

/// Extracts the `Host` header value (case-insensitive name, first match
/// wins) from a raw header block, the `Host` used to route on.
pub fn extract_host_header(headers: &str) -> Option<String> {
    for line in headers.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("host") {
            let host = value.trim();
            if !host.is_empty() && is_valid_host(host) {
                return Some(host.to_string());
            }
        }
    }
    None
}

fn find_headers_end(buf: &BytesMut) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[derive(Debug)]
struct RequestMetadata {
    method: String,
    path: String,
    http_version: String,
    content_length: usize,
    close_after: bool,
    is_chunked: bool,
}

#[derive(Debug)]
enum HeaderParseError {
    InvalidContentLength,
    ConflictingContentLength,
    InvalidHost,
    ConflictingHost,
    MissingHost,
    InvalidTransferEncoding,
    TransferEncodingContentLength,
}

#[derive(Default)]
struct ContentLengthState {
    value: Option<usize>,
    invalid: bool,
    conflict: bool,
}

impl ContentLengthState {
    fn add(&mut self, raw: &str) {
        let mut any = false;
        for part in raw.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            any = true;
            match trimmed.parse::<usize>() {
                Ok(len) => match self.value {
                    Some(prev) if prev != len => {
                        self.conflict = true;
                        self.invalid = true;
                    }
                    Some(_) => {}
                    None => self.value = Some(len),
                },
                Err(_) => self.invalid = true,
            }
        }
        if !any {
            self.invalid = true;
        }
    }
}

fn split_header_tokens(value: &str) -> impl Iterator<Item = String> + '_ {
    value.split(',').filter_map(|token| {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase())
        }
    })
}

fn parse_request_metadata(headers: &str) -> Result<RequestMetadata, HeaderParseError> {
    let mut lines = headers.lines();
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("-").to_string();
    let path = parts.next().unwrap_or("/").to_string();
    let http_version = parts.next().unwrap_or("HTTP/1.1").to_string();

    let mut content_length = ContentLengthState::default();
    let mut connection_close = false;
    let mut connection_keep_alive = false;
    let mut is_chunked = false;
    let mut host_value: Option<String> = None;
    let mut host_conflict = false;
    let mut te_present = false;
    let mut te_invalid = false;
    let mut te_last: Option<String> = None;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();

        match name.to_ascii_lowercase().as_str() {
            "content-length" => content_length.add(value),
            "host" => {
                if host_value.is_none() {
                    host_value = Some(value.to_string());
                } else if host_value.as_deref() != Some(value) {
                    host_conflict = true;
                }
            }
            "connection" | "proxy-connection" => {
                for token in split_header_tokens(value) {
                    match token.as_str() {
                        "close" => connection_close = true,
                        "keep-alive" => connection_keep_alive = true,
                        _ => {}
                    }
                }
            }
            "transfer-encoding" => {
                te_present = true;
                let mut saw_token = false;
                for token in split_header_tokens(value) {
                    saw_token = true;
                    if !is_valid_token(&token) {
                        te_invalid = true;
                    }
                    if token == "chunked" {
                        is_chunked = true;
                    }
                    te_last = Some(token);
                }
                if !saw_token {
                    te_invalid = true;
                }
            }
            _ => {}
        }
    }

    if host_conflict {
        return Err(HeaderParseError::ConflictingHost);
    }

    if http_version == "HTTP/1.1" {
        let Some(host) = host_value.as_deref() else {
            return Err(HeaderParseError::MissingHost);
        };
        if !is_valid_host(host) {
            return Err(HeaderParseError::InvalidHost);
        }
    } else if let Some(host) = host_value.as_deref() {
        if !is_valid_host(host) {
            return Err(HeaderParseError::InvalidHost);
        }
    }

    if content_length.invalid {
        return Err(if content_length.conflict {
            HeaderParseError::ConflictingContentLength
        } else {
            HeaderParseError::InvalidContentLength
        });
    }

    if te_present {
        if te_invalid {
            return Err(HeaderParseError::InvalidTransferEncoding);
        }
        if te_last.as_deref() != Some("chunked") {
            return Err(HeaderParseError::InvalidTransferEncoding);
        }
        if content_length.value.is_some() {
            return Err(HeaderParseError::TransferEncodingContentLength);
        }
    }

    let close_after = if http_version == "HTTP/1.0" {
        !connection_keep_alive || connection_close
    } else {
        connection_close
    };

    Ok(RequestMetadata {
        method,
        path,
        http_version,
        content_length: content_length.value.unwrap_or(0),
        close_after,
        is_chunked,
    })
}

fn is_valid_host(host: &str) -> bool {
    let host = host.trim();
    if host.is_empty() || host.contains('/') || host.contains('\\') {
        return false;
    }
    if host.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    host.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']' | '_'))
}

fn is_valid_token(token: &str) -> bool {
    token.chars().all(|c| {
        matches!(c,
            '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' | '^' | '_' | '`' | '|' | '~'
                | '0'..='9' | 'a'..='z' | 'A'..='Z')
    })
}

#[cfg(test)]
mod tests {
    use super::{HeaderParseError, extract_host_header, parse_request_metadata};

    #[test]
    fn accepts_duplicate_content_length() {
        let headers = "POST /upload HTTP/1.1\r\nHost: example\r\nContent-Length: 5\r\nContent-Length: 5\r\n\r\n";
        let meta = parse_request_metadata(headers).expect("expected ok");
        assert_eq!(meta.content_length, 5);
    }

    #[test]
    fn rejects_conflicting_content_length() {
        let headers = "POST /upload HTTP/1.1\r\nHost: example\r\nContent-Length: 5\r\nContent-Length: 6\r\n\r\n";
        let err = parse_request_metadata(headers).unwrap_err();
        assert!(matches!(err, HeaderParseError::ConflictingContentLength));
    }

    #[test]
    fn rejects_missing_host_http11() {
        let headers = "GET / HTTP/1.1\r\nUser-Agent: test\r\n\r\n";
        let err = parse_request_metadata(headers).unwrap_err();
        assert!(matches!(err, HeaderParseError::MissingHost));
    }

    #[test]
    fn rejects_transfer_encoding_with_content_length() {
        let headers =
            "POST / HTTP/1.1\r\nHost: example\r\nTransfer-Encoding: chunked\r\nContent-Length: 10\r\n\r\n";
        let err = parse_request_metadata(headers).unwrap_err();
        assert!(matches!(err, HeaderParseError::TransferEncodingContentLength));
    }

    #[test]
    fn extracts_host_case_insensitively() {
        let headers = "GET / HTTP/1.1\r\nHOST: example.internal\r\n\r\n";
        assert_eq!(extract_host_header(headers).as_deref(), Some("example.internal"));
    }

    #[test]
    fn extract_host_none_when_absent() {
        let headers = "GET / HTTP/1.0\r\nUser-Agent: test\r\n\r\n";
        assert_eq!(extract_host_header(headers), None);
    }
}
