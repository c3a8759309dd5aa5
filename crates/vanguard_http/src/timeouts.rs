use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{Duration, timeout};

pub enum ReadOutcome {
    Read(usize),
    Timeout,
}

/// Reads one chunk off `stream` into `buf` under `timeout_dur`, the way
/// every read in this crate is guarded: the caller picks the deadline
/// (idle timeout on the first read of a connection, the read timeout on
/// every read after).
pub async fn read_more<S: AsyncRead + Unpin + ?Sized>(
    stream: &mut S,
    buf: &mut BytesMut,
    timeout_dur: Duration,
) -> anyhow::Result<ReadOutcome> {
    let mut tmp = [0u8; 8192];
    match timeout(timeout_dur, stream.read(&mut tmp)).await {
        Ok(res) => {
            let n = res?;
            if n > 0 {
                buf.extend_from_slice(&tmp[..n]);
            }
            Ok(ReadOutcome::Read(n))
        }
        Err(_) => Ok(ReadOutcome::Timeout),
    }
}
