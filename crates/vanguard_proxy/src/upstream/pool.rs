use std::time::Instant;

use bytes::BytesMut;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::Upstream;

/// A connection that has been handed to a caller, with whatever trailing
/// bytes were already read off the wire alongside it (leftover pipelined
/// response bytes carried across checkout/checkin).
pub(crate) struct PooledStream {
    pub stream: TcpStream,
    pub read_buf: BytesMut,
    last_used: Instant,
}

impl Upstream {
    /// Pop the most recently returned connection (LIFO, favors warm
    /// sockets), discarding any that have sat idle past the configured
    /// TTL, falling back to a fresh connection.
    pub(crate) async fn checkout(&self) -> anyhow::Result<PooledStream> {
        loop {
            let candidate = {
                let mut pool = self.pool.lock().expect("pool lock poisoned");
                pool.pop()
            };
            match candidate {
                Some(pooled) => {
                    if pooled.last_used.elapsed() > self.client_options.max_idle_conn_duration {
                        debug!(
                            target: "vanguard_proxy::upstream::pool",
                            url = %self.url,
                            "dropping idle-expired pooled connection"
                        );
                        continue;
                    }
                    self.note_conn_opened();
                    return Ok(pooled);
                }
                None => {
                    let stream = self.connect_fresh().await?;
                    self.note_conn_opened();
                    return Ok(PooledStream {
                        stream,
                        read_buf: BytesMut::new(),
                        last_used: Instant::now(),
                    });
                }
            }
        }
    }

    /// Returns a still-usable connection to the pool, subject to the
    /// per-host cap. Connections over the cap (and ones the caller decides
    /// are unusable) are simply dropped.
    pub(crate) fn checkin(&self, mut pooled: PooledStream, reusable: bool) {
        self.note_conn_closed();
        if !reusable {
            return;
        }
        pooled.last_used = Instant::now();
        let mut pool = self.pool.lock().expect("pool lock poisoned");
        if pool.len() < self.client_options.max_conns_per_host {
            pool.push(pooled);
        }
    }

    /// Called when a checked-out connection is discarded without going
    /// through `checkin` (a write failure mid-request, for example).
    pub(crate) fn discard_checked_out(&self) {
        self.note_conn_closed();
    }

    async fn connect_fresh(&self) -> anyhow::Result<TcpStream> {
        let addr = self
            .url
            .socket_addrs(|| if self.url.scheme() == "https" { 443 } else { 80 })?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("upstream url resolved to no addresses"))?;

        let stream = timeout(self.client_options.dial_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| anyhow::anyhow!("dial timeout connecting to {addr}"))??;

        if self.client_options.keep_alive {
            stream.set_nodelay(true).ok();
        }
        Ok(stream)
    }
}
