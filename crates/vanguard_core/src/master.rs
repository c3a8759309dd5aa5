use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, instrument};
use vanguard_config::GatewayConfig;
use vanguard_proxy::Registry;

use crate::worker::handle_connection;

/// Caps the number of simultaneously open client connections. Matches the
/// teacher's `worker_connections`-sized global semaphore, hardcoded here
/// since `GatewayConfig` doesn't carry a worker-process model to size it
/// from.
const MAX_CONNECTIONS: usize = 1024;

pub struct Master {
    cfg: Arc<GatewayConfig>,
    registry: Arc<Registry>,
}

impl Master {
    pub fn new(cfg: Arc<GatewayConfig>, registry: Arc<Registry>) -> Self {
        Self { cfg, registry }
    }

    /// Binds the listener and runs the accept loop until the process is
    /// killed. Never returns `Ok` in normal operation.
    #[instrument(skip(self), fields(addr = %self.cfg.addr()))]
    pub async fn run(self) -> anyhow::Result<()> {
        info!(target: "vanguard::master", "starting vanguard master");

        let listener = bind_listener(self.cfg.addr()).await?;
        let semaphore = Arc::new(Semaphore::new(MAX_CONNECTIONS));

        info!(
            target: "vanguard::master",
            addr = %self.cfg.addr(),
            max_connections = MAX_CONNECTIONS,
            "listening for incoming connections"
        );

        accept_loop(listener, self.cfg.addr().to_string(), semaphore, self.cfg, self.registry).await
    }
}

async fn bind_listener(listen_addr: &str) -> anyhow::Result<TcpListener> {
    info!(target: "vanguard::master", listen = %listen_addr, "binding listener");
    match TcpListener::bind(listen_addr).await {
        Ok(listener) => {
            info!(target: "vanguard::master", listen = %listen_addr, "bind successful");
            Ok(listener)
        }
        Err(e) => {
            error!(target: "vanguard::master", listen = %listen_addr, error = ?e, "failed to bind listener");
            Err(e.into())
        }
    }
}

struct AcceptedConn {
    stream: TcpStream,
    addr: SocketAddr,
    permit: OwnedSemaphorePermit,
}

async fn accept_with_permit(
    listener: &TcpListener,
    listen_addr: &str,
    semaphore: &Arc<Semaphore>,
) -> anyhow::Result<AcceptedConn> {
    let (stream, addr) = match listener.accept().await {
        Ok(pair) => pair,
        Err(e) => {
            error!(target: "vanguard::master", listen = %listen_addr, error = ?e, "failed to accept connection");
            return Err(e.into());
        }
    };

    let permit = match semaphore.clone().acquire_owned().await {
        Ok(p) => p,
        Err(e) => {
            error!(target: "vanguard::master", listen = %listen_addr, error = ?e, "failed to acquire connection permit");
            return Err(e.into());
        }
    };

    debug!(
        target: "vanguard::master",
        listen = %listen_addr,
        client_addr = %addr,
        available_permits = semaphore.available_permits(),
        "connection accepted"
    );

    Ok(AcceptedConn { stream, addr, permit })
}

async fn accept_loop(
    listener: TcpListener,
    listen_addr: String,
    semaphore: Arc<Semaphore>,
    cfg: Arc<GatewayConfig>,
    registry: Arc<Registry>,
) -> anyhow::Result<()> {
    loop {
        let AcceptedConn { stream, addr, permit } =
            accept_with_permit(&listener, &listen_addr, &semaphore).await?;

        let cfg = cfg.clone();
        let registry = registry.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let span = tracing::info_span!("worker_connection", client_addr = %addr);
            let _enter = span.enter();

            debug!(target: "vanguard::worker", "worker spawned for incoming connection");

            if let Err(e) = handle_connection(stream, addr, cfg, registry).await {
                error!(target: "vanguard::worker", client_addr = %addr, error = ?e, "error while handling connection");
            } else {
                debug!(target: "vanguard::worker", client_addr = %addr, "connection handled successfully");
            }
        });
    }
}
