use std::sync::Arc;

use vanguard_config::GatewayConfig;
use vanguard_core::Master;
use vanguard_proxy::Registry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vanguard_util::init_tracing();

    let cfg = GatewayConfig::from_file_or_default("vanguard.toml");
    cfg.print();

    if let Err(e) = cfg.checked_backends() {
        eprintln!("invalid backend configuration: {e}");
        std::process::exit(1);
    }

    let cfg = Arc::new(cfg);
    let registry = Arc::new(Registry::build(&cfg)?);

    let master = Master::new(cfg, registry);
    master.run().await
}
