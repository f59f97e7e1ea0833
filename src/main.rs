use anyhow::Context;
use clap::Parser;
use log::{info, warn};

use junction::api::JunctionApi;
use junction::conf::Config;
use junction::core::{CliArgs, setup_logging};
use junction::service::JunctionService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();
    let args = CliArgs::parse();
    info!(args = args; "Junction started.");

    let config = Config::load(args.config.as_deref()).context("loading config")?;
    let addr = config.server.addr();
    let service = JunctionService::new(config)
        .await
        .context("starting service")?;

    for (id, outcome) in service.refresh_all().await {
        if let Err(e) = outcome {
            warn!("refreshing connection '{}' failed: {}", id, e);
        }
    }
    if args.refresh_only {
        return Ok(());
    }

    let _pollers = service.spawn_pollers();
    info!("listening on {}", addr);
    JunctionApi::new(service)
        .serve(&addr)
        .await
        .context("serving HTTP API")?;
    Ok(())
}
