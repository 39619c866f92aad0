use clap::Parser;
use log::{info, warn};
use miette::miette;
use std::time::Duration;
use streamer_server::replay::ReplayCoordinator;
use streamer_server::resolver::resolve_streams;
use streamer_server::{Cli, VERSION};
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    info!("streamer {} replaying {}", VERSION, args.base_path.display());

    let streams = resolve_streams(&args.resolver_config())?;
    if streams.is_empty() {
        warn!("No datastreams to replay");
        return Ok(());
    }

    let coordinator = ReplayCoordinator::new(streams, args.worker_options());
    let prompt = !args.no_prompt;

    Toplevel::new(move |s: SubsystemHandle| async move {
        s.start(SubsystemBuilder::new("Replay", move |a| {
            coordinator.run_subsystem(a, prompt)
        }));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(args.shutdown_timeout))
    .await
    .map_err(|e| miette!("Shutdown failed: {e:?}"))
}
