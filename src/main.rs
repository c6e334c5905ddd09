use clap::Parser;
use replikv::raft::{ClusterNode, ClusterNodeConfig, DistStore, KvFsm, LocalConsensus};
use replikv::{Store, StoreConfig};
use slog::{info, o, Drain, Logger};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "replikv")]
#[command(about = "Replicated key-value store with TTL expiration", long_about = None)]
struct Args {
    /// Address to listen on (e.g. 0.0.0.0:7000)
    #[arg(short = 'l', long)]
    listen: String,

    /// Advertised address for other nodes to connect to.
    /// If not specified, uses the listen address.
    #[arg(short = 'a', long)]
    advertise: Option<String>,

    /// Stable node ID
    #[arg(short, long)]
    node_id: String,

    /// Expiration sweep interval in seconds (0 disables the sweep)
    #[arg(long, default_value_t = 60)]
    clean_interval: u64,

    /// Per-sweep scan budget in seconds (0 means unbounded)
    #[arg(long, default_value_t = 1)]
    clean_duration: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let logger = Logger::root(drain, o!("node_id" => args.node_id.clone()));

    let advertise = args.advertise.clone().unwrap_or_else(|| args.listen.clone());

    let store = Arc::new(Store::new(
        logger.clone(),
        StoreConfig::new()
            .with_clean_interval(Duration::from_secs(args.clean_interval))
            .with_max_clean_duration(Duration::from_secs(args.clean_duration)),
    )?);

    let fsm = Arc::new(KvFsm::new(logger.clone(), store.clone()));
    let consensus = Arc::new(LocalConsensus::new(logger.clone(), fsm));

    let dist_store = Arc::new(DistStore::new(
        logger.clone(),
        consensus.clone(),
        store.clone(),
    ));

    let cluster = ClusterNode::new(
        logger.clone(),
        consensus.clone(),
        None,
        ClusterNodeConfig {
            id: args.node_id.clone(),
            real_address: args.listen.clone(),
            advertised_address: advertise,
            bootstrap_cluster: true,
        },
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let cleaner = dist_store.clone();
    let cleaning = tokio::spawn(async move {
        cleaner.run_cleaning(shutdown_rx).await;
    });

    cluster.run(false).await?;

    info!(logger, "node started"; "listen" => &args.listen);

    signal::ctrl_c().await?;
    info!(logger, "shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = cleaning.await;
    cluster.shutdown().await?;

    Ok(())
}
