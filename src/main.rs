pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod network_type;
pub mod p2p;
pub mod peer_cache;
pub mod probes;
pub mod shutdown;

use clap::Parser;
use std::sync::Arc;

use chain::{ChainView, InMemoryChainView, Slots};
use config::Config;
use events::PeerEventBus;
use network_type::NetworkType;
use p2p::communicator::PeerCommunicator;
use p2p::monitor::{NetworkMonitor, StartOptions};
use p2p::peer::PeerInfo;
use p2p::processor::PeerProcessor;
use p2p::storage::PeerStorage;
use p2p::transport::HttpTransport;
use peer_cache::{CachedPeer, PeerCache};
use shutdown::ShutdownManager;

#[derive(Parser, Debug)]
#[command(name = "relayd")]
#[command(about = "Relay Node Daemon", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[arg(short, long)]
    verbose: bool,

    #[arg(long)]
    generate_config: bool,

    /// Genesis-only mode: seed the roster but keep the discovery loop idle
    #[arg(long)]
    network_start: bool,

    /// Seed the roster and stop - no discovery pass, no update loop
    #[arg(long)]
    skip_discovery: bool,

    /// Treat the roster as sufficient regardless of its size
    #[arg(long)]
    ignore_minimum_network_reach: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Network type comes from the config file when one exists already
    let network_type = if let Ok(cfg) = Config::load_from_file(&args.config) {
        cfg.node.network_type()
    } else {
        NetworkType::Testnet
    };

    if args.generate_config {
        let config = Config::default();
        match config.save_to_file(&args.config) {
            Ok(_) => {
                println!("✅ Generated default config at: {}", args.config);
                return;
            }
            Err(e) => {
                eprintln!("❌ Failed to generate config: {}", e);
                std::process::exit(1);
            }
        }
    }

    let config = match Config::load_or_create(&args.config, &network_type) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("❌ Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    setup_logging(&config.logging, args.verbose);

    let network_type = config.node.network_type();
    let version = env!("CARGO_PKG_VERSION");
    let git_hash = option_env!("GIT_HASH").unwrap_or("unknown");
    let build_date = option_env!("BUILD_DATE").unwrap_or("unknown");

    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    let short_host = host.split('.').next().unwrap_or(&host);

    println!("\n🚀 Relay Node Daemon v{} ({})", version, git_hash);
    println!("  └─ Build: {}", build_date);
    println!("  └─ Host: {}", short_host);
    println!("📡 Network: {}", network_type);
    println!("  └─ Nethash: {}", network_type.nethash());
    println!("  └─ Data Dir: {}", config.storage.data_dir);
    println!();

    if let Err(e) = std::fs::create_dir_all(&config.storage.data_dir) {
        tracing::warn!(
            "Could not create data directory {}: {}",
            config.storage.data_dir,
            e
        );
    }

    // Cached peers from the previous run supplement the configured seeds
    let cache_path = std::path::Path::new(&config.storage.data_dir).join("peer-cache");
    let cache = match PeerCache::open(&cache_path.to_string_lossy()) {
        Ok(cache) => Some(cache),
        Err(e) => {
            tracing::warn!("Peer cache unavailable: {}", e);
            None
        }
    };
    let restored: Vec<PeerInfo> = cache
        .as_ref()
        .and_then(|c| c.load().ok())
        .unwrap_or_default()
        .into_iter()
        .map(|cached| PeerInfo {
            ip: cached.ip,
            port: cached.port,
            version: cached.version,
        })
        .collect();

    let shutdown = ShutdownManager::new();
    let events = Arc::new(PeerEventBus::new());
    let storage = Arc::new(PeerStorage::new());

    let chain = Arc::new(InMemoryChainView::new());
    chain.set_ready(true);

    let transport = Arc::new(HttpTransport::new());
    let communicator = Arc::new(PeerCommunicator::new(
        transport,
        storage.clone(),
        config.peering.global_timeout_ms,
    ));
    let processor = Arc::new(PeerProcessor::new(
        storage.clone(),
        communicator.clone(),
        events.clone(),
        &config.peering,
        network_type,
    ));
    let slots = Slots::new(
        network_type.genesis_timestamp(),
        network_type.block_time_seconds(),
    );

    let monitor = Arc::new(NetworkMonitor::new(
        config.peering.clone(),
        storage.clone(),
        processor,
        communicator,
        chain.clone() as Arc<dyn ChainView>,
        events,
        slots,
        restored,
        shutdown.token(),
    ));

    let options = StartOptions {
        dns: config.peering.dns_hosts.clone(),
        ntp: config.peering.ntp_hosts.clone(),
        network_start: args.network_start,
        skip_discovery: args.skip_discovery,
        disable_discovery: config.peering.disable_discovery,
        ignore_minimum_network_reach: args.ignore_minimum_network_reach,
    };

    if let Err(e) = monitor.clone().start(options).await {
        tracing::error!("❌ Failed to start network monitor: {}", e);
        std::process::exit(1);
    }

    tracing::info!(
        "✓ Network monitor running with {} peer(s)",
        storage.count()
    );

    shutdown.wait_for_shutdown().await;

    // Dump the roster so the next run does not depend on seeds alone
    if let Some(cache) = cache {
        let snapshot: Vec<CachedPeer> = storage
            .peers()
            .into_iter()
            .map(|peer| CachedPeer {
                ip: peer.ip,
                port: peer.port,
                version: peer.version,
            })
            .collect();
        match cache.store(&snapshot) {
            Ok(_) => tracing::info!("✓ Saved {} peer(s) to the cache", snapshot.len()),
            Err(e) => tracing::warn!("Failed to save peer cache: {}", e),
        }
    }
}

fn setup_logging(config: &config::LoggingConfig, verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if verbose { "debug" } else { &config.level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Under systemd/journald the timestamps and colors are redundant
    let is_systemd =
        std::env::var("JOURNAL_STREAM").is_ok() || std::env::var("INVOCATION_ID").is_ok();

    match config.format.as_str() {
        "json" => fmt().with_env_filter(filter).json().init(),
        _ => fmt()
            .with_env_filter(filter)
            .with_ansi(!is_systemd)
            .init(),
    }
}
