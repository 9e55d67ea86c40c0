//! TapVolt CLI.
//!
//! This binary pairs with a Lightning Terminal node and:
//! - Remembers the paired session between runs
//! - Shows node info, channels, owned assets, the pending batch and peers
//! - Mints assets, finalizes or cancels batches, funds asset channels
//! - Serves the same operations over an HTTP API

use anyhow::Result;
use clap::{Parser, Subcommand};
use lnc_adapter::memory::make_asset;
use lnc_adapter::rest::DEFAULT_NODE_URL;
use lnc_adapter::{Credentials, MemoryNode, NodeConnector, RestConfig, RestConnector};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tap_schema::{AssetMeta, AssetType, Channel, Peer};
use tapvolt_core::api::create_router;
use tapvolt_core::{
    ConnectionState, Dashboard, DashboardConfig, FundChannelForm, MintForm, MintMetadata,
    DEFAULT_FINALIZE_FEE_RATE,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "tapvolt")]
#[command(about = "Dashboard for a Lightning Terminal node with Taproot Assets")]
struct Cli {
    /// Data directory for the stored session
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// REST gateway URL of the node
    #[arg(long, env = "TAPVOLT_NODE_URL", default_value = DEFAULT_NODE_URL)]
    node_url: String,

    /// Require a password for pairing and for unlocking a stored session
    #[arg(long)]
    require_password: bool,

    /// Fee rate for finalizing batches (sat/vbyte)
    #[arg(long, default_value_t = DEFAULT_FINALIZE_FEE_RATE)]
    fee_rate: u32,

    /// Accept self-signed node certificates
    #[arg(long)]
    accept_invalid_certs: bool,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1:17000")]
        bind: SocketAddr,
    },
    /// Pair with a node
    Connect {
        /// Pairing phrase (hex macaroon for the REST gateway)
        #[arg(long)]
        pairing_phrase: String,
        /// Password protecting the stored session
        #[arg(long)]
        password: Option<String>,
    },
    /// Unlock the stored session
    Login {
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show connection status
    Status,
    /// Show node info
    Node,
    /// List channels
    Channels,
    /// List owned assets
    Assets,
    /// Show the pending batch
    Batch,
    /// List peers
    Peers,
    /// Add an asset to the pending batch
    Mint {
        #[arg(long)]
        name: String,
        #[arg(long)]
        amount: String,
        /// Mint a collectible instead of a normal asset
        #[arg(long)]
        collectible: bool,
        /// Metadata text
        #[arg(long, conflicts_with = "file")]
        meta: Option<String>,
        /// File embedded as metadata
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Finalize the pending batch
    Finalize,
    /// Cancel the pending batch
    Cancel,
    /// Fund an asset channel
    FundChannel {
        /// Asset id (hex)
        #[arg(long)]
        asset_id: String,
        #[arg(long)]
        amount: String,
        /// Fee rate (sat/vbyte)
        #[arg(long)]
        fee_rate: String,
        /// Peer public key (hex)
        #[arg(long)]
        peer: String,
    },
    /// Connect to a peer
    ConnectPeer {
        /// Peer address as pubkey@host:port
        address: String,
    },
    /// Demo: run the full flow against an in-memory node
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = DashboardConfig {
        data_dir: cli.data_dir,
        require_password: cli.require_password,
        finalize_fee_rate: cli.fee_rate,
        include_unconfirmed_mints: true,
    };
    let rest = RestConfig {
        base_url: cli.node_url,
        accept_invalid_certs: cli.accept_invalid_certs,
        timeout: Duration::from_secs(cli.timeout),
    };

    if let Commands::Demo = cli.command {
        return run_demo(config).await;
    }

    let node: Arc<dyn NodeConnector> = Arc::new(RestConnector::new(rest)?);
    let dashboard = Dashboard::open(node, config)?;
    let restored = dashboard.init().await;

    match cli.command {
        Commands::Serve { bind } => {
            if let Err(e) = restored {
                info!("No session restored: {}", e);
            }
            run_server(dashboard, bind).await?;
        }
        Commands::Connect {
            pairing_phrase,
            password,
        } => {
            let mut credentials = Credentials::new(pairing_phrase);
            credentials.password = password;
            dashboard.connect(credentials).await?;
            show_status(&dashboard).await;
        }
        Commands::Login { password } => {
            dashboard.login(&password).await?;
            show_status(&dashboard).await;
        }
        Commands::Logout => {
            dashboard.logout().await?;
            println!("Logged out");
        }
        Commands::Status => {
            show_status(&dashboard).await;
        }
        Commands::Node => {
            require_connected(&dashboard, restored).await?;
            print_json(&dashboard.node_info().await)?;
        }
        Commands::Channels => {
            require_connected(&dashboard, restored).await?;
            print_json(&dashboard.channels().await)?;
        }
        Commands::Assets => {
            require_connected(&dashboard, restored).await?;
            print_json(&dashboard.assets().await)?;
        }
        Commands::Batch => {
            require_connected(&dashboard, restored).await?;
            print_json(&dashboard.pending_batch().await)?;
        }
        Commands::Peers => {
            require_connected(&dashboard, restored).await?;
            print_json(&dashboard.peers().await)?;
        }
        Commands::Mint {
            name,
            amount,
            collectible,
            meta,
            file,
        } => {
            require_connected(&dashboard, restored).await?;
            let metadata = match (file, meta) {
                (Some(path), _) => MintMetadata::File {
                    file_name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    bytes: std::fs::read(&path)?,
                },
                (None, Some(text)) => MintMetadata::Text(text),
                (None, None) => MintMetadata::None,
            };
            let form = MintForm {
                name,
                amount,
                asset_type: if collectible {
                    AssetType::Collectible
                } else {
                    AssetType::Normal
                },
                metadata,
            };
            let batch_key = dashboard.mint_asset(form).await?;
            println!("Asset added to batch {}", batch_key);
            print_json(&dashboard.pending_batch().await)?;
        }
        Commands::Finalize => {
            require_connected(&dashboard, restored).await?;
            let batch = dashboard.finalize_batch().await?;
            println!("Batch finalized:");
            print_json(&batch)?;
        }
        Commands::Cancel => {
            require_connected(&dashboard, restored).await?;
            let batch_key = dashboard.cancel_batch().await?;
            println!("Cancelled batch {}", batch_key);
        }
        Commands::FundChannel {
            asset_id,
            amount,
            fee_rate,
            peer,
        } => {
            require_connected(&dashboard, restored).await?;
            let form = FundChannelForm {
                asset_id,
                amount,
                fee_rate,
                peer_pubkey: peer,
            };
            let response = dashboard.fund_channel(form).await?;
            println!("Channel funding:");
            println!("  Txid: {}", response.txid);
            println!("  Output index: {}", response.output_index);
        }
        Commands::ConnectPeer { address } => {
            require_connected(&dashboard, restored).await?;
            dashboard.connect_peer(&address).await?;
            println!("Connected to {}", address);
        }
        Commands::Demo => unreachable!("handled above"),
    }

    Ok(())
}

async fn run_server(dashboard: Dashboard, bind: SocketAddr) -> Result<()> {
    info!(
        "Starting dashboard ({:?}) with config: {:?}",
        dashboard.connection_state().await,
        dashboard.config()
    );
    info!("Starting HTTP server on {}", bind);

    let router = create_router(dashboard);
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, router).await?;

    Ok(())
}

async fn require_connected(
    dashboard: &Dashboard,
    restored: Result<ConnectionState, tapvolt_core::DashboardError>,
) -> Result<()> {
    match restored {
        Ok(ConnectionState::Connected) => Ok(()),
        Ok(ConnectionState::AwaitingCredentials) => {
            match dashboard.session().await {
                Some(session) if session.is_paired => {
                    anyhow::bail!("Stored session is locked: run `tapvolt login --password ...`")
                }
                _ => anyhow::bail!("Not paired: run `tapvolt connect --pairing-phrase ...`"),
            }
        }
        Ok(state) => anyhow::bail!("Not connected ({:?})", state),
        Err(e) => Err(e.into()),
    }
}

async fn show_status(dashboard: &Dashboard) {
    let state = dashboard.snapshot().await;
    println!("Dashboard Status:");
    println!("  State: {:?}", state.connection);
    if let Some(session) = &state.session {
        println!("  Paired: {}", session.is_paired);
        println!("  Connected: {}", session.is_connected);
        if let Some(error) = &session.last_error {
            println!("  Last error: {}", error);
        }
    }
    if let Some(info) = &state.node_info {
        println!("  Node: {} ({})", info.alias, info.identity_pubkey);
        println!("  Network: {}", info.network().unwrap_or("unknown"));
        println!("  Block height: {}", info.block_height);
    }
    println!("  Channels: {}", state.channels.len());
    println!("  Assets: {}", state.assets.len());
    println!("  Pending batch: {} assets", state.pending_batch.len());
    println!("  Peers: {}", state.peers.len());
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_demo(config: DashboardConfig) -> Result<()> {
    info!("Running demo against an in-memory node...");

    let node = Arc::new(MemoryNode::new());
    node.accept_only("demo pairing phrase");
    node.add_channel(Channel {
        active: true,
        remote_pubkey: "02c0ffee".to_string(),
        channel_point: "c0ffee:0".to_string(),
        chan_id: 1,
        capacity: 1_000_000,
        local_balance: 600_000,
        remote_balance: 400_000,
        private: false,
    });
    node.add_asset(
        make_asset("genesis-art", AssetType::Collectible, 1),
        Some(AssetMeta::opaque_text("the first piece")),
    );

    let dashboard = Dashboard::in_memory(node.clone(), config)?;
    dashboard.init().await?;

    println!("\n=== Pairing ===");
    if let Err(e) = dashboard.connect(Credentials::new("wrong phrase")).await {
        println!("Wrong phrase rejected: {}", e);
    }
    dashboard
        .connect(Credentials::new("demo pairing phrase"))
        .await?;
    show_status(&dashboard).await;

    println!("\n=== Minting ===");
    let batch_key = dashboard
        .mint_asset(MintForm {
            name: "VoltCoin".to_string(),
            amount: "21000".to_string(),
            asset_type: AssetType::Normal,
            metadata: MintMetadata::Text("demo currency".to_string()),
        })
        .await?;
    dashboard
        .mint_asset(MintForm {
            name: "VoltBadge".to_string(),
            amount: "1".to_string(),
            asset_type: AssetType::Collectible,
            metadata: MintMetadata::File {
                file_name: "badge.svg".to_string(),
                bytes: b"<svg xmlns='http://www.w3.org/2000/svg'/>".to_vec(),
            },
        })
        .await?;
    println!("Pending batch {}:", batch_key);
    for draft in dashboard.pending_batch().await {
        println!("  {} x{} ({:?})", draft.name, draft.amount, draft.asset_type);
    }

    println!("\n=== Finalizing ===");
    if let Some(batch) = dashboard.finalize_batch().await? {
        println!("Batch transaction: {}", batch.batch_txid);
    }
    for asset in dashboard.assets().await {
        print!("  {} x{}", asset.name(), asset.amount);
        if let Some(meta) = &asset.decoded_meta {
            print!(" [{}]", meta);
        }
        println!();
    }

    println!("\n=== Peers and channels ===");
    let peer_key = "03".to_string() + &"ab".repeat(32);
    dashboard
        .connect_peer(&format!("{}@127.0.0.1:9735", peer_key))
        .await?;
    let coin_id = dashboard
        .assets()
        .await
        .iter()
        .find(|a| a.name() == "VoltCoin")
        .and_then(|a| a.asset_genesis.asset_id_hex())
        .unwrap_or_default();
    let funding = dashboard
        .fund_channel(FundChannelForm {
            asset_id: coin_id,
            amount: "1000".to_string(),
            fee_rate: "5".to_string(),
            peer_pubkey: peer_key,
        })
        .await?;
    println!("Funding transaction: {}", funding.txid);
    let peers: Vec<Peer> = dashboard.peers().await;
    println!("Peers: {}", peers.len());

    println!("\n=== Logout ===");
    dashboard.logout().await?;
    show_status(&dashboard).await;

    println!("\n=== Demo Complete ===");
    Ok(())
}
