//! `crmsync`: sign in to the CRM API and follow its live change feed.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crmsync_core::session::{FileSecretStore, SessionEvent, SessionManager};
use crmsync_core::{CrmSync, StoreChange, SyncConfig};
use crmsync_gateway::HttpGateway;
use crmsync_realtime::{ChannelExit, RealtimeChannel, RealtimeConfig};

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Parser)]
#[command(
    name = "crmsync",
    version,
    about = "Sync client for the CRM API",
    arg_required_else_help = true
)]
struct Cli {
    /// REST root, e.g. http://localhost:3001/api
    #[arg(long, global = true, env = "CRM_API_URL")]
    api_url: Option<String>,

    /// Broadcast server origin; defaults to the API origin.
    #[arg(long, global = true, env = "CRM_SOCKET_URL")]
    socket_url: Option<String>,

    #[arg(long, global = true, env = "CRM_ROOM")]
    room: Option<String>,

    #[arg(long, global = true, env = "CRM_SESSION_FILE", value_name = "PATH")]
    session_file: Option<PathBuf>,

    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and persist the session token.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "CRM_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the persisted session.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Load the dataset once and print the dashboard counters.
    Stats,
    /// Load the dataset, then apply live updates until interrupted.
    Watch,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    configure_logging(cli.debug);

    if let Err(err) = run(cli).await {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

fn configure_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Flags win over the environment; unset keys fall back to it.
fn load_config(cli: &Cli) -> SyncConfig {
    let overrides = [
        ("CRM_API_URL", cli.api_url.clone()),
        ("CRM_SOCKET_URL", cli.socket_url.clone()),
        ("CRM_ROOM", cli.room.clone()),
        (
            "CRM_SESSION_FILE",
            cli.session_file
                .as_ref()
                .map(|path| path.display().to_string()),
        ),
    ];
    SyncConfig::from_lookup(|key| {
        overrides
            .iter()
            .find(|(name, _)| *name == key)
            .and_then(|(_, value)| value.clone())
            .or_else(|| std::env::var(key).ok())
    })
}

struct App {
    config: SyncConfig,
    session: Arc<SessionManager>,
    gateway: Arc<HttpGateway>,
}

impl App {
    fn new(config: SyncConfig) -> Result<Self> {
        let secrets = Arc::new(FileSecretStore::new(config.session_file.clone()));
        let session = Arc::new(SessionManager::load(secrets));
        let gateway = Arc::new(
            HttpGateway::from_config(&config, Arc::clone(&session))
                .context("failed to build API client")?,
        );
        Ok(Self {
            config,
            session,
            gateway,
        })
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli);
    let app = App::new(config)?;

    match cli.command {
        Command::Login { username, password } => {
            let user = app.gateway.login(&username, &password).await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Command::Logout => {
            app.gateway.logout()?;
            println!("Signed out");
        }
        Command::Whoami => match app.session.user()? {
            Some(user) if app.session.is_signed_in() => {
                println!("{}", serde_json::to_string_pretty(&user)?)
            }
            _ => bail!("not signed in"),
        },
        Command::Stats => {
            let sync = CrmSync::new(app.gateway.clone());
            let stats = sync.commands().load_snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Watch => watch(app).await?,
    }
    Ok(())
}

/// Joins the room before the snapshot request so no broadcast falls between
/// the two; events received meanwhile wait in the buffer and are applied on
/// top of the snapshot.
async fn watch(app: App) -> Result<()> {
    let sync = CrmSync::new(app.gateway.clone());
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let mut channel = RealtimeChannel::new(RealtimeConfig::from_sync_config(&app.config))
        .with_session(Arc::clone(&app.session));
    channel.start(events_tx)?;

    let stats = match sync.commands().load_snapshot().await {
        Ok(stats) => stats,
        Err(err) => {
            channel.close().await;
            return Err(err).context("initial load failed");
        }
    };
    info!(
        "Loaded {} clients, {} products, {} salespeople, {} active BANs",
        stats.total_clients,
        stats.total_products,
        stats.total_salespeople,
        stats.active_billing_accounts
    );
    let reconciler = sync.spawn_reconciler(events_rx);

    let mut changes = sync.store().subscribe();
    let mut session_events = app.session.subscribe();
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                break;
            }
            exit = channel.wait() => {
                match exit {
                    Some(ChannelExit::Refused(reason)) => warn!("Broadcast server refused the connection: {}", reason),
                    Some(ChannelExit::RetriesExhausted) => warn!("Lost the broadcast server; giving up"),
                    other => info!("Channel stopped: {:?}", other),
                }
                break;
            }
            change = changes.recv() => match change {
                Ok(StoreChange::Record { kind, action, id }) => {
                    info!("{} {} {}", action.as_str(), kind, id)
                }
                Ok(StoreChange::Reloaded) => info!("Dataset reloaded"),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Skipped {} change notifications", missed)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            event = session_events.recv() => {
                if let Ok(SessionEvent::Expired) = event {
                    warn!("Session expired; run `crmsync login` again");
                }
            }
        }
    }

    if interrupted {
        channel.close().await;
    }
    drop(channel);

    let applied = reconciler.await.context("reconciler task failed")?;
    info!(
        "Applied {} remote changes ({} skipped)",
        applied.applied, applied.skipped
    );
    println!("{}", serde_json::to_string_pretty(&sync.commands().stats())?);
    Ok(())
}
