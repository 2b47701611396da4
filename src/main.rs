use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;

use kickbonk::config::Config;
use kickbonk::control_client::ControlClient;
use kickbonk::models::ThrowKind;
use kickbonk::reconnect::ReconnectPolicy;
use kickbonk::relay::{Relay, RelayServer};
use kickbonk::state::AppState;
use kickbonk::token_store::{FileTokenStore, TokenStore};
use kickbonk::vts::{PluginInfo, SessionClient};

#[derive(Parser)]
#[command(name = "kickbonk", version, about = "Throw things at your avatar")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay, the control API and the VTube Studio session (default).
    Serve,
    /// Fire a throw through a running server.
    Throw {
        #[arg(value_enum, default_value_t = Kind::Single)]
        kind: Kind,
        /// Items in a barrage; defaults to the configured barrage count.
        #[arg(long)]
        count: Option<u32>,
        #[arg(long)]
        control_url: Option<String>,
    },
    /// Show relay and session status of a running server.
    Status {
        #[arg(long)]
        control_url: Option<String>,
    },
    /// Move a running relay to another port.
    RelayPort {
        port: u16,
        #[arg(long)]
        control_url: Option<String>,
    },
    /// Erase the stored VTube Studio token.
    ForgetToken,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Single,
    Barrage,
}

impl From<Kind> for ThrowKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Single => ThrowKind::Single,
            Kind::Barrage => ThrowKind::Barrage,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kickbonk=debug,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            print_banner(&config);
            serve(config).await
        }
        Command::Throw {
            kind,
            count,
            control_url,
        } => {
            let client = control_client(&config, control_url);
            client
                .throw(kind.into(), count)
                .await
                .map(|n| eprintln!("throw queued for {n} display(s)"))
                .map_err(|e| e.to_string())
        }
        Command::Status { control_url } => {
            let client = control_client(&config, control_url);
            client
                .status()
                .await
                .map(|(relay, session)| {
                    eprintln!("relay    {relay}");
                    eprintln!("session  {session}");
                })
                .map_err(|e| e.to_string())
        }
        Command::RelayPort { port, control_url } => {
            let client = control_client(&config, control_url);
            client
                .set_relay_port(port)
                .await
                .map(|relay| eprintln!("relay    {relay}"))
                .map_err(|e| e.to_string())
        }
        Command::ForgetToken => {
            let store = FileTokenStore::new(&config.vts.token_path);
            store
                .clear()
                .await
                .map(|()| eprintln!("token erased from {}", store.path().display()))
                .map_err(|e| e.to_string())
        }
    };

    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn control_client(config: &Config, url: Option<String>) -> ControlClient {
    ControlClient::new(
        url.unwrap_or_else(|| format!("http://127.0.0.1:{}", config.control_port)),
    )
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");

    eprintln!();
    eprintln!("  \x1b[1;32mkickbonk\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mrelay\x1b[0m        {}:{}", config.bind_address, config.relay_port);
    eprintln!("  \x1b[2mcontrol\x1b[0m      {}:{}", config.bind_address, config.control_port);
    eprintln!("  \x1b[2mvts\x1b[0m          {}", config.vts.url());
    eprintln!("  \x1b[2mtoken\x1b[0m        {}", config.vts.token_path.display());
    if !config.vts.autoconnect {
        eprintln!();
        eprintln!("  \x1b[33m! VTube Studio autoconnect disabled\x1b[0m");
    }
    eprintln!();
}

async fn serve(config: Config) -> Result<(), String> {
    let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(&config.vts.token_path));
    let session = SessionClient::new(config.vts.url(), PluginInfo::default(), store);
    let relay = RelayServer::new(config.bind_address, Relay::new(), session.clone());
    relay
        .bind(config.relay_port)
        .await
        .map_err(|e| e.to_string())?;

    let reconnect = ReconnectPolicy::new(config.vts.retry_interval, config.vts.autoconnect);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconnect_task = tokio::spawn(reconnect.clone().run(session.clone(), shutdown_rx));

    let state = AppState {
        relay: relay.clone(),
        session: session.clone(),
        reconnect,
    };
    let app = kickbonk::routes::router(state);

    let listener = TcpListener::bind((config.bind_address, config.control_port))
        .await
        .map_err(|e| format!("failed to bind control port {}: {e}", config.control_port))?;
    if let Ok(addr) = listener.local_addr() {
        eprintln!("  \x1b[32m→ control API on {addr}\x1b[0m");
        eprintln!();
    }

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Everything goes down together.
    tracing::info!("shutting down");
    shutdown_tx.send_replace(true);
    let _ = reconnect_task.await;
    session.disconnect();
    relay.shutdown().await;

    served.map_err(|e| format!("control server error: {e}"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
