use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    http::{HeaderMap, HeaderValue, Uri, header},
    routing::get,
};
use clap::{Parser, Subcommand};
use proxreport_core::Configuration;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tower_http::{
    set_header::SetResponseHeaderLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{info, trace, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    cluster::Peer,
    config::Settings,
    probe::{SnapshotSource, SystemProbe},
    tls::TlsListener,
    users::UserStore,
};

mod admin;
mod cluster;
mod config;
mod probe;
mod render;
mod route;
mod tls;
mod users;

#[derive(Debug, Parser)]
#[command(name = "proxreport-server")]
struct Cli {
    #[arg(short, long, value_name = "FILE", help = "Path to config file")]
    config_path: Option<String>,
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the server
    Serve,

    /// Print the current report of this host as JSON
    Report,

    /// Administrative commands
    #[command(subcommand)]
    Admin(admin::AdminCommands),
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub config: Arc<Configuration>,
    pub users: Arc<UserStore>,
    pub probe: Arc<dyn SnapshotSource>,
    pub peers: Arc<[Peer]>,
    pub autorefresh_seconds: u64,
}

fn app(state: AppState) -> Router {
    let authed = Router::new()
        .route("/", get(route::dashboard))
        .route("/cluster", get(route::cluster))
        .nest(
            "/api/v1",
            Router::new()
                .route("/report", get(route::report))
                .route("/summary", get(route::summary)),
        )
        // every page reflects the current state of the host
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    Router::new()
        .route("/health", get(route::health))
        .route("/static/style.css", get(route::stylesheet))
        .merge(authed)
        .fallback(route::not_found)
        .layer((
            TraceLayer::new_for_http(),
            // Prevent requests to hang forever
            TimeoutLayer::new(Duration::from_secs(60)),
        ))
        .with_state(state)
}

fn redirect_app(https_port: u16) -> Router {
    Router::new()
        .fallback(move |headers: HeaderMap, uri: Uri| {
            route::redirect_to_https(https_port, headers, uri)
        })
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    trace!("using command line arguments {:?}", cli);

    let settings = config::load(&cli.config_path.unwrap_or("config.toml".to_owned()))?;

    match cli.commands {
        Commands::Serve => serve(settings).await?,
        Commands::Report => {
            let config = settings.report;
            let snapshot = SystemProbe::new().snapshot(&config.mountpoints).await;
            let report = proxreport_core::compose(&config, &snapshot);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Admin(command) => admin::admin(command, &settings.server.users_file).await?,
    }

    Ok(())
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let users = UserStore::load(&settings.server.users_file)
        .await
        .map_err(|e| anyhow::anyhow!("{e} (create a user with `admin user add <name>`)"))?;
    if users.is_empty() {
        warn!("users file is empty, nobody will be able to log in");
    }

    let tls = settings.tls();
    let peers = settings
        .peers
        .into_iter()
        .map(Peer::new)
        .collect::<Result<Vec<_>, _>>()?;

    let server = settings.server;
    let state = AppState {
        config: Arc::new(settings.report),
        users: Arc::new(users),
        probe: Arc::new(SystemProbe::new()),
        peers: Arc::from(peers),
        autorefresh_seconds: server.autorefresh_seconds,
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let http_addr = SocketAddr::from((server.address, server.http_port));
    let http_listener = TcpListener::bind(http_addr).await?;

    match tls {
        Some(files) => {
            let acceptor = tls::acceptor(&files).await?;
            let https_addr = SocketAddr::from((server.address, server.https_port));
            let https_listener =
                TlsListener::new(TcpListener::bind(https_addr).await?, acceptor)?;

            info!("HTTPS listening on {https_addr}");
            info!("HTTP redirect listening on {http_addr}");

            tokio::try_join!(
                axum::serve(https_listener, app(state))
                    .with_graceful_shutdown(shutdown.clone().cancelled_owned())
                    .into_future(),
                axum::serve(http_listener, redirect_app(server.https_port))
                    .with_graceful_shutdown(shutdown.clone().cancelled_owned())
                    .into_future(),
            )?;
        }
        None => {
            warn!("no certfile/keyfile configured, serving plain HTTP");
            info!("HTTP listening on {http_addr}");

            axum::serve(http_listener, app(state))
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await?;
        }
    }

    info!("server stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                #[cfg(debug_assertions)]
                let default_log_level = format!(
                    "{}=debug,tower_http=debug,axum=trace",
                    env!("CARGO_CRATE_NAME")
                )
                .into();

                #[cfg(not(debug_assertions))]
                let default_log_level = format!(
                    "{}=info,tower_http=info,axum=info",
                    env!("CARGO_CRATE_NAME")
                )
                .into();

                default_log_level
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal(token: CancellationToken) {
    let _shutdown_guard = token.drop_guard();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
