use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod desktop;
mod http;
mod logbuf;

use bealink_core::BealinkConfig;
use bealink_notify::{Dispatcher, ReqwestTransport, SettingsStore};
use bealink_tasks::{AhkLauncher, StdinAhkRunner};

const DEFAULT_FILTER: &str =
    "bealink_gateway=info,bealink_tasks=info,bealink_notify=info,tower_http=debug";

/// Bealink desktop agent: HTTP control surface for this PC.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to bealink.toml (default: next to the executable).
    #[arg(long)]
    config: Option<String>,

    /// Try this port before the configured list.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Config comes first so the log buffer can be sized; its error is
    // reported once logging is up.
    let loaded = BealinkConfig::load(cli.config.as_deref());
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => BealinkConfig::default(),
    };

    let logs = logbuf::LogBuffer::new(config.logging.buffer_lines);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(logs.clone()),
        )
        .init();

    if let Err(e) = loaded {
        warn!("Config load failed ({}), using defaults", e);
    }
    if let Some(port) = cli.port {
        config.gateway.ports.retain(|p| *p != port);
        config.gateway.ports.insert(0, port);
    }

    // push settings + dispatcher
    let settings_path = config.notify.resolve_settings_path();
    info!(path = %settings_path.display(), "push settings file");
    let settings = Arc::new(SettingsStore::load(settings_path));
    let dispatcher = Dispatcher::new(settings, Arc::new(ReqwestTransport::new()?));

    // AutoHotkey: tracked countdown scripts + stdin snippets
    let ahk_dir = config.ahk.resolve_dir();
    info!(dir = %ahk_dir.display(), "AutoHotkey directory");
    let launcher = Arc::new(AhkLauncher::new(&ahk_dir));
    let runner = Arc::new(StdinAhkRunner::new(&ahk_dir));

    let (listener, port) = bind_first(&config.gateway.bind, &config.gateway.ports).await?;
    let ready_delay = Duration::from_secs(config.notify.system_ready_delay_secs);

    let state = Arc::new(app::AppState::new(
        config,
        port,
        launcher,
        runner,
        Arc::new(desktop::ArboardClipboard),
        dispatcher,
        logs,
    ));
    let router = app::build_router(Arc::clone(&state));

    // announce the machine once the server is accepting connections
    app::spawn_ready_notice(Arc::clone(&state), ready_delay);

    info!("Bealink gateway listening on port {}", port);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Bealink gateway stopped");
    Ok(())
}

/// Bind the first free port from `ports`, in order.
async fn bind_first(bind: &str, ports: &[u16]) -> anyhow::Result<(TcpListener, u16)> {
    let mut last_err = None;
    for &port in ports {
        let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                let bound = listener.local_addr()?.port();
                return Ok((listener, bound));
            }
            Err(e) => {
                warn!(%addr, error = %e, "port unavailable, trying next");
                last_err = Some(e);
            }
        }
    }
    match last_err {
        Some(e) => Err(anyhow::anyhow!("no free port in {:?}: {}", ports, e)),
        None => Err(anyhow::anyhow!("no ports configured")),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received, shutting down");
}
