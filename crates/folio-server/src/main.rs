use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio_server::config::AppConfig;
use folio_server::orchestrator::Scheduler;
use folio_server::session::ChromeLauncher;
use folio_server::AppState;

#[derive(Parser)]
#[command(name = "folio", version, about = "Scheduled wallet portfolio snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and the HTTP API (default)
    Serve,
    /// Refresh every configured wallet once, print the report and exit
    Once,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio=info,folio_server=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .init();

    let cli = Cli::parse();

    println!("================================================");
    println!("        FOLIO PORTFOLIO SNAPSHOTS - Starting     ");
    println!("================================================");

    let config = AppConfig::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    println!("[CONFIG] Server: {}:{}", config.server.host, config.server.port);
    println!("[CONFIG] Wallets: {} solana, {} evm", config.wallets.solana.len(), config.wallets.evm.len());
    println!("[CONFIG] Refresh interval: {} minutes", config.scheduler.interval_minutes);
    println!("[CONFIG] Output dir: {}", config.output.dir.display());
    println!("[CONFIG] Browser headless: {}", config.browser.headless);

    let shutdown = CancellationToken::new();
    let state = AppState::build(config, Arc::new(ChromeLauncher::new()), shutdown.child_token())
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    for wallet in state.roster.all() {
        println!("[ROSTER] {} -> {}", wallet.short(), wallet.chain());
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Once => run_once(state).await,
        Command::Serve => serve(state, shutdown).await,
    }
}

async fn run_once(state: AppState) -> anyhow::Result<()> {
    tracing::info!("Running a single refresh");
    let report = state.orchestrator.run_once().await;
    state.orchestrator.terminate_sessions().await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_success() {
        anyhow::bail!("No wallet was refreshed ({} attempted)", report.attempted);
    }
    Ok(())
}

async fn serve(state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    println!("[SESSIONS] Starting browser sessions...");
    match state.orchestrator.prewarm().await {
        Ok(started) => {
            println!("[SESSIONS] {} browser session(s) ready", started);
            tracing::info!(started, "Browser sessions pre-warmed");
        }
        Err(e) => {
            tracing::error!(error = %e, "No browser session could be started");
            state.orchestrator.terminate_sessions().await;
            anyhow::bail!("No browser session could be started: {}", e);
        }
    }

    let scheduler = Scheduler::new(
        state.orchestrator.clone(),
        state.config.scheduler.interval(),
        state.config.scheduler.run_on_start,
    )
    .spawn(shutdown.child_token());

    let addr: SocketAddr = state.config.server_addr().parse()?;
    let orchestrator = state.orchestrator.clone();
    let app = folio_server::app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!("[ROUTER] Routes configured: /health, /portfolio?address=, /api/v1/portfolio/{{wallet}}, /refresh");
    println!("================================================");
    println!("  Server listening on http://{}", addr);
    println!("================================================");
    println!();
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    println!("[SHUTDOWN] Stopping scheduler and browser sessions...");
    shutdown.cancel();
    if let Err(e) = scheduler.await {
        tracing::warn!(error = %e, "Scheduler task ended abnormally");
    }
    orchestrator.terminate_sessions().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = shutdown.cancelled() => {}
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
