use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tracing::info;

mod bot;
mod config;
mod dashboard;
mod db;
mod ledger;

use bot::CommandRouter;
use config::Config;
use dashboard::AppState;
use db::Journal;
use ledger::{LedgerStore, SessionKey};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let store = LedgerStore::new(config.default_unit);
    info!("Default wager unit: {}", config.default_unit);

    // Optional journal: replay before taking traffic
    let journal = match &config.journal_path {
        Some(path) => {
            let journal = Journal::open(path)?;
            let stats = journal.replay_into(&store)?;
            info!(
                "Journal {} replayed: {} session(s), {} wager(s), {} account(s), {} skipped, winning number {:?}",
                path, stats.sessions, stats.wagers, stats.accounts, stats.skipped, stats.winning_outcome
            );
            Some(journal)
        }
        None => {
            info!("No journal configured, ledger is in-memory only");
            None
        }
    };

    let current = SessionKey::now();
    info!(
        "Current session {} is {}",
        current,
        if store.is_open(&current) { "open" } else { "closed" }
    );

    let state = AppState {
        router: CommandRouter::new(store, journal),
        admin_token: config.admin_token.clone(),
        session_clock: SessionKey::now,
    };
    let app = dashboard::router(state);
    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("Gateway listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
