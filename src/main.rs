// src/main.rs

//! # Credential Ledger - Main Entry Point
//!
//! Boots the engine against the in-memory simulated chain and keeps the expiry
//! sweeps running until Ctrl-C.
//!
//! ## Initialization Sequence
//! 1. Load `.env` and the layered configuration
//! 2. Initialize logging
//! 3. Build the registry, ledger, submission lane, pipeline and exchange
//! 4. Run periodic sweeps
//!
//! ## Configuration
//! - `CREDLEDGER__ADMIN_KEY`: trust registry administrator (required)
//! - `CREDLEDGER__OPERATOR_KEY_HEX`: operator signing key (optional, generated when unset)
//! - `CREDLEDGER__PIPELINE__*`, `CREDLEDGER__PROOFS__*`, `CREDLEDGER__VERIFICATION__*`
//! - `RUST_LOG`: overrides `log_level`

use anyhow::Context;
use credential_ledger::blockchain::ledger_client::SimulatedChain;
use credential_ledger::config::Settings;
use credential_ledger::services::audit::{AuditTrail, LogAuditSink};
use credential_ledger::services::notifier::HttpCallbackNotifier;
use credential_ledger::utils::clock::system_clock;
use credential_ledger::CredentialService;
use dotenv::dotenv;
use log::info;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let settings = Settings::load().context("failed to load configuration")?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&settings.log_level))
        .init();

    let notifier = HttpCallbackNotifier::new(settings.verification.callback_timeout())
        .context("failed to build callback client")?;
    let sweep_every = Duration::from_secs(settings.sweep_interval_secs.max(1));

    let service = CredentialService::new(
        settings,
        Arc::new(SimulatedChain::new()),
        Arc::new(notifier),
        system_clock(),
        Arc::new(AuditTrail::with_sink(Arc::new(LogAuditSink))),
    )
    .context("failed to initialize credential service")?;

    info!(
        "Credential ledger ready; registry admin {}",
        service.registry().admin_key()
    );

    let mut ticker = tokio::time::interval(sweep_every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                service.sweep();
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    info!("Shutting down; {} credential(s) on the ledger", service.ledger().len());
    Ok(())
}
