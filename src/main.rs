//! capab-check - connect, negotiate capabilities, report what was granted.

use std::time::Duration;

use slirc_capab::config::Config;
use slirc_capab::{Connection, Negotiator, Phase, SaslResult, Transport};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; CAPAB_LOG_JSON switches to one JSON object per event
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var_os("CAPAB_LOG_JSON").is_some() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {}", errors.len(), config_path);
    }

    info!(
        server = %config.server.address(),
        nickname = %config.identity.nickname,
        "Starting capab-check"
    );

    let conn = Connection::connect(&config.server).await?;
    let negotiator = Negotiator::new(config.negotiator_config(), conn.transport(), conn.bus());

    let outcome = tokio::select! {
        outcome = negotiator.negotiate() => outcome,
        _ = conn.closed() => anyhow::bail!("server closed the connection during negotiation"),
    };

    if outcome.phase == Phase::NotStarted {
        // Nothing requested, so registration was never sent.
        config.identity.registration().send(&conn.transport())?;
    }

    let granted: Vec<String> = outcome.acknowledged.iter().map(|c| c.to_string()).collect();
    info!(
        phase = ?outcome.phase,
        sasl = %outcome.sasl,
        caps = ?granted,
        "Negotiation complete"
    );
    if let SaslResult::Failed(reason) = &outcome.sasl {
        warn!(code = reason.error_code(), "SASL failed: {}", reason);
    }

    tokio::select! {
        _ = conn.closed() => info!("Server closed the connection"),
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Interrupted, disconnecting");
            match conn.transport().write_command("QUIT", &["capab-check"]) {
                // Give the writer a moment to flush before the tasks are dropped.
                Ok(()) => {
                    let _ = tokio::time::timeout(Duration::from_secs(2), conn.closed()).await;
                }
                Err(e) => warn!(error = %e, "Failed to send QUIT"),
            }
        }
    }

    let caps = negotiator.available_caps();
    info!(count = caps.len(), "Capabilities still acknowledged at exit");
    Ok(())
}
