//! `agency-client` binary: submit one agency's wagers and report its winners.

use std::path::PathBuf;
use std::process::ExitCode;

use agency_client::config::{ClientConfig, ConfigLayer};
use agency_client::{AgencyError, InvalidRecordPolicy, RecordSource, Session};
use clap::Parser;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "agency-client", about = "Submit agency wagers to the lottery server")]
struct Cli {
    /// JSON configuration file; flags and environment override its values.
    #[arg(long, env = "CLI_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "CLI_ID")]
    id: Option<u8>,

    #[arg(long, env = "CLI_SERVER_ADDRESS")]
    server_address: Option<String>,

    #[arg(long, env = "CLI_BATCH_MAXAMOUNT")]
    batch_max_amount: Option<usize>,

    #[arg(long, env = "CLI_LOG_LEVEL")]
    log_level: Option<String>,

    #[arg(long, env = "CLI_DATA_PATH")]
    data_path: Option<PathBuf>,

    #[arg(long, env = "CLI_SHUTDOWN_GRACE_MS")]
    shutdown_grace_ms: Option<u64>,

    /// `skip` or `abort` on lines whose fields fail validation.
    #[arg(long, env = "CLI_INVALID_RECORDS")]
    invalid_records: Option<InvalidRecordPolicy>,
}

impl Cli {
    fn load_config(self) -> agency_client::Result<ClientConfig> {
        let file = match &self.config {
            Some(path) => ConfigLayer::from_json_file(path)?,
            None => ConfigLayer::default(),
        };
        let overrides = ConfigLayer {
            id: self.id,
            server_address: self.server_address,
            batch_max_amount: self.batch_max_amount,
            log_level: self.log_level,
            data_path: self.data_path,
            shutdown_grace_ms: self.shutdown_grace_ms,
            invalid_records: self.invalid_records,
        };
        ClientConfig::try_from(file.merge(overrides))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Cli::parse().load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("agency-client: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(?config, "configuration loaded");

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "agency-client failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ClientConfig) -> agency_client::Result<()> {
    let source = RecordSource::open(&config.data_path).await.map_err(|e| {
        tracing::error!(path = %config.data_path.display(), error = %e, "cannot open record file");
        e
    })?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut session = Session::builder(config.id)
        .server_address(config.server_address.clone())
        .batch_size(config.batch_max_amount)
        .invalid_records(config.invalid_records)
        .shutdown(shutdown_rx)
        .build()?;

    let mut task = tokio::spawn(async move { session.run(source).await });

    let outcome = tokio::select! {
        joined = &mut task => joined,
        () = shutdown_signal() => {
            tracing::info!(action = "shutdown_client", result = "in_progress", client_id = config.id);
            request_shutdown(&shutdown_tx);
            match tokio::time::timeout(config.shutdown_grace, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    // Dropping the session's future closes its connection.
                    task.abort();
                    tracing::warn!(grace = ?config.shutdown_grace, "session did not stop in time, connection closed");
                    return Err(AgencyError::Cancelled);
                }
            }
        }
    };

    let report = outcome
        .map_err(|e| AgencyError::Protocol(format!("session task failed: {e}")))??;
    tracing::info!(
        action = "shutdown_client",
        result = "success",
        client_id = config.id,
        batches = report.batches_sent,
        records = report.records_sent,
        skipped = report.skipped_lines + report.skipped_records,
        winners = report.winners
    );
    Ok(())
}

/// Ask the session to stop at its next step.
///
/// Returns false when the session has already finished and dropped its receiver.
fn request_shutdown(tx: &watch::Sender<bool>) -> bool {
    match tx.send(true) {
        Ok(()) => true,
        Err(_) => {
            tracing::debug!("session already finished, nothing to stop");
            false
        }
    }
}

/// Resolves on SIGINT or SIGTERM (ctrl-c elsewhere).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
