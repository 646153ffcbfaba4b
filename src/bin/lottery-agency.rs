//! Agency client entry point.
//!
//! Environment:
//! - `AGENCY_ID` (required)
//! - `SERVER_ADDRESS` (default `127.0.0.1:12345`)
//! - `DATASET_PATH` (default `./agency-<id>.csv`)
//! - `MAX_BATCH_BYTES` (default 8 KiB)
//! - `LOGGING_LEVEL` (default `info`)

use anyhow::Context;
use lottery_intake::dataset::load_bets;
use lottery_intake::logging::init_logging;
use lottery_intake::protocol::DEFAULT_CLIENT_BATCH_BYTES;
use lottery_intake::{AgencyClient, ShutdownTrigger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let level = std::env::var("LOGGING_LEVEL").unwrap_or_else(|_| "info".to_string());
    init_logging(&level, false)?;

    let agency: u8 = std::env::var("AGENCY_ID")
        .context("AGENCY_ID is not set")?
        .trim()
        .parse()
        .context("AGENCY_ID must be a number between 1 and 255")?;
    let address =
        std::env::var("SERVER_ADDRESS").unwrap_or_else(|_| "127.0.0.1:12345".to_string());
    let dataset =
        std::env::var("DATASET_PATH").unwrap_or_else(|_| format!("./agency-{}.csv", agency));
    let max_batch_bytes = match std::env::var("MAX_BATCH_BYTES") {
        Ok(raw) => raw.trim().parse().context("invalid MAX_BATCH_BYTES")?,
        Err(_) => DEFAULT_CLIENT_BATCH_BYTES,
    };

    let bets = load_bets(&dataset, agency).await?;

    let trigger = ShutdownTrigger::new();
    let session = async {
        let mut client = AgencyClient::connect(address.as_str(), agency, trigger.subscribe())
            .await
            .with_context(|| format!("connecting to {}", address))?;

        client.submit_agency_id().await?;
        let summary = client.submit_all(&bets, max_batch_bytes).await?;
        tracing::info!(
            action = "submit_all",
            agency,
            batches = summary.batches,
            accepted = summary.accepted,
            rejected = summary.rejected
        );

        let winners = client.wait_results().await?;
        tracing::info!(
            action = "results_received",
            result = "success",
            agency,
            winners = winners.len()
        );
        client.close().await;
        anyhow::Ok(())
    };

    tokio::select! {
        result = session => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(agency, "interrupted");
            Ok(())
        }
    }
}
