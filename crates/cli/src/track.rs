use std::{pin::pin, sync::Arc, time::Duration};

use alloy::{primitives::Address, providers::Provider};
use anyhow::Context;
use chrono::Utc;
use colored::Colorize;
use futures::StreamExt;
use ocr_relay::{broadcast::LogPoller, store::InMemoryStore, tracker::RoundTracker, types};
use tabled::Table;
use tokio_util::sync::CancellationToken;

/// Blocks of consumption marks kept behind the last processed block.
const CONSUMED_WINDOW: u64 = 256;

pub(crate) async fn render<P: Provider + Clone + 'static>(
    provider: P,
    contract: Address,
    job_id: types::JobId,
    from_block: Option<u64>,
    num_blocks: Option<u64>,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let from_block = match from_block {
        Some(block) => block,
        None => provider.get_block_number().await.context("fetching latest block")?,
    };

    let store = InMemoryStore::new();
    let poller = LogPoller::new(provider, store.clone());
    let tracker = Arc::new(RoundTracker::new(
        contract,
        job_id,
        store.clone(),
        store.round_ledger(job_id),
        poller.clone(),
    ));
    tracker.start().await.context("starting round tracker")?;

    println!(
        "\n{}\n",
        format!("**** Tracking round requests of {} from block {}", contract, from_block)
            .bright_blue()
    );

    let mut blocks = pin!(poller.poll(from_block, tokio::time::sleep));
    let mut blocks_left = num_blocks;
    let mut latest = tracker.latest_record();

    while blocks_left.is_none_or(|count| count > 0) {
        let result = tokio::select! {
            _ = cancellation_token.cancelled() => break,
            result = blocks.next() => result,
        };
        match result {
            Some(Ok(block)) => {
                store.prune_consumed_before(block.saturating_sub(CONSUMED_WINDOW));
                let record = tracker.latest_record();
                if record != latest {
                    latest = record;
                    if let Some(record) = record {
                        println!(
                            "{}",
                            format!(
                                "Block {} - new round requested ({})",
                                block,
                                Utc::now().format("%H:%M:%S")
                            )
                            .bold()
                            .purple()
                        );
                        println!("{}\n", Table::new([record]));
                    }
                }
                if let Some(ref mut count) = blocks_left {
                    *count -= 1;
                }
            },
            Some(Err(err)) => {
                tracing::warn!(%err, "failed to process block, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
            },
            None => break,
        }
    }

    tracker.close()?;
    let round = tracker.latest_round_requested(Duration::ZERO)?;
    if round.is_zero() {
        println!("{}", "No round requested".dimmed());
    } else {
        println!("{}", format!("Latest round requested: {}", round).green());
    }

    Ok(())
}
