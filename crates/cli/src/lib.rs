pub mod args;
mod track;
mod tx;

use std::time::Duration;

use alloy::{
    providers::ProviderBuilder,
    rpc::client::RpcClient,
    transports::layers::{RetryBackoffLayer, ThrottleLayer},
};
use anyhow::Context;
use args::Cli;
use tokio_util::sync::CancellationToken;

use crate::args::Commands;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = if let Some(throttle) = cli.rpc_throttle {
        RpcClient::builder()
            .layer(ThrottleLayer::new(throttle))
            .layer(RetryBackoffLayer::new(10, 100, 200))
            .connect(&cli.rpc)
            .await
            .context("connecting to RPC")?
    } else {
        RpcClient::builder()
            .layer(RetryBackoffLayer::new(10, 100, 200))
            .connect(&cli.rpc)
            .await
            .context("connecting to RPC")?
    };
    client.set_poll_interval(Duration::from_millis(500));
    let provider = ProviderBuilder::new().connect_client(client);

    let cancellation_signal = CancellationToken::new();
    let cancellation_token = cancellation_signal.child_token();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to install CTRL+C signal handler");
            return;
        }
        cancellation_signal.cancel();
    });

    match &cli.command {
        Commands::Track => {
            let contract = cli
                .contract
                .ok_or_else(|| anyhow::anyhow!("contract address should be provided, see `--contract`"))?;
            track::render(
                provider,
                contract,
                cli.job_id,
                cli.block,
                cli.num_blocks,
                cancellation_token,
            )
            .await?
        },
        Commands::Tx { hash } => tx::render(provider, *hash, cli.contract).await?,
    }

    Ok(())
}
