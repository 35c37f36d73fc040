use alloy::{
    primitives::{Address, TxHash},
    providers::Provider,
};
use alloy_sol_types::SolEvent;
use anyhow::Context;
use colored::Colorize;
use ocr_relay::{abi::OCR2Aggregator, types};

pub(crate) async fn render<P: Provider + Clone>(
    provider: P,
    tx_hash: TxHash,
    contract: Option<Address>,
) -> anyhow::Result<()> {
    let receipt = provider
        .get_transaction_receipt(tx_hash)
        .await
        .context("fetching transaction receipt")?
        .ok_or_else(|| anyhow::anyhow!("transaction not found"))?;

    println!("\n{}\n", format!("**** Tx {}", tx_hash).bright_blue());

    let mut found = 0;
    for log in receipt.inner.logs() {
        if contract.is_some_and(|contract| contract != log.address())
            || log.topics().first() != Some(&OCR2Aggregator::RoundRequested::SIGNATURE_HASH)
        {
            continue;
        }
        match types::RoundRequested::from_log(log) {
            Ok(record) => {
                println!("{}", format!("  {}: {}", log.address(), record).cyan());
                found += 1;
            },
            Err(err) => {
                println!("{}", format!("  {}: malformed RoundRequested: {}", log.address(), err).red())
            },
        }
    }

    if found == 0 {
        println!("{}", "  no round requests".dimmed());
    }
    println!();

    Ok(())
}
