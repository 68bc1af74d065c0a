//! Build a reward distribution from a leaf file
//!
//! Usage: `merkle-gen <leaves.json> <distribution.json>`
//!
//! The leaf file is a JSON array of `{ "index", "account", "amount" }`.

use anyhow::Context;
use reward_distributor::{MerkleDistribution, MerkleLeaf};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (input, output) = match (args.next(), args.next()) {
        (Some(input), Some(output)) => (input, output),
        _ => anyhow::bail!("usage: merkle-gen <leaves.json> <distribution.json>"),
    };

    let content =
        std::fs::read_to_string(&input).with_context(|| format!("failed to read {}", input))?;
    let leaves: Vec<MerkleLeaf> =
        serde_json::from_str(&content).with_context(|| format!("failed to parse {}", input))?;

    let distribution =
        MerkleDistribution::build(&leaves).context("failed to build distribution")?;
    distribution
        .save(&output)
        .with_context(|| format!("failed to write {}", output))?;

    tracing::info!(
        root = %distribution.root,
        leaves = leaves.len(),
        total_amount = distribution.total_amount,
        output = %output,
        "Distribution written"
    );
    println!("{}", distribution.root);
    Ok(())
}
