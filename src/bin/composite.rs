//! On-demand composite query
//!
//! Runs a single aggregation round against the REST adapters (no stream,
//! no window) and prints the `CompositeResult` as JSON on stdout.
//!
//! Usage: `cargo run --bin composite [config.yaml]`

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use sentiment_engine::adapters::{build_adapter, SourceAdapter};
use sentiment_engine::config::{self, AppConfig};
use sentiment_engine::core::{init_logging, scorer_from_env, Aggregator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => config::load_config(Path::new(&path))?,
        None => {
            let config = AppConfig::default();
            config.validate()?;
            config
        }
    };

    let scorer = scorer_from_env();
    let sources: Vec<Arc<dyn SourceAdapter>> = config
        .sources
        .weights
        .keys()
        .map(|&source| build_adapter(source, &config.providers, scorer.clone()))
        .collect();

    let mut aggregator = Aggregator::new(sources, config.sources.source_weights()?)
        .with_reliability(config.sources.reliability.clone())
        .with_timeout(config.sources.adapter_timeout())
        .with_divergence_threshold(config.thresholds.divergence)
        .with_params(config.sources.fetch_params());
    for (&slot, &stand_in) in &config.sources.substitutes {
        aggregator = aggregator.with_substitute(
            slot,
            build_adapter(stand_in, &config.providers, scorer.clone()),
        );
    }

    info!("Running one aggregation round");
    let result = aggregator.compute_composite_default().await;
    aggregator.close().await;

    let result = result?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
