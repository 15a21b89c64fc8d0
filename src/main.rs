//! docmill - batch document metadata and chunk extraction.
//!
//! Ingests a mixed batch of office documents and produces, for each
//! input, normalized metadata and an ordered sequence of content
//! chunks ready for embedding, plus one error record per failed input.

mod chunking;
mod cli;
mod config;
mod converters;
mod extractors;
mod llm;
mod models;
mod pdf;
mod pipeline;
mod postprocess;
mod server;
mod thumbnails;
mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "docmill=info"
    } else {
        "docmill=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Run CLI
    cli::run().await
}
