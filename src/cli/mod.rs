//! CLI commands implementation.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::llm::{LlmClient, LlmConfig};
use crate::models::{ChunkType, Document, FileRef};
use crate::pipeline::{BatchInput, Dispatcher};

#[derive(Parser)]
#[command(name = "docmill")]
#[command(about = "Batch document metadata and chunk extraction service")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Run the extraction API server
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0", env = "DOCMILL_HOST")]
        host: String,
        /// Bind port
        #[arg(short, long, default_value = "8012", env = "DOCMILL_PORT")]
        port: u16,
    },

    /// Process local files and write one JSON record per input
    Process {
        /// Files to process
        files: Vec<PathBuf>,
        /// Default document language
        #[arg(long, default_value = "en")]
        lang: String,
        /// Text model identifier
        #[arg(long, default_value = "llama-3.2-3b-preview", env = "DOCMILL_TEXT_MODEL")]
        text_model: String,
        /// Vision model identifier
        #[arg(long, default_value = "pixtral-12b", env = "DOCMILL_VISION_MODEL")]
        vision_model: String,
    },

    /// Report availability of the external tools docmill shells out to
    CheckTools,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::Serve { host, port } => crate::server::serve(settings, &host, port).await,
        Commands::Process {
            files,
            lang,
            text_model,
            vision_model,
        } => process_files(settings, files, &lang, &text_model, &vision_model).await,
        Commands::CheckTools => {
            for (tool, available) in crate::utils::check_tools() {
                let mark = if available { "found" } else { "MISSING" };
                println!("{tool:<12} {mark}");
            }
            Ok(())
        }
    }
}

async fn process_files(
    settings: Settings,
    files: Vec<PathBuf>,
    lang: &str,
    text_model: &str,
    vision_model: &str,
) -> anyhow::Result<()> {
    if files.is_empty() {
        anyhow::bail!("no input files given");
    }

    let model = |name: &str| -> anyhow::Result<Arc<LlmClient>> {
        let config = LlmConfig::new(settings.llm_base_url.clone(), name)
            .with_api_key(settings.llm_api_key.clone());
        Ok(Arc::new(LlmClient::new(config)?))
    };
    let dispatcher = Dispatcher::new(&settings, model(text_model)?, model(vision_model)?)?;

    // Ctrl-C cancels the batch: running workers finish, everything not
    // yet submitted comes back as a cancelled error.
    let cancel = dispatcher.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("cancelling batch, letting in-flight work finish");
            cancel.cancel();
        }
    });

    let inputs: Vec<BatchInput> = files
        .iter()
        .map(|path| {
            BatchInput::new(path.display().to_string(), FileRef::Path(path.clone()))
        })
        .collect();

    let (extracted, errors) = dispatcher.extract_batch(inputs, lang).await?;

    for (doc, path) in extracted.into_iter().zip(&files) {
        let out = path.with_extension("json");
        std::fs::write(&out, serde_json::to_vec_pretty(&strip_images(doc))?)?;
        println!("{} -> {}", path.display(), out.display());
    }
    for error in &errors {
        eprintln!("FAILED {}: {}", error.file, error.exc);
    }
    if !errors.is_empty() {
        anyhow::bail!("{} of {} inputs failed", errors.len(), files.len());
    }
    Ok(())
}

/// Drop image payloads before writing records to disk.
fn strip_images(mut doc: Document) -> Document {
    doc.metainfo.thumbnail = None;
    for chunk in &mut doc.chunks {
        if matches!(chunk.chunk_type, ChunkType::Figure | ChunkType::VisualPage) {
            chunk.non_embeddable_content = None;
        }
    }
    doc
}
