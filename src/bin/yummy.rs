//! yummy CLI tool
//!
//! Offline access to annotation records kept by a [`FileStore`].
//!
//! ## Commands
//!
//! - `replay <page>`: apply a conversation's stored annotations to a saved page and print it
//! - `show`: print a conversation's stored record
//! - `collect <page>`: replay, then print the marked texts as JSON

use clap::{Parser, Subcommand};
use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
    sync::Arc,
};
use yummy_core::{
    collect::CollectScope,
    config::EngineConfig,
    dom::Document,
    engine::AnnotationEngine,
    persistence::ConversationScope,
    store::{AnnotationStore, FileStore},
    YummyError,
};

#[derive(Parser)]
#[command(name = "yummy")]
#[command(author, version, about = "Replay and inspect chat transcript annotations", long_about = None)]
struct Cli {
    /// Directory holding one record file per conversation
    #[arg(short, long, default_value = ".yummy")]
    store: PathBuf,

    /// Engine configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply stored annotations to a saved page and print the annotated markup
    Replay {
        /// Saved page markup
        page: PathBuf,

        /// Conversation URL or bare conversation key
        #[arg(short, long)]
        location: String,
    },

    /// Print the stored record of a conversation
    Show {
        /// Conversation URL or bare conversation key
        location: String,
    },

    /// Replay annotations, then print the marked texts as JSON
    Collect {
        /// Saved page markup
        page: PathBuf,

        /// Conversation URL or bare conversation key
        #[arg(short, long)]
        location: String,

        /// Which part of the page to collect from
        #[arg(long, value_enum, default_value_t = CollectScope::LatestReply)]
        scope: CollectScope,
    },
}

fn scope_of(location: &str) -> Result<ConversationScope, YummyError> {
    if location.contains("://") {
        ConversationScope::from_location(location)
    } else {
        Ok(ConversationScope::new(location))
    }
}

async fn replay(
    page: &Path,
    location: &str,
    store: FileStore,
    config: EngineConfig,
) -> Result<Arc<AnnotationEngine<FileStore>>, YummyError> {
    let markup = read_to_string(page)?;
    let document = Document::parse(&markup)?.into_shared();
    let engine = Arc::new(AnnotationEngine::new(document, store, config));
    let report = engine.switch_scope(scope_of(location)?).await;
    tracing::info!("[Replay] {report}");
    Ok(engine)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let store = FileStore::new(&cli.store);

    match cli.command {
        Commands::Replay { page, location } => {
            let engine = replay(&page, &location, store, config).await?;
            let doc = engine.document().lock();
            println!("{}", doc.inner_html(doc.root()));
        }
        Commands::Show { location } => {
            let scope = scope_of(&location)?;
            match store.get(&scope).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => {
                    eprintln!("No record for conversation '{scope}'");
                    std::process::exit(1);
                }
            }
        }
        Commands::Collect {
            page,
            location,
            scope,
        } => {
            let engine = replay(&page, &location, store, config).await?;
            let collection = engine.collect(scope);
            println!("{}", serde_json::to_string_pretty(&collection)?);
        }
    }
    Ok(())
}
