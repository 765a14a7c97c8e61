//! # Product Chat CLI (`pchat`)
//!
//! ## Usage
//!
//! ```bash
//! pchat --config ./config/pchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pchat products` | List discovered products and their index status |
//! | `pchat search "<query>"` | Show the fragments retrieved for a query |
//! | `pchat ask "<message>"` | Reply to a single message |
//! | `pchat chat` | Interactive chat session |
//! | `pchat serve` | Start the HTTP chat server |
//!
//! `ask`, `chat`, and `serve` call the completion service and need the key
//! named by `[generation].api_key_env` (default `OPENROUTER_API_KEY`).

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use product_chat::catalog::{open_catalog, RetrievalCatalog};
use product_chat::config::{self, Config};
use product_chat::generation::OpenRouterClient;
use product_chat::orchestrator::ChatOrchestrator;
use product_chat::{chat, products, search, server};

/// Product Chat: retrieval-grounded answers about your products.
#[derive(Parser)]
#[command(
    name = "pchat",
    about = "Product Chat: retrieval-grounded answers about your products",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "./config/pchat.toml")]
    config: PathBuf,

    /// Log at info level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List products found under `[data].root`.
    Products,

    /// Retrieve the fragments nearest to a query.
    Search {
        /// The search query string.
        query: String,

        /// Product key (defaults to `[retrieval].default_product`).
        #[arg(long)]
        product: Option<String>,

        /// Number of fragments (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Reply to a single user message.
    Ask {
        message: String,

        #[arg(long)]
        product: Option<String>,
    },

    /// Start an interactive chat session.
    ///
    /// Type `/clear` to reset the conversation and `/quit` to exit.
    Chat {
        #[arg(long)]
        product: Option<String>,
    },

    /// Start the HTTP chat server on `[server].bind`.
    Serve,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "product_chat=info,pchat=info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_orchestrator(cfg: &Config, catalog: RetrievalCatalog) -> anyhow::Result<ChatOrchestrator> {
    let client = OpenRouterClient::from_config(&cfg.generation)?;
    Ok(ChatOrchestrator::from_config(
        cfg,
        Arc::new(catalog),
        Arc::new(client),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::load_config_or_default(&cli.config)?;
    let default_product = cfg.retrieval.default_product.clone();

    match cli.command {
        Commands::Products => {
            products::list_products(&cfg.data.root)?;
        }
        Commands::Search { query, product, k } => {
            let catalog = open_catalog(&cfg)?;
            let product = product.unwrap_or(default_product);
            let k = k.unwrap_or(cfg.retrieval.top_k);
            search::run_search(&catalog, &query, &product, k).await?;
        }
        Commands::Ask { message, product } => {
            let orchestrator = build_orchestrator(&cfg, open_catalog(&cfg)?)?;
            let product = product.unwrap_or(default_product);
            chat::run_ask(&orchestrator, &product, &message).await?;
        }
        Commands::Chat { product } => {
            let orchestrator = build_orchestrator(&cfg, open_catalog(&cfg)?)?;
            let product = product.unwrap_or(default_product);
            chat::run_chat(&orchestrator, &product, &cfg.assistant.greeting).await?;
        }
        Commands::Serve => {
            let orchestrator = build_orchestrator(&cfg, open_catalog(&cfg)?)?;
            server::run_server(&cfg, Arc::new(orchestrator)).await?;
        }
    }

    Ok(())
}
