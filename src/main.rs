//! # Trove CLI
//!
//! Commands for database initialization, harvesting, re-running derivers,
//! searching, and answering OAI-PMH requests.
//!
//! ## Usage
//!
//! ```bash
//! trove --config ./trove.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `trove init` | Create the SQLite database and run schema migrations |
//! | `trove harvest <label> <file>` | Ingest a JSON Lines file as one source |
//! | `trove derive` | Re-run every deriver against every stored card |
//! | `trove search "<query>"` | Search stored cards |
//! | `trove oai --param verb=ListRecords ...` | Answer one OAI-PMH request |

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use trove::config;
use trove::db::{self, SqliteStore};
use trove::harvest::{HarvestWindow, WindowBound};
use trove::index_strategy::InMemoryIndexStrategy;
use trove::ingest;
use trove::migrate;
use trove::oai::OaiRepository;
use trove::search::CardsearchParams;
use trove::source_jsonl::{GenericTransformer, JsonlHarvester};
use trove::store::DescriptionStore;

/// Trove CLI — harvest, normalize, derive, and serve scholarly metadata.
#[derive(Parser)]
#[command(
    name = "trove",
    about = "Trove — a metadata aggregation core",
    version,
    long_about = "Trove harvests raw metadata records, normalizes them into RDF resource \
    descriptions, and serves them back out as derived documents, search results, and \
    OAI-PMH responses."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./trove.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Ingest a JSON Lines file as one source.
    ///
    /// Each line holds one record: `{"identifier": ..., "datestamp": ...,
    /// "doc": {...}}`. Records are transformed into resource descriptions,
    /// stored, and run through every deriver.
    Harvest {
        /// Source label recorded on every card from this file.
        source_label: String,

        /// Path to the JSON Lines file.
        file: PathBuf,

        /// Start of the harvest window (RFC 3339). Defaults to 14 days ago.
        #[arg(long)]
        since: Option<String>,

        /// End of the harvest window (RFC 3339). Defaults to now.
        #[arg(long)]
        until: Option<String>,
    },

    /// Re-run every deriver against every stored card.
    Derive,

    /// Search stored cards.
    ///
    /// Builds the search index from the store, then runs a cardsearch.
    /// Extra API query parameters (filters, sort, paging) can be passed
    /// with repeated `--param` flags.
    Search {
        /// Free-text query.
        query: Option<String>,

        /// Extra query parameters as `name=value` pairs, e.g.
        /// `--param "cardSearchFilter[resourceType]=Preprint"`.
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },

    /// Answer one OAI-PMH request and print the XML response.
    Oai {
        /// Protocol query parameters as `name=value` pairs, e.g.
        /// `--param verb=ListRecords --param metadataPrefix=oai_dc`.
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },
}

/// Parse a `name=value` pair for `--param` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid NAME=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn parse_bound(value: Option<&str>, fallback: WindowBound) -> anyhow::Result<WindowBound> {
    match value {
        None => Ok(fallback),
        Some(raw) => {
            let instant = chrono::DateTime::parse_from_rfc3339(raw)
                .map_err(|err| anyhow::anyhow!("invalid window bound '{raw}': {err}"))?;
            Ok(WindowBound::Absolute(instant.with_timezone(&chrono::Utc)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Harvest {
            source_label,
            file,
            since,
            until,
        } => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            let store = SqliteStore::new(pool);
            let index = InMemoryIndexStrategy::new();
            let window = HarvestWindow::resolve(
                parse_bound(since.as_deref(), WindowBound::DaysAgo(14))?,
                parse_bound(until.as_deref(), WindowBound::DaysAgo(0))?,
                chrono::Utc::now(),
            )?;
            let harvester = JsonlHarvester::new(source_label.as_str(), file);
            let transformer = GenericTransformer::new();
            let stats =
                ingest::run_ingest(&store, &index, &harvester, &transformer, window).await?;
            println!("harvest {}", source_label);
            println!("  fetched: {}", stats.fetched);
            println!("  stored: {}", stats.stored);
            println!("  skipped: {}", stats.skipped);
            println!("  failed: {}", stats.failed);
            println!("  derived: {}", stats.derived);
            println!("ok");
            store.pool().close().await;
        }
        Commands::Derive => {
            let pool = db::connect(&cfg.db.path).await?;
            let store = SqliteStore::new(pool);
            let (derived, deleted) = ingest::derive_all(&store).await?;
            println!("derive");
            println!("  derived: {}", derived);
            println!("  deleted: {}", deleted);
            println!("ok");
            store.pool().close().await;
        }
        Commands::Search { query, params } => {
            let pool = db::connect(&cfg.db.path).await?;
            let store = SqliteStore::new(pool);
            let index = InMemoryIndexStrategy::new();
            ingest::reindex_all(&store, &index).await?;

            let mut pairs = params;
            if let Some(text) = query {
                pairs.push(("cardSearchText".to_string(), text));
            }
            let search_params = CardsearchParams::from_query_pairs(&pairs)
                .map_err(|err| anyhow::anyhow!("{err}"))?;
            let response = index
                .cardsearch(&search_params, &[])
                .await
                .map_err(|err| anyhow::anyhow!("{err}"))?;
            println!("total: {}", response.total_count);
            for card_id in &response.card_ids {
                if let Some(card) = store.get_card(*card_id).await? {
                    println!("  {}  {}:{}", card.id, card.source_label, card.source_identifier);
                }
            }
            if let Some(cursor) = response.next_cursor {
                println!("next: --param \"page[cursor]={}\"", cursor);
            }
            store.pool().close().await;
        }
        Commands::Oai { params } => {
            let pool = db::connect(&cfg.db.path).await?;
            let store = SqliteStore::new(pool);
            let repository = OaiRepository {
                repository_name: cfg.oai.repository_name.clone(),
                repository_identifier: cfg.oai.repository_identifier.clone(),
                admin_email: cfg.oai.admin_email.clone(),
                base_url: cfg.oai.base_url.clone(),
                page_size: cfg.oai.page_size,
            };
            let xml = repository.handle_request(&store, &params).await?;
            println!("{xml}");
            store.pool().close().await;
        }
    }

    Ok(())
}
