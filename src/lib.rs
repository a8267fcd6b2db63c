pub mod config;
pub mod indexer;
pub mod model;
pub mod search;
pub mod storage;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::SearchConfig;
use crate::indexer::Synchronizer;
use crate::model::types::MatchMode;
use crate::search::{SearchEngine, SearchError, SearchRequest};
use crate::storage::sqlite::{NewFileRecord, RecordStore};

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "file-record-search",
    version,
    about = "Indexed full-text search over per-user file records"
)]
pub struct Cli {
    /// Path to the records SQLite database (defaults to platform data dir)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Override data dir (records db + search index)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Optional TOML config for ranking weights and limits
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a file record and index it
    Add {
        #[arg(long)]
        owner: i64,

        #[arg(long)]
        name: String,

        #[arg(long)]
        path: String,

        #[arg(long)]
        workspace: Option<i64>,

        #[arg(long)]
        description: Option<String>,

        /// Description from the categorization service
        #[arg(long)]
        ai_description: Option<String>,

        /// Comma-joined tags
        #[arg(long)]
        tags: Option<String>,

        /// Comma-joined tags from the categorization service
        #[arg(long)]
        ai_tags: Option<String>,

        #[arg(long, default_value_t = false)]
        favorite: bool,

        #[arg(long, default_value_t = false)]
        archived: bool,

        /// Ranking prior in [0, 100]
        #[arg(long, default_value_t = 0.0)]
        importance: f64,
    },
    /// Delete a file record and drop it from the index
    Remove {
        #[arg(long)]
        id: i64,
    },
    /// Populate the index from the records database
    Index {
        /// Clear and regenerate the whole index instead of reconciling
        #[arg(long)]
        full: bool,
    },
    /// Run a search query
    Search {
        query: String,

        #[arg(long)]
        owner: i64,

        #[arg(long, value_enum, default_value_t = MatchMode::Fuzzy)]
        mode: MatchMode,

        #[arg(long)]
        workspace: Option<i64>,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, default_value_t = false)]
        include_archived: bool,

        /// Emit the full response as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Suggest query completions from the indexed vocabulary
    Suggest {
        partial: String,

        #[arg(long)]
        owner: i64,

        #[arg(long)]
        limit: Option<usize>,
    },
    /// Report index coverage statistics for one owner
    Stats {
        #[arg(long)]
        owner: i64,
    },
    /// Compact the physical index
    Optimize,
    /// Regenerate the whole index from the records database
    Rebuild,
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "frs", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let db_path = cli.db.clone().unwrap_or_else(|| data_dir.join("file_records.db"));
    let config = SearchConfig::load(cli.config.as_deref())?;

    let store = Arc::new(RecordStore::open(&db_path)?);
    let index_dir = search::tantivy::index_dir(&data_dir)?;
    let engine = Arc::new(SearchEngine::open(store.clone(), &index_dir, config));
    let sync = Synchronizer::new(engine.clone());

    match cli.command {
        Commands::Add {
            owner,
            name,
            path,
            workspace,
            description,
            ai_description,
            tags,
            ai_tags,
            favorite,
            archived,
            importance,
        } => {
            let record = store.insert(NewFileRecord {
                owner_id: owner,
                workspace_id: workspace,
                name,
                path,
                description,
                ai_description,
                tags,
                ai_tags,
                is_favorite: favorite,
                is_archived: archived,
                importance_score: importance,
            })?;
            sync.on_created(&record)
                .with_context(|| format!("index record {}", record.id))?;
            println!("added record {}", record.id);
        }
        Commands::Remove { id } => {
            let existed = store.delete(id)?;
            sync.on_deleted(id)?;
            if existed {
                println!("removed record {id}");
            } else {
                println!("record {id} not found");
            }
        }
        Commands::Index { full } => {
            if full {
                if engine.rebuild() {
                    println!("index rebuilt");
                } else {
                    anyhow::bail!("index rebuild failed");
                }
            } else {
                let summary = sync.populate_all()?;
                println!("indexed {} records ({} failed)", summary.indexed, summary.failed);
            }
        }
        Commands::Search {
            query,
            owner,
            mode,
            workspace,
            limit,
            offset,
            include_archived,
            json,
        } => {
            let req = SearchRequest {
                query,
                owner_id: owner,
                workspace_id: workspace,
                mode,
                limit,
                offset,
                include_archived,
            };
            let response = match engine.search(&req) {
                Ok(response) => response,
                Err(e @ SearchError::IndexUnavailable(_)) => {
                    anyhow::bail!("search unavailable: {e}");
                }
                Err(e) => anyhow::bail!("invalid search request: {e}"),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!(
                    "{} matches in {} ms (engine: {})",
                    response.total_matches,
                    response.total_duration_ms,
                    match response.engine_used {
                        model::types::EngineUsed::Index => "index",
                        model::types::EngineUsed::Fallback => "fallback",
                    }
                );
                for (i, hit) in response.results.iter().enumerate() {
                    println!(
                        "{:>3}. {} ({}) rank={:.3}",
                        req.offset + i + 1,
                        hit.name,
                        hit.path,
                        hit.rank
                    );
                    if !hit.snippet.is_empty() {
                        println!("     {}", hit.snippet);
                    }
                }
            }
        }
        Commands::Suggest { partial, owner, limit } => {
            engine.warm_vocabulary()?;
            for term in engine.suggest(&partial, owner, limit) {
                println!("{term}");
            }
        }
        Commands::Stats { owner } => {
            engine.warm_vocabulary()?;
            let stats = engine.statistics(owner);
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Optimize => {
            if engine.optimize() {
                println!("index optimized");
            } else {
                anyhow::bail!("optimize failed");
            }
        }
        Commands::Rebuild => {
            if engine.rebuild() {
                println!("index rebuilt");
            } else {
                anyhow::bail!("rebuild failed");
            }
        }
        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

pub fn default_db_path() -> PathBuf {
    default_data_dir().join("file_records.db")
}

pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "file-record-search", "file-record-search")
        .expect("project dirs available")
        .data_dir()
        .to_path_buf()
}
