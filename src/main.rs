//! # Scoped RAG CLI (`srag`)
//!
//! ## Usage
//!
//! ```bash
//! srag --config ./config/srag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `srag init` | Create the SQLite database and schema |
//! | `srag sync` | Mirror the document library, then re-index changed files |
//! | `srag index [--full] [FILES]` | Re-index specific files or the whole sync root |
//! | `srag ask "<question>" --department <d>` | One-shot question as a department |
//! | `srag chat --department <d>` | Interactive question loop |
//! | `srag serve` | Start the HTTP chat server |
//! | `srag token --department <d> --sub <id>` | Mint a session token |
//! | `srag completions <shell>` | Print shell completions |
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr and
//! command summaries to stdout.

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use scoped_rag::auth::{Claims, SessionKey};
use scoped_rag::config::{self, Config};
use scoped_rag::connector_graph::GraphSource;
use scoped_rag::embedding::{create_provider, EmbeddingProvider};
use scoped_rag::extract::BuiltinConverter;
use scoped_rag::generate::AnswerGenerator;
use scoped_rag::indexer::{IndexReport, Indexer};
use scoped_rag::llm::create_chat_model;
use scoped_rag::models::Department;
use scoped_rag::pipeline::{ChatRequest, Pipeline};
use scoped_rag::retrieve::ScopedRetriever;
use scoped_rag::server::{self, AppState};
use scoped_rag::store::{SqliteStore, VectorStore};
use scoped_rag::sync::{SourceSync, SyncLock};
use scoped_rag::{db, migrate};

/// Department-scoped document assistant.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/srag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "srag",
    about = "Department-scoped retrieval-augmented chat over a synced document library",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/srag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Mirror the remote document library into the sync root.
    ///
    /// Downloads new and modified files, then re-indexes exactly those
    /// files. Holds the run lock for both phases.
    Sync {
        /// Download only; leave the index untouched.
        #[arg(long)]
        skip_index: bool,
    },

    /// Re-index files into the vector index.
    Index {
        /// Walk the whole sync root instead of the given files.
        #[arg(long, conflicts_with = "files")]
        full: bool,

        /// Files to re-index.
        files: Vec<PathBuf>,
    },

    /// Ask one question on behalf of a department.
    Ask {
        question: String,

        #[arg(long)]
        department: String,
    },

    /// Interactive question loop. Type `exit`, `quit` or `bye` to stop.
    Chat {
        #[arg(long)]
        department: String,
    },

    /// Start the HTTP chat server on `[server].bind`.
    Serve,

    /// Mint a session token signed with `SRAG_SESSION_SECRET`.
    Token {
        #[arg(long)]
        department: String,

        /// Subject (user id) claim.
        #[arg(long)]
        sub: String,

        /// Display name claim.
        #[arg(long)]
        name: Option<String>,

        /// Lifetime in seconds (default: `[auth].token_ttl_secs`).
        #[arg(long)]
        ttl: Option<i64>,
    },

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "srag", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync { skip_index } => run_sync(&cfg, skip_index).await?,
        Commands::Index { full, files } => run_index(&cfg, full, files).await?,
        Commands::Ask {
            question,
            department,
        } => {
            let department = parse_department(&department)?;
            let pipeline = build_pipeline(&cfg).await?;
            let answer = pipeline
                .run(ChatRequest {
                    question,
                    department: Some(department),
                })
                .await?;
            println!("{}", answer.answer);
        }
        Commands::Chat { department } => {
            let department = parse_department(&department)?;
            let pipeline = build_pipeline(&cfg).await?;
            run_chat(&pipeline, department).await?;
        }
        Commands::Serve => {
            let state = AppState {
                pipeline: Arc::new(build_pipeline(&cfg).await?),
                session_key: Arc::new(SessionKey::from_env()?),
            };
            server::run_server(&cfg.server.bind, state).await?;
        }
        Commands::Token {
            department,
            sub,
            name,
            ttl,
        } => {
            let department = parse_department(&department)?;
            let ttl = ttl.unwrap_or(cfg.auth.token_ttl_secs);
            if ttl <= 0 {
                bail!("--ttl must be > 0");
            }
            let claims = Claims {
                sub,
                name,
                department: Some(department.to_string()),
                exp: chrono::Utc::now().timestamp() + ttl,
            };
            println!("{}", SessionKey::from_env()?.sign(&claims)?);
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn parse_department(raw: &str) -> Result<Department> {
    Department::new(raw).context("--department must not be blank")
}

async fn open_store(cfg: &Config) -> Result<Arc<dyn VectorStore>> {
    let pool = db::connect(cfg).await?;
    migrate::create_schema(&pool).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

fn embedder(cfg: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    if !cfg.embedding.is_enabled() {
        bail!("embeddings are disabled; set [embedding].provider in the config");
    }
    create_provider(&cfg.embedding)
}

async fn build_indexer(cfg: &Config) -> Result<Indexer> {
    Ok(Indexer::new(
        open_store(cfg).await?,
        embedder(cfg)?,
        Arc::new(BuiltinConverter),
        cfg.sync.root.clone(),
        cfg.indexing.clone(),
    ))
}

async fn build_pipeline(cfg: &Config) -> Result<Pipeline> {
    let retriever = ScopedRetriever::new(open_store(cfg).await?, embedder(cfg)?, &cfg.retrieval);
    let generator = AnswerGenerator::new(create_chat_model(&cfg.llm)?);
    Ok(Pipeline::new(retriever, generator))
}

async fn run_sync(cfg: &Config, skip_index: bool) -> Result<()> {
    let graph = cfg
        .sync
        .graph
        .as_ref()
        .context("[sync.graph] is not configured")?;
    // Build everything fallible before taking the lock.
    let mut source = GraphSource::from_env(graph)?;
    let indexer = if skip_index {
        None
    } else {
        Some(build_indexer(cfg).await?)
    };

    let lock = SyncLock::acquire(&cfg.sync.state_file)?;
    let report = SourceSync::new(&cfg.sync.root, &cfg.sync.state_file)
        .run(&lock, &mut source)
        .await?;

    println!("sync {}", graph.library);
    println!("  changed: {}", report.changed.len());
    println!("  unchanged: {}", report.skipped);
    println!("  failed: {}", report.failed);

    if let Some(indexer) = indexer {
        let index_report = indexer.run(&report.changed).await;
        print_index_report(&index_report);
    }
    println!("ok");
    Ok(())
}

async fn run_index(cfg: &Config, full: bool, files: Vec<PathBuf>) -> Result<()> {
    if !full && files.is_empty() {
        bail!("pass files to index or --full");
    }
    let indexer = build_indexer(cfg).await?;
    let _lock = SyncLock::acquire(&cfg.sync.state_file)?;

    let report = if full {
        indexer.run_full().await?
    } else {
        indexer.run(&files).await
    };

    print_index_report(&report);
    println!("ok");
    Ok(())
}

fn print_index_report(report: &IndexReport) {
    println!("index");
    println!("  files indexed: {}", report.files_indexed);
    println!("  files failed: {}", report.files_failed);
    println!("  chunks written: {}", report.chunks_written);
}

async fn run_chat(pipeline: &Pipeline, department: Department) -> Result<()> {
    println!("Assistant ready for {}. Type 'exit' to stop.", department);

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let line = line?;
        let input = line.trim();
        if matches!(input.to_lowercase().as_str(), "exit" | "quit" | "bye") {
            println!("Assistant: Goodbye!");
            break;
        }
        if input.is_empty() {
            continue;
        }

        match pipeline
            .run(ChatRequest {
                question: input.to_string(),
                department: Some(department.clone()),
            })
            .await
        {
            Ok(answer) => println!("Assistant: {}", answer.answer),
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(())
}
