//! # Issue Mirror CLI (`issue-mirror`)
//!
//! ## Usage
//!
//! ```bash
//! issue-mirror --config ./config/issue-mirror.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `issue-mirror pull <owner/name>` | Incrementally sync issues into the local index and store |
//! | `issue-mirror search <owner/name> "<query>"` | Semantic search over synced issues |
//! | `issue-mirror discussions <owner/name>` | List the repository's oldest discussions |
//!
//! The config file is optional: without one, every setting takes its
//! default and `GITHUB_TOKEN` supplies the token.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use issue_mirror::config;
use issue_mirror::models::RepoName;
use issue_mirror::search::{self, SearchFilter};
use issue_mirror::{github, sync};

/// Issue Mirror: incremental GitHub issue index and semantic search.
#[derive(Parser)]
#[command(name = "issue-mirror", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/issue-mirror.toml`. A missing file means
    /// all defaults.
    #[arg(long, global = true, default_value = "./config/issue-mirror.toml")]
    config: PathBuf,

    /// More log output on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// No log output.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync a repository's issues.
    ///
    /// The first pull fetches full history. Later pulls fetch only issues
    /// updated since the previous pull started.
    Pull {
        /// Repository as `owner/name`.
        repo: RepoName,
    },

    /// Search synced issues by meaning.
    ///
    /// Requires an embedding provider to be configured.
    Search {
        /// Repository as `owner/name`.
        repo: RepoName,

        /// The search query string.
        query: String,

        /// Only issues carrying this label.
        #[arg(long)]
        label: Option<String>,

        /// Only issues of this type.
        #[arg(long = "type")]
        issue_type: Option<String>,

        /// Maximum number of issues to return.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// List a repository's discussions, oldest first.
    Discussions {
        /// Repository as `owner/name`.
        repo: RepoName,

        /// How many discussions to list.
        #[arg(long, default_value_t = 10)]
        first: u32,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,hyper=info,reqwest=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let cfg = config::load_or_minimal(&cli.config)?;

    match cli.command {
        Commands::Pull { repo } => {
            sync::run_pull(&cfg, &repo).await?;
        }
        Commands::Search {
            repo,
            query,
            label,
            issue_type,
            limit,
        } => {
            let filter = SearchFilter { label, issue_type };
            search::run_search(&cfg, &repo, &query, filter, limit).await?;
        }
        Commands::Discussions { repo, first } => {
            github::run_discussions(&cfg, &repo, first).await?;
        }
    }

    Ok(())
}
