use clap::{Parser, Subcommand};
use docs_qa::Result;
use docs_qa::commands::{
    ask, delete_namespace, ingest_files, list_namespaces, reconcile, show_status,
};
use docs_qa::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docs-qa")]
#[command(about = "Ask questions about your documents, answered only from their contents")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, the registry and the vector index
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest PDF, DOCX, TXT or Markdown files into a new namespace
    Ingest {
        /// Files to ingest, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Owner of the new namespace
        #[arg(long)]
        owner: String,
    },
    /// Ask a question about an ingested namespace
    Ask {
        namespace: String,
        question: String,
        #[arg(long)]
        owner: String,
        /// Number of passages to retrieve (at most 10)
        #[arg(short, long)]
        k: Option<usize>,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// List namespaces for an owner
    List {
        #[arg(long)]
        owner: String,
        /// Print namespaces as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a namespace and its vectors
    Delete {
        namespace: String,
        #[arg(long)]
        owner: String,
    },
    /// Show model backend status
    Status,
    /// Remove vectors of namespaces missing from the registry
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let base_dir = match cli.data_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&base_dir)?;
        } else {
            run_interactive_config(&base_dir)?;
        }
        return Ok(());
    }

    let config = Config::load(&base_dir)?;
    match cli.command {
        Commands::Config { .. } => {}
        Commands::Ingest { files, owner } => {
            ingest_files(&config, files, &owner).await?;
        }
        Commands::Ask {
            namespace,
            question,
            owner,
            k,
            json,
        } => {
            ask(&config, &namespace, &question, &owner, k, json).await?;
        }
        Commands::List { owner, json } => {
            list_namespaces(&config, &owner, json).await?;
        }
        Commands::Delete { namespace, owner } => {
            delete_namespace(&config, &namespace, &owner).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Reconcile => {
            reconcile(&config).await?;
        }
    }

    Ok(())
}
