use clap::{Parser, Subcommand};
use partsbot::Result;
use partsbot::commands::{build_database, delete_collection, serve_chat, show_status};
use partsbot::config::show_config;

#[derive(Parser)]
#[command(name = "partsbot")]
#[command(about = "Retrieval-augmented chat service for an appliance parts storefront")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective configuration
    Config,
    /// Crawl a category page and populate the vector collection
    Build {
        /// Category page URL to start from, e.g. https://example.com/Refrigerator-Parts.htm
        url: String,
        /// Maximum link depth to follow from the category page
        #[arg(long, default_value_t = 0)]
        depth: usize,
    },
    /// Start the HTTP query service
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 8000)]
        port: u16,
        /// Retrieve fresh context for every query instead of keeping one conversation
        #[arg(long)]
        stateless: bool,
    },
    /// Show status of the configuration, model endpoint, and collection
    Status,
    /// Delete the vector collection (irreversible)
    Delete {
        /// Actually delete instead of reporting what would be deleted
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config => {
            show_config()?;
        }
        Commands::Build { url, depth } => {
            build_database(&url, depth).await?;
        }
        Commands::Serve { port, stateless } => {
            serve_chat(port, stateless).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
        Commands::Delete { force } => {
            delete_collection(force).await?;
        }
    }

    Ok(())
}
