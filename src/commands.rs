use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use crate::builder::DatabaseBuilder;
use crate::config::{Config, get_config_dir};
use crate::crawler::CrawlerConfig;
use crate::llm::openai::OpenAiClient;
use crate::llm::{ChatModel, EmbeddingModel};
use crate::server::chat::{ChatEngine, ChatMode};
use crate::store::{ContextSource, EmbeddingStore};

fn load_config() -> Result<Config> {
    let config_dir = get_config_dir()?;
    Config::load(config_dir)
}

/// Crawl a category page and populate the vector collection
#[inline]
pub async fn build_database(base_url: &str, max_depth: usize) -> Result<()> {
    info!("Building product database from {}", base_url);

    let config = load_config().context("Failed to load configuration")?;
    let client = Arc::new(OpenAiClient::new(&config).context("Failed to create model client")?);

    let store = EmbeddingStore::open(&config, Arc::clone(&client) as Arc<dyn EmbeddingModel>)
        .await
        .context("Failed to open the embedding store")?;

    let mut builder = DatabaseBuilder::new(
        CrawlerConfig::default(),
        Arc::clone(&client) as Arc<dyn ChatModel>,
        store,
    );

    let stats = builder.build(base_url, max_depth).await?;

    println!("Database build completed!");
    println!("  Pages visited: {}", stats.pages_visited);
    println!("  Product links discovered: {}", stats.product_links);
    println!("  Records stored: {}", stats.records_stored);
    println!("  Duration: {:?}", stats.duration);

    Ok(())
}

/// Start the HTTP query service
#[inline]
pub async fn serve_chat(port: u16, stateless: bool) -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    let client = Arc::new(OpenAiClient::new(&config).context("Failed to create model client")?);

    // Verify the model endpoint before accepting traffic
    if let Err(e) = client.health_check() {
        error!("Model endpoint health check failed: {:#}", e);
        println!("Error: cannot reach the model endpoint at {}", config.llm.base_url);
        println!("Check your network and the {} environment variable.", config.llm.api_key_env);
        return Err(e);
    }

    let store = EmbeddingStore::open(&config, Arc::clone(&client) as Arc<dyn EmbeddingModel>)
        .await
        .context("Failed to open the embedding store")?;

    let entries = store.count().await?;
    if entries == 0 {
        println!("Warning: collection {:?} is empty.", config.store.collection);
        println!("Run 'partsbot build <category-url>' first to populate it.");
    }

    let mode = if stateless {
        ChatMode::Stateless
    } else {
        ChatMode::Memory
    };

    let engine = Arc::new(ChatEngine::new(
        mode,
        Arc::new(store) as Arc<dyn ContextSource>,
        client as Arc<dyn ChatModel>,
    ));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!(
        "Starting query service on http://{} ({} entries, {:?} mode)",
        addr, entries, mode
    );
    println!("Press Ctrl+C to stop the server");

    crate::server::serve(addr, engine).await
}

/// Show status of the configuration, model endpoint, and collection
#[inline]
pub async fn show_status() -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;

    println!("📊 Partsbot Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗂️  Configuration:");
    println!("   Directory: {}", config.get_base_dir().display());
    println!("   Collection: {}", config.store.collection);
    println!("   Chat model: {}", config.llm.chat_model);
    println!("   Embedding model: {}", config.llm.embedding_model);
    println!();

    println!("🤖 Model Endpoint:");
    match OpenAiClient::new(&config) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!("   ✅ Endpoint: Reachable ({})", config.llm.base_url);
            }
            Err(e) => {
                println!("   ⚠️  Endpoint: Unreachable - {}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Client: Failed to build - {}", e);
        }
    }
    println!();

    println!("🔍 Embedding Store:");
    match OpenAiClient::new(&config) {
        Ok(client) => {
            match EmbeddingStore::open(&config, Arc::new(client) as Arc<dyn EmbeddingModel>).await
            {
                Ok(store) => match store.count().await {
                    Ok(count) => {
                        println!("   ✅ LanceDB: Connected");
                        println!("   📄 Entries Present: {}", count);
                    }
                    Err(e) => {
                        println!("   ⚠️  LanceDB: Connected but unreadable - {}", e);
                    }
                },
                Err(e) => {
                    println!("   ❌ LanceDB: Failed to connect - {}", e);
                }
            }
        }
        Err(e) => {
            println!("   ❌ Skipped - {}", e);
        }
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'partsbot build <category-url>' to populate the collection");
    println!("   • Use 'partsbot serve' to start the query service");
    println!("   • Use 'partsbot delete --force' to drop the collection");

    Ok(())
}

/// Delete the vector collection
#[inline]
pub async fn delete_collection(force: bool) -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    let client = Arc::new(OpenAiClient::new(&config).context("Failed to create model client")?);

    let mut store = EmbeddingStore::open(&config, client as Arc<dyn EmbeddingModel>)
        .await
        .context("Failed to open the embedding store")?;

    let count = store.count().await?;
    println!(
        "Collection {:?} holds {} entries.",
        config.store.collection, count
    );

    if !force {
        println!("This action cannot be undone.");
        println!("Re-run with --force to delete the collection.");
        return Ok(());
    }

    store.delete_collection().await?;
    println!("✓ Collection deleted");

    Ok(())
}
