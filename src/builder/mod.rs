// One-shot offline build
// Crawl a category page, summarize each product page, and hand the full
// record list to the embedding store

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use url::Url;

use crate::crawler::{CrawlerConfig, ProductLinkCrawler};
use crate::llm::ChatModel;
use crate::store::EmbeddingStore;
use crate::summarizer::PageSummarizer;

/// Statistics about one build run
#[derive(Debug, Clone, Copy)]
pub struct BuildStats {
    /// Pages the crawler fetched while discovering links
    pub pages_visited: usize,
    /// Product links the crawler collected
    pub product_links: usize,
    /// Records written to the collection
    pub records_stored: usize,
    /// Duration of the whole build
    pub duration: Duration,
}

/// Orchestrates crawler, summarizer, and store into one offline job
pub struct DatabaseBuilder {
    crawler: ProductLinkCrawler,
    summarizer: PageSummarizer,
    store: EmbeddingStore,
}

impl DatabaseBuilder {
    /// Create a new builder sharing one crawler configuration between the
    /// link discovery and page scraping clients
    #[inline]
    pub fn new(
        crawler_config: CrawlerConfig,
        chat_model: Arc<dyn ChatModel>,
        store: EmbeddingStore,
    ) -> Self {
        Self {
            crawler: ProductLinkCrawler::new(crawler_config.clone()),
            summarizer: PageSummarizer::new(crawler_config, chat_model),
            store,
        }
    }

    /// Crawl, summarize sequentially, and populate the collection.
    ///
    /// Pages are summarized one at a time and a hard summarizer failure
    /// aborts the whole batch; nothing is written until every page
    /// succeeded.
    #[inline]
    pub async fn build(&mut self, base_url: &str, max_depth: usize) -> Result<BuildStats> {
        let start_time = Instant::now();

        let discovered = self
            .crawler
            .discover_product_links(base_url, max_depth)
            .await
            .context("Product link discovery failed")?;

        // Sorted so runs over the same crawl result are deterministic
        let mut urls: Vec<Url> = discovered.products.into_iter().collect();
        urls.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        info!("Creating records from {} product links", urls.len());

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(urls.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Summarizing {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut records = Vec::with_capacity(urls.len());
        for url in &urls {
            bar.set_message(url.to_string());
            let record = self
                .summarizer
                .summarize_url(url)
                .await
                .with_context(|| format!("Failed to summarize {}", url))?;
            records.push(record);
            bar.inc(1);
        }
        bar.finish_and_clear();

        let records_stored = self
            .store
            .populate(&records)
            .await
            .context("Failed to populate the collection")?;

        let stats = BuildStats {
            pages_visited: discovered.stats.pages_visited,
            product_links: urls.len(),
            records_stored,
            duration: start_time.elapsed(),
        };

        info!(
            "Build complete: {} records stored from {} product links in {:?}",
            stats.records_stored, stats.product_links, stats.duration
        );

        Ok(stats)
    }
}
