
use anyhow::{Context, Result};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::crawler::{CrawlerConfig, HttpClient, PageFetch};
use crate::llm::{ChatMessage, ChatModel};

/// CSS selectors for the product page fragments worth keeping: the general
/// description block and the Q&A response block
const PRODUCT_TEXT_SELECTORS: [&str; 2] = [".mb-4", ".qna__question.js-qnaResponse"];

/// Instruction under which the chat model rewrites scraped fragments
const REFORMAT_PROMPT: &str = "You are a helpful assistant. Read this text, and return it in a \
     continuous line of properly spaced and formatted text, according to English conventions.";

/// One product described as a natural-language paragraph; the offline
/// interchange format is a JSON object with this single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub text: String,
}

/// Turns a product page URL into a [`ProductRecord`] by scraping fixed
/// fragments and asking the chat model to reformat them into a paragraph
pub struct PageSummarizer {
    http_client: HttpClient,
    chat_model: Arc<dyn ChatModel>,
}

impl PageSummarizer {
    /// Create a new summarizer
    #[inline]
    pub fn new(config: CrawlerConfig, chat_model: Arc<dyn ChatModel>) -> Self {
        Self {
            http_client: HttpClient::new(config),
            chat_model,
        }
    }

    /// Fetch, scrape, and reformat one product page.
    ///
    /// A non-success HTTP status degrades to a placeholder string which then
    /// flows through summarization like any scraped text; transport errors
    /// fail the call.
    #[inline]
    pub async fn summarize_url(&mut self, url: &Url) -> Result<ProductRecord> {
        let raw_text = self.scrape(url).await?;
        debug!("Scraped {} chars from {}", raw_text.len(), url);

        let paragraph = self
            .reformat(&raw_text)
            .with_context(|| format!("Failed to reformat scraped text from {}", url))?;

        info!("Summarized {} into {} chars", url, paragraph.len());
        Ok(ProductRecord { text: paragraph })
    }

    async fn scrape(&mut self, url: &Url) -> Result<String> {
        match self.http_client.get_page(url.as_str()).await? {
            PageFetch::Ok(html) => Ok(extract_product_text(&html)),
            PageFetch::Status(status) => Ok(format!(
                "Failed to retrieve the webpage. Status code: {}",
                status
            )),
        }
    }

    fn reformat(&self, raw_text: &str) -> Result<String> {
        let one_line = collapse_whitespace(raw_text);
        let messages = [
            ChatMessage::system(REFORMAT_PROMPT),
            ChatMessage::user(one_line),
        ];
        self.chat_model.complete(&messages)
    }
}

/// Collect the text of every element matching the fixed product selectors,
/// in selector order, whitespace-collapsed and space-joined
#[inline]
pub fn extract_product_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut fragments: Vec<String> = Vec::new();

    for selector_str in PRODUCT_TEXT_SELECTORS {
        let selector = Selector::parse(selector_str).expect("static selector is valid");
        for element in document.select(&selector) {
            let text = collapse_whitespace(&element.text().collect::<String>());
            if !text.is_empty() {
                fragments.push(text);
            }
        }
    }

    fragments.join(" ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
