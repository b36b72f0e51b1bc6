
use anyhow::{Context, Result, anyhow};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use ureq::Agent;
use url::Url;

/// Marker query fragment identifying a product page link
pub const PRODUCT_LINK_MARKER: &str = "SourceCode=18";

/// Suffix stripped from the category page's last path segment
const CATEGORY_PAGE_SUFFIX: &str = "-Parts.htm";

/// Configuration for the web crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// User agent string to use for requests
    pub user_agent: String,
    /// Timeout for HTTP requests in seconds
    pub timeout_seconds: u64,
    /// Politeness delay between requests in milliseconds
    pub rate_limit_ms: u64,
    /// Maximum number of retry attempts for retryable errors
    pub max_retries: u32,
    /// Delay between retry attempts in seconds
    pub retry_delay_seconds: u64,
    /// Hard cap on pages fetched by a single discovery run
    pub max_pages: usize,
}

impl Default for CrawlerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            user_agent: "partsbot/0.1.0 (Product Indexer)".to_string(),
            timeout_seconds: 30,
            rate_limit_ms: 1000,
            max_retries: 3,
            retry_delay_seconds: 30,
            max_pages: 500,
        }
    }
}

/// Outcome of fetching one page; non-success statuses are data, not errors
#[derive(Debug, Clone)]
pub enum PageFetch {
    Ok(String),
    Status(u16),
}

/// HTTP client wrapper with rate limiting and retry logic
#[derive(Debug)]
pub struct HttpClient {
    agent: Agent,
    config: CrawlerConfig,
    last_request_time: Option<Instant>,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration
    #[inline]
    pub fn new(config: CrawlerConfig) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .user_agent(&config.user_agent)
            .build()
            .into();

        Self {
            agent,
            config,
            last_request_time: None,
        }
    }

    /// Perform an HTTP GET request with rate limiting and retry logic
    #[inline]
    pub async fn get(&mut self, url: &str) -> Result<String> {
        match self.get_page(url).await? {
            PageFetch::Ok(body) => Ok(body),
            PageFetch::Status(status) => Err(anyhow!("HTTP error {}", status)),
        }
    }

    /// Like [`get`](Self::get), but reports a non-success status instead of
    /// failing, so callers can choose their own degraded behavior
    #[inline]
    pub async fn get_page(&mut self, url: &str) -> Result<PageFetch> {
        self.apply_rate_limit().await;

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!("Retrying request to {} (attempt {})", url, attempt + 1);
                tokio::time::sleep(Duration::from_secs(self.config.retry_delay_seconds)).await;
            }

            match self.try_get(url) {
                Ok(fetch) => {
                    debug!("Fetched {} (attempt {})", url, attempt + 1);
                    return Ok(fetch);
                }
                Err(e) if is_retryable_error(&e) && attempt < self.config.max_retries => {
                    warn!("Retryable error for {}: {}", url, e);
                    last_error = Some(e);
                }
                Err(e) => {
                    error!("Non-retryable error for {}: {}", url, e);
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("All retry attempts failed")))
    }

    /// Apply rate limiting by sleeping if necessary
    async fn apply_rate_limit(&mut self) {
        if let Some(last_time) = self.last_request_time {
            let elapsed = last_time.elapsed();
            let rate_limit_duration = Duration::from_millis(self.config.rate_limit_ms);

            if elapsed < rate_limit_duration {
                let sleep_duration = rate_limit_duration - elapsed;
                debug!("Rate limiting: sleeping for {:?}", sleep_duration);
                sleep(sleep_duration).await;
            }
        }

        self.last_request_time = Some(Instant::now());
    }

    /// Attempt a single HTTP GET request without retry logic
    fn try_get(&self, url: &str) -> Result<PageFetch> {
        debug!("Making HTTP GET request to: {}", url);

        match self.agent.get(url).call() {
            Ok(mut response) => {
                let text = response
                    .body_mut()
                    .read_to_string()
                    .with_context(|| format!("Failed to read response body from {}", url))?;
                debug!("Read {} bytes from {}", text.len(), url);
                Ok(PageFetch::Ok(text))
            }
            Err(ureq::Error::StatusCode(code)) => {
                debug!("HTTP request returned status {}: {}", code, url);
                if code >= 500 || code == 429 {
                    // Let the retry loop handle transient server-side failures
                    Err(anyhow!("HTTP error {}", code))
                } else {
                    Ok(PageFetch::Status(code))
                }
            }
            Err(e) => {
                debug!("HTTP request failed with transport error: {}", e);
                Err(anyhow::Error::from(e))
                    .with_context(|| format!("Failed to make HTTP request to {}", url))
            }
        }
    }
}

impl Default for HttpClient {
    /// Create a new HTTP client with default configuration
    #[inline]
    fn default() -> Self {
        Self::new(CrawlerConfig::default())
    }
}

/// Check if an error is retryable (network timeouts, 5xx errors)
fn is_retryable_error(error: &anyhow::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("timeout")
        || error_str.contains("connection")
        || error_str.contains("network")
    {
        return true;
    }

    if error_str.contains("http error 5") {
        return true;
    }

    if error_str.contains("http error 429") {
        return true;
    }

    false
}

/// Validate and normalize a URL
#[inline]
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str).with_context(|| format!("Invalid URL format: {}", url_str))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(anyhow!("URL must use HTTP or HTTPS scheme: {}", url_str));
    }

    if url.host_str().is_none() {
        return Err(anyhow!("URL must have a valid host: {}", url_str));
    }

    Ok(url)
}

/// Derive the category keyword from a category page URL: the last path
/// segment with the fixed page suffix stripped and a trailing dash appended,
/// e.g. `.../Refrigerator-Parts.htm` becomes `Refrigerator-`
#[inline]
pub fn derive_category_keyword(base_url: &Url) -> Result<String> {
    let segment = base_url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| anyhow!("Category URL has no path segment: {}", base_url))?;

    let stem = segment.strip_suffix(CATEGORY_PAGE_SUFFIX).unwrap_or(segment);
    Ok(format!("{}-", stem))
}

/// Extract the raw href attribute of every anchor on the page.
/// Fragment-bearing hrefs are skipped outright, matching the marker and
/// keyword checks which run against the raw href text.
#[inline]
pub fn extract_hrefs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let link_selector = Selector::parse("a[href]").expect("static selector is valid");

    document
        .select(&link_selector)
        .filter_map(|element| element.value().attr("href"))
        .filter(|href| !href.contains('#'))
        .map(|href| href.to_string())
        .collect()
}

/// Statistics about a discovery run
#[derive(Debug, Clone, Copy)]
pub struct CrawlStats {
    /// Pages fetched and inspected for links
    pub pages_visited: usize,
    /// Pages whose fetch failed after retries
    pub failed_fetches: usize,
    /// Product links collected
    pub products_found: usize,
    /// Duration of the discovery run
    pub duration: Duration,
}

/// Result of a product link discovery run
#[derive(Debug, Clone)]
pub struct DiscoveredLinks {
    pub products: HashSet<Url>,
    pub stats: CrawlStats,
}

/// Crawler that discovers product page links under a category page
pub struct ProductLinkCrawler {
    http_client: HttpClient,
    config: CrawlerConfig,
}

impl ProductLinkCrawler {
    /// Create a new crawler
    #[inline]
    pub fn new(config: CrawlerConfig) -> Self {
        let http_client = HttpClient::new(config.clone());
        Self {
            http_client,
            config,
        }
    }

    /// Discover product page links reachable from `base_url` within
    /// `max_depth` hops through same-category pages.
    ///
    /// Traversal is an explicit depth-first worklist of `(url, depth)`
    /// pairs with a visited set; a URL is never fetched twice, and a failed
    /// fetch abandons that branch only.
    #[inline]
    pub async fn discover_product_links(
        &mut self,
        base_url: &str,
        max_depth: usize,
    ) -> Result<DiscoveredLinks> {
        let start_time = Instant::now();
        let base = validate_url(base_url)?;
        let keyword = derive_category_keyword(&base)?;

        info!(
            "Discovering product links from {} (keyword {:?}, max depth {})",
            base, keyword, max_depth
        );

        let mut visited: HashSet<String> = HashSet::new();
        let mut products: HashSet<Url> = HashSet::new();
        let mut worklist: Vec<(Url, usize)> = vec![(base, 0)];

        let mut pages_visited = 0usize;
        let mut failed_fetches = 0usize;

        while let Some((url, depth)) = worklist.pop() {
            if depth > max_depth {
                continue;
            }
            if !visited.insert(url.as_str().to_string()) {
                continue;
            }
            if pages_visited >= self.config.max_pages {
                warn!(
                    "Page cap of {} reached, abandoning {} queued pages",
                    self.config.max_pages,
                    worklist.len() + 1
                );
                break;
            }

            let html = match self.http_client.get(url.as_str()).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("Skipping {} after failed fetch: {}", url, e);
                    failed_fetches += 1;
                    continue;
                }
            };
            pages_visited += 1;

            for href in extract_hrefs(&html) {
                let absolute = match url.join(&href) {
                    Ok(absolute) => absolute,
                    Err(e) => {
                        debug!("Failed to resolve href {:?} against {}: {}", href, url, e);
                        continue;
                    }
                };
                if validate_url(absolute.as_str()).is_err() {
                    continue;
                }

                if href.contains(PRODUCT_LINK_MARKER) {
                    // Product pages are collected, never entered
                    products.insert(absolute);
                } else if href.contains(&keyword) {
                    worklist.push((absolute, depth + 1));
                }
            }
        }

        let stats = CrawlStats {
            pages_visited,
            failed_fetches,
            products_found: products.len(),
            duration: start_time.elapsed(),
        };

        info!(
            "Discovery complete: {} product links from {} pages ({} failed fetches) in {:?}",
            stats.products_found, stats.pages_visited, stats.failed_fetches, stats.duration
        );

        Ok(DiscoveredLinks { products, stats })
    }
}
