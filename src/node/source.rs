//! Loading node lists from files and HTTP sources
//!
//! This module provides functionality for:
//! - Fetching already-normalized node lists over HTTP
//! - Detecting and decoding bodies that arrive base64-encoded as a whole
//! - Reading source lists in `sources.txt` form

use crate::node::parser::decode_base64;
use crate::Result;
use anyhow::Context;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of sources fetched at once
const DEFAULT_PARALLEL_FETCHES: usize = 4;

/// Default user agent for HTTP requests
const DEFAULT_USER_AGENT: &str = "node-ranker";

/// Matches any supported scheme marker in a body
static SCHEME_MARKER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(vmess|ss|trojan|vless)://").expect("Invalid scheme marker regex"));

/// Decode a body that was base64-encoded as a whole
///
/// Bodies that already contain a scheme marker are returned unchanged, as
/// are bodies that fail to decode.
pub fn decode_body(content: &str) -> String {
    if SCHEME_MARKER_REGEX.is_match(content) {
        return content.to_string();
    }

    match decode_base64(content) {
        Some(bytes) => {
            log::debug!("Decoded base64 body of {} bytes", bytes.len());
            String::from_utf8_lossy(&bytes).into_owned()
        }
        None => content.to_string(),
    }
}

/// Split a body into trimmed, non-empty lines
pub fn split_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decode and split a body in one step
pub fn lines_from_body(content: &str) -> Vec<String> {
    split_lines(&decode_body(content))
}

/// Read node lines from a local file
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    Ok(lines_from_body(&content))
}

/// Read a list of source URLs, skipping blank lines and `#` comments
pub fn read_source_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Result of fetching a single source
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The source that was fetched
    pub source: String,
    /// Node lines found in the source
    pub lines: Vec<String>,
    /// Error message if fetching failed
    pub error: Option<String>,
}

impl FetchResult {
    pub fn success(source: String, lines: Vec<String>) -> Self {
        Self {
            source,
            lines,
            error: None,
        }
    }

    pub fn failure(source: String, error: String) -> Self {
        Self {
            source,
            lines: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Configuration for the source fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Timeout for HTTP requests
    pub timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: String,
    /// Number of sources fetched at once
    pub parallel: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            parallel: DEFAULT_PARALLEL_FETCHES,
        }
    }
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Fetcher for node lists served over HTTP
pub struct SourceFetcher {
    config: FetcherConfig,
    client: Client,
}

impl SourceFetcher {
    /// Create a new fetcher with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(FetcherConfig::default())
    }

    /// Create a new fetcher with custom configuration
    pub fn with_config(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { config, client })
    }

    /// Fetch one source and return its node lines
    pub async fn fetch(&self, url: &str) -> Result<Vec<String>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let content = response.text().await?;
        Ok(lines_from_body(&content))
    }

    /// Fetch several sources, keeping a result per source in input order
    pub async fn fetch_all(&self, urls: &[String]) -> Vec<FetchResult> {
        stream::iter(urls)
            .map(|url| async move {
                match self.fetch(url).await {
                    Ok(lines) => {
                        log::info!("Fetched {} lines from {}", lines.len(), url);
                        FetchResult::success(url.clone(), lines)
                    }
                    Err(e) => {
                        log::warn!("Failed to fetch {}: {}", url, e);
                        FetchResult::failure(url.clone(), e.to_string())
                    }
                }
            })
            .buffered(self.config.parallel.max(1))
            .collect()
            .await
    }
}
