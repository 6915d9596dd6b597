use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ShellConfig;

/// How a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    /// No interception: non-GET or non-http scheme.
    Bypass,
    /// Navigations: network first, cached shell entry point on failure.
    NetworkFirst,
    /// Backend API calls: always network, never cached.
    PassThrough,
    /// Static assets: cached response immediately, refresh in background.
    StaleWhileRevalidate,
}

/// A request as seen by the interception layer.
#[derive(Debug, Clone)]
pub struct ShellRequest {
    pub method: String,
    pub url: String,
    /// Full page load rather than a subresource fetch.
    pub is_navigation: bool,
}

impl ShellRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            is_navigation: false,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            is_navigation: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShellResponse {
    pub status: u16,
    pub body: Bytes,
    pub content_type: Option<String>,
    pub from_cache: bool,
}

impl ShellResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

type NamedCaches = HashMap<String, HashMap<String, ShellResponse>>;

/// Application shell cache with service-worker fetch semantics.
///
/// One named cache per deployed version; bumping the configured name and
/// running [`activate`](Self::activate) is the invalidation mechanism.
#[derive(Clone)]
pub struct ShellCache {
    config: ShellConfig,
    base_url: Url,
    client: Client,
    caches: Arc<RwLock<NamedCaches>>,
}

impl ShellCache {
    pub fn new(config: ShellConfig, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid shell base URL: {}", base_url))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            base_url,
            client,
            caches: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Install phase: pre-populate the named cache with the shell assets.
    pub async fn install(&self) -> Result<()> {
        info!(
            "Installing shell cache '{}' with {} assets",
            self.config.cache_name,
            self.config.shell_assets.len()
        );

        let mut assets = self.config.shell_assets.clone();
        if !assets.contains(&self.config.entry_point) {
            assets.push(self.config.entry_point.clone());
        }

        for asset in assets {
            let url = self.resolve(&asset)?;
            let response = self
                .fetch_network(&url)
                .await
                .with_context(|| format!("Failed to pre-cache shell asset {}", url))?;

            if response.is_success() {
                self.put_cached(&url, response).await;
            } else {
                warn!(
                    "Skipping shell asset {} (status {})",
                    url, response.status
                );
            }
        }

        Ok(())
    }

    /// Activate phase: delete caches left over from previous versions.
    pub async fn activate(&self) {
        let mut caches = self.caches.write().await;
        let before = caches.len();
        caches.retain(|name, _| name == &self.config.cache_name);

        let removed = before - caches.len();
        if removed > 0 {
            info!("Activated shell cache, removed {} stale cache(s)", removed);
        }
    }

    /// Decide how a request is served.
    pub fn classify(&self, request: &ShellRequest) -> FetchPolicy {
        if !request.method.eq_ignore_ascii_case("GET") {
            return FetchPolicy::Bypass;
        }

        match Url::parse(&request.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return FetchPolicy::Bypass,
        }

        if request.is_navigation {
            return FetchPolicy::NetworkFirst;
        }

        if self
            .config
            .api_prefixes
            .iter()
            .any(|prefix| request.url.starts_with(prefix.as_str()))
        {
            return FetchPolicy::PassThrough;
        }

        FetchPolicy::StaleWhileRevalidate
    }

    /// Serve a request under its policy.
    pub async fn handle(&self, request: &ShellRequest) -> Result<ShellResponse> {
        match self.classify(request) {
            FetchPolicy::Bypass | FetchPolicy::PassThrough => {
                self.fetch_passthrough(request).await
            }
            FetchPolicy::NetworkFirst => self.network_first(request).await,
            FetchPolicy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    async fn fetch_passthrough(&self, request: &ShellRequest) -> Result<ShellResponse> {
        let method: reqwest::Method = request
            .method
            .parse()
            .with_context(|| format!("Invalid HTTP method: {}", request.method))?;

        let response = self
            .client
            .request(method, &request.url)
            .send()
            .await
            .with_context(|| format!("Network fetch failed for {}", request.url))?;

        Self::into_shell_response(response).await
    }

    /// Try the network, cache the result, fall back to the cached shell
    /// entry point when the network is unreachable.
    async fn network_first(&self, request: &ShellRequest) -> Result<ShellResponse> {
        match self.fetch_network(&request.url).await {
            Ok(response) => {
                if response.is_success() {
                    self.put_cached(&request.url, response.clone()).await;
                }
                Ok(response)
            }
            Err(e) => {
                let entry_point = self.resolve(&self.config.entry_point)?;
                if let Some(cached) = self.get_cached(&entry_point).await {
                    debug!(
                        "Navigation to {} failed ({:#}), serving cached shell",
                        request.url, e
                    );
                    return Ok(cached);
                }

                Err(e.context("Navigation failed and no cached shell is available"))
            }
        }
    }

    /// Serve from cache immediately while refreshing in the background;
    /// wait on the network when nothing is cached yet.
    async fn stale_while_revalidate(&self, request: &ShellRequest) -> Result<ShellResponse> {
        if let Some(cached) = self.get_cached(&request.url).await {
            let this = self.clone();
            let url = request.url.clone();
            tokio::spawn(async move {
                match this.fetch_network(&url).await {
                    Ok(fresh) if fresh.is_success() => {
                        this.put_cached(&url, fresh).await;
                        debug!("Revalidated {}", url);
                    }
                    Ok(fresh) => {
                        debug!("Revalidation of {} returned status {}", url, fresh.status);
                    }
                    Err(e) => {
                        debug!("Revalidation of {} failed: {:#}", url, e);
                    }
                }
            });

            return Ok(cached);
        }

        let response = self.fetch_network(&request.url).await?;
        if response.is_success() {
            self.put_cached(&request.url, response.clone()).await;
        }
        Ok(response)
    }

    async fn fetch_network(&self, url: &str) -> Result<ShellResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Network fetch failed for {}", url))?;

        Self::into_shell_response(response).await
    }

    async fn into_shell_response(response: reqwest::Response) -> Result<ShellResponse> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .context("Failed to read response body")?;

        Ok(ShellResponse {
            status,
            body,
            content_type,
            from_cache: false,
        })
    }

    fn resolve(&self, path_or_url: &str) -> Result<String> {
        let url = self
            .base_url
            .join(path_or_url)
            .with_context(|| format!("Failed to resolve shell URL {}", path_or_url))?;
        Ok(url.to_string())
    }

    async fn get_cached(&self, url: &str) -> Option<ShellResponse> {
        let caches = self.caches.read().await;
        caches
            .get(&self.config.cache_name)
            .and_then(|cache| cache.get(url))
            .map(|response| ShellResponse {
                from_cache: true,
                ..response.clone()
            })
    }

    async fn put_cached(&self, url: &str, response: ShellResponse) {
        let mut caches = self.caches.write().await;
        caches
            .entry(self.config.cache_name.clone())
            .or_default()
            .insert(url.to_string(), response);
    }

    /// Names of the caches currently held.
    pub async fn cache_names(&self) -> Vec<String> {
        self.caches.read().await.keys().cloned().collect()
    }

    #[cfg(test)]
    async fn seed_cache(&self, cache_name: &str, url: &str, response: ShellResponse) {
        let mut caches = self.caches.write().await;
        caches
            .entry(cache_name.to_string())
            .or_default()
            .insert(url.to_string(), response);
    }
}
