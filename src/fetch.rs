use crate::config::ClonerConfig;
use crate::error::CloneError;
use crate::resolver;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

/// Retrieves the text body of a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`, mapping non-2xx statuses and transport errors to
    /// `CloneError::FetchUnavailable`.
    async fn fetch_text(&self, url: &str) -> Result<String, CloneError>;
}

/// `Fetcher` backed by a reqwest client with a browser user agent.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, CloneError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| CloneError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn from_config(config: &ClonerConfig) -> Result<Self, CloneError> {
        Self::new(
            &config.user_agent,
            Duration::from_secs(config.fetch_timeout_secs),
        )
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, CloneError> {
        let unavailable = |reason: String| CloneError::FetchUnavailable {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {}", status)));
        }

        response.text().await.map_err(|e| unavailable(e.to_string()))
    }
}

/// A resource fetched by the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    /// Absolute URL the body was fetched from.
    pub url: String,
    pub body: String,
}

/// Fetches batches of external resources with bounded parallelism.
pub struct FetchPool {
    fetcher: Arc<dyn Fetcher>,
    permits: usize,
}

impl FetchPool {
    pub fn new(fetcher: Arc<dyn Fetcher>, max_concurrent: usize) -> Self {
        Self {
            fetcher,
            permits: max_concurrent.max(1),
        }
    }

    /// Fetches every href (resolved against `base`) and waits for all of them.
    ///
    /// Failed resources are logged and left out. Results arrive in completion
    /// order, not submission order.
    pub async fn fetch_all(&self, hrefs: &[String], base: &Url) -> Vec<FetchedResource> {
        let semaphore = Arc::new(Semaphore::new(self.permits));
        let mut tasks = JoinSet::new();

        for href in hrefs {
            let Some(url) = resolver::absolutize(href, base) else {
                ::log::warn!("Skipping unresolvable resource reference: {}", href);
                continue;
            };
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                ::log::debug!("Fetching resource: {}", url);
                match fetcher.fetch_text(&url).await {
                    Ok(body) => Some(FetchedResource { url, body }),
                    Err(e) => {
                        ::log::warn!("Skipping resource: {}", e);
                        None
                    }
                }
            });
        }

        let mut fetched = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(resource)) => fetched.push(resource),
                Ok(None) => {}
                Err(e) => ::log::error!("Resource fetch task failed: {}", e),
            }
        }

        ::log::info!(
            "Fetched {} of {} external resources",
            fetched.len(),
            hrefs.len()
        );
        fetched
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StaticFetcher;
    use super::*;
    use std::sync::atomic::Ordering;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_fetcher_maps_status_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok.css"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(".a{color:red}"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.css"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("Mozilla/5.0 test", Duration::from_secs(5)).unwrap();

        let body = fetcher
            .fetch_text(&format!("{}/ok.css", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, ".a{color:red}");

        let err = fetcher
            .fetch_text(&format!("{}/missing.css", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "fetch_unavailable");
    }

    #[tokio::test]
    async fn test_pool_skips_failures_without_aborting() {
        let server = MockServer::start().await;
        for name in ["a", "b", "c"] {
            Mock::given(method("GET"))
                .and(path(format!("/{}.css", name)))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!(".{}{{}}", name)))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/broken.css"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let fetcher = Arc::new(HttpFetcher::new("Mozilla/5.0 test", Duration::from_secs(5)).unwrap());
        let pool = FetchPool::new(fetcher, 5);

        let hrefs: Vec<String> = ["/a.css", "b.css", "/broken.css", "/gone.css", "c.css"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let fetched = pool.fetch_all(&hrefs, &base).await;

        assert_eq!(fetched.len(), 3);
        let mut urls: Vec<_> = fetched.iter().map(|r| r.url.clone()).collect();
        urls.sort();
        assert_eq!(
            urls,
            vec![
                format!("{}/a.css", server.uri()),
                format!("{}/b.css", server.uri()),
                format!("{}/c.css", server.uri()),
            ]
        );
    }

    #[tokio::test]
    async fn test_pool_respects_concurrency_ceiling() {
        let base = Url::parse("https://ex.com/").unwrap();
        let mut fetcher = StaticFetcher::new().with_delay(Duration::from_millis(20));
        let mut hrefs = Vec::new();
        for i in 0..12 {
            let url = format!("https://ex.com/{}.css", i);
            fetcher = fetcher.with(&url, "p{}");
            hrefs.push(url);
        }
        let fetcher = Arc::new(fetcher);
        let pool = FetchPool::new(fetcher.clone(), 5);

        let fetched = pool.fetch_all(&hrefs, &base).await;

        assert_eq!(fetched.len(), 12);
        let peak = fetcher.max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 5, "peak in-flight fetches was {}", peak);
    }
}
