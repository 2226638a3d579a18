use crate::config::ClonerConfig;
use crate::error::CloneError;
use crate::renderers::renderer::{RenderedDocument, Renderer};
use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder};
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

const READY_STATE_SCRIPT: &str = "return document.readyState;";

const CAPTURE_STYLES_SCRIPT: &str = r#"
return Array.from(document.styleSheets).map(function (sheet) {
    try {
        return Array.from(sheet.cssRules).map(function (rule) { return rule.cssText; }).join("\n");
    } catch (e) {
        return "";
    }
}).filter(function (text) { return text.length > 0; });
"#;

const FALLBACK_WEBDRIVER_URLS: &[&str] = &[
    "http://localhost:9515", // ChromeDriver default
    "http://localhost:4444", // geckodriver / Selenium default
    "http://127.0.0.1:4444",
];

/// Renders pages in a browser driven over the WebDriver protocol.
///
/// Each render opens its own session and closes it afterwards. Every step that
/// talks to the driver is bounded, so a stalled driver surfaces as
/// `RenderTimeout` rather than a hung render.
pub struct WebDriverRenderer {
    webdriver_url: String,
    fallback_urls: Vec<String>,
    headless: bool,
    connect_timeout: Duration,
    navigation_timeout: Duration,
    load_state_timeout: Duration,
}

impl WebDriverRenderer {
    pub fn new(
        webdriver_url: &str,
        connect_timeout: Duration,
        navigation_timeout: Duration,
        load_state_timeout: Duration,
    ) -> Self {
        Self {
            webdriver_url: webdriver_url.to_string(),
            fallback_urls: FALLBACK_WEBDRIVER_URLS.iter().map(|u| u.to_string()).collect(),
            headless: true,
            connect_timeout,
            navigation_timeout,
            load_state_timeout,
        }
    }

    pub fn from_config(config: &ClonerConfig) -> Self {
        Self {
            headless: config.headless,
            ..Self::new(
                &config.webdriver_url,
                config.connect_timeout(),
                config.navigation_timeout(),
                config.load_state_timeout(),
            )
        }
    }

    fn capabilities(&self) -> serde_json::Map<String, Value> {
        let mut caps = serde_json::Map::new();
        if self.headless {
            caps.insert(
                "goog:chromeOptions".to_string(),
                json!({"args": ["--headless=new", "--disable-gpu", "--no-sandbox"]}),
            );
            caps.insert(
                "moz:firefoxOptions".to_string(),
                json!({"args": ["-headless"]}),
            );
        }
        caps
    }

    /// Connects to the configured WebDriver, falling back to common local ports.
    async fn connect(&self, page_url: &str) -> Result<Client, CloneError> {
        let mut candidates = vec![self.webdriver_url.as_str()];
        for fallback in &self.fallback_urls {
            if !candidates.contains(&fallback.as_str()) {
                candidates.push(fallback);
            }
        }

        let mut last_error = String::new();
        let mut timed_out = false;
        for url in candidates {
            let mut builder = ClientBuilder::native();
            builder.capabilities(self.capabilities());
            match timeout(self.connect_timeout, builder.connect(url)).await {
                Ok(Ok(client)) => {
                    ::log::debug!("Connected to WebDriver at {}", url);
                    return Ok(client);
                }
                Ok(Err(e)) => {
                    ::log::debug!("Failed to connect to WebDriver at {}: {}", url, e);
                    last_error = e.to_string();
                }
                Err(_) => {
                    ::log::warn!(
                        "WebDriver at {} did not open a session within {:?}",
                        url,
                        self.connect_timeout
                    );
                    timed_out = true;
                    last_error = format!("session request to {} timed out", url);
                }
            }
        }

        ::log::error!(
            "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
        );
        if timed_out {
            return Err(CloneError::RenderTimeout {
                url: page_url.to_string(),
                stage: "connect".to_string(),
            });
        }
        Err(CloneError::RenderFailure(format!(
            "no WebDriver reachable (last error: {})",
            last_error
        )))
    }

    async fn capture(&self, client: &Client, url: &str) -> Result<RenderedDocument, CloneError> {
        within(self.navigation_timeout, url, "navigation", async {
            client
                .goto(url)
                .await
                .map_err(|e| CloneError::RenderFailure(format!("navigation to {} failed: {}", url, e)))
        })
        .await?;

        within(self.load_state_timeout, url, "load state", async {
            wait_for_load(client).await;
            Ok(())
        })
        .await?;

        let styles = timeout(
            self.load_state_timeout,
            client.execute(CAPTURE_STYLES_SCRIPT, Vec::new()),
        )
        .await;
        let stylesheets = match styles {
            Ok(Ok(Value::Array(items))) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Ok(Ok(_)) => Vec::new(),
            Ok(Err(e)) => {
                ::log::warn!("Could not capture stylesheets for {}: {}", url, e);
                Vec::new()
            }
            Err(_) => {
                ::log::warn!("Timed out capturing stylesheets for {}", url);
                Vec::new()
            }
        };

        let html = within(self.load_state_timeout, url, "capture", async {
            client
                .source()
                .await
                .map_err(|e| CloneError::RenderFailure(format!("getting source for {} failed: {}", url, e)))
        })
        .await?;
        if html.trim().is_empty() {
            return Err(CloneError::RenderFailure(format!("{} rendered an empty document", url)));
        }

        Ok(RenderedDocument { html, stylesheets })
    }
}

/// Runs `step` under `limit`, reporting expiry as a render timeout at `stage`.
async fn within<T>(
    limit: Duration,
    url: &str,
    stage: &str,
    step: impl Future<Output = Result<T, CloneError>>,
) -> Result<T, CloneError> {
    match timeout(limit, step).await {
        Ok(result) => result,
        Err(_) => Err(CloneError::RenderTimeout {
            url: url.to_string(),
            stage: stage.to_string(),
        }),
    }
}

/// Polls until the document reports `complete`.
async fn wait_for_load(client: &Client) {
    loop {
        match client.execute(READY_STATE_SCRIPT, Vec::new()).await {
            Ok(Value::String(state)) if state == "complete" => return,
            Ok(_) => {}
            Err(e) => ::log::trace!("readyState check failed: {}", e),
        }
        sleep(Duration::from_millis(250)).await;
    }
}

#[async_trait]
impl Renderer for WebDriverRenderer {
    async fn render(&self, url: &str) -> Result<RenderedDocument, CloneError> {
        let started = std::time::Instant::now();
        let client = self.connect(url).await?;

        let result = self.capture(&client, url).await;

        match timeout(self.connect_timeout, client.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => ::log::warn!("Failed to close WebDriver session: {}", e),
            Err(_) => ::log::warn!("Timed out closing WebDriver session for {}", url),
        }

        if result.is_ok() {
            ::log::debug!(
                "Rendered {} in {:.2} seconds",
                url,
                started.elapsed().as_secs_f64()
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_uses_configured_timeouts() {
        let config = ClonerConfig {
            webdriver_url: "http://127.0.0.1:9999".to_string(),
            headless: false,
            ..ClonerConfig::default()
        };

        let renderer = WebDriverRenderer::from_config(&config);

        assert_eq!(renderer.webdriver_url, "http://127.0.0.1:9999");
        assert_eq!(renderer.connect_timeout, Duration::from_secs(15));
        assert_eq!(renderer.navigation_timeout, Duration::from_secs(60));
        assert_eq!(renderer.load_state_timeout, Duration::from_secs(30));
        assert!(renderer.capabilities().is_empty());
    }

    #[test]
    fn test_headless_capabilities() {
        let renderer = WebDriverRenderer::new(
            "http://localhost:4444",
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let caps = renderer.capabilities();
        assert!(caps.contains_key("goog:chromeOptions"));
        assert!(caps.contains_key("moz:firefoxOptions"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_step_becomes_render_timeout() {
        let result: Result<(), CloneError> = within(
            Duration::from_secs(60),
            "https://ex.com/",
            "capture",
            std::future::pending(),
        )
        .await;

        assert_eq!(
            result,
            Err(CloneError::RenderTimeout {
                url: "https://ex.com/".to_string(),
                stage: "capture".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_unresponsive_webdriver_times_out_at_connect() {
        // Accepts connections but never answers the new-session request.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let renderer = WebDriverRenderer {
            fallback_urls: Vec::new(),
            ..WebDriverRenderer::new(
                &format!("http://{}", addr),
                Duration::from_millis(200),
                Duration::from_secs(1),
                Duration::from_secs(1),
            )
        };

        let err = renderer.render("https://ex.com/").await.unwrap_err();
        server.abort();

        assert_eq!(
            err,
            CloneError::RenderTimeout {
                url: "https://ex.com/".to_string(),
                stage: "connect".to_string(),
            }
        );
        assert!(err.is_recoverable());
    }
}
