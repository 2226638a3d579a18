//! Chooses between the light path (fetch + parse + generate) and the heavy
//! path (browser render), falling back from heavy to light once.

use crate::error::CloneError;
use crate::fetch::Fetcher;
use crate::generation::{self, Generator};
use crate::normalizer::ContentExtractor;
use crate::renderers::{self, Renderer};
use crate::resolver;
use crate::store::ArtifactStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use url::Url;

/// An inbound clone request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneRequest {
    /// Absolute http(s) URL of the page to clone
    pub url: String,

    /// Start on the light path instead of the browser render
    #[serde(default)]
    pub use_light_path: bool,
}

impl CloneRequest {
    pub fn new(url: impl Into<String>, use_light_path: bool) -> Self {
        Self {
            url: url.into(),
            use_light_path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClonePath {
    Light,
    Heavy,
}

/// Outcome of one path within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathAttempt {
    pub path: ClonePath,
    /// `None` on success, otherwise the error kind
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// Result of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct CloneOutcome {
    pub html: String,
    pub artifact_id: String,
    pub message: String,
    /// Every path tried, in order
    pub attempts: Vec<PathAttempt>,
}

/// States of a single clone run.
#[derive(Debug)]
enum RunState {
    HeavyPath,
    LightPath { fallback: bool },
    Success { html: String, path: ClonePath, fallback: bool },
    Failure(CloneError),
}

/// Drives clone runs. Cheap to share across tasks behind an `Arc`.
pub struct Orchestrator {
    extractor: ContentExtractor,
    renderer: Arc<dyn Renderer>,
    generator: Arc<dyn Generator>,
    store: Arc<ArtifactStore>,
    render_permits: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        renderer: Arc<dyn Renderer>,
        generator: Arc<dyn Generator>,
        store: Arc<ArtifactStore>,
        max_concurrent_fetches: usize,
        max_concurrent_renders: usize,
    ) -> Self {
        Self {
            extractor: ContentExtractor::new(fetcher, max_concurrent_fetches),
            renderer,
            generator,
            store,
            render_permits: Arc::new(Semaphore::new(max_concurrent_renders.max(1))),
        }
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Runs one clone request to completion.
    pub async fn clone_site(&self, request: &CloneRequest) -> Result<CloneOutcome, CloneError> {
        let page_url = resolver::parse_page_url(&request.url)?;
        let base = resolver::base_url(&page_url)?;
        let mut attempts = Vec::new();

        let mut state = if request.use_light_path {
            RunState::LightPath { fallback: false }
        } else {
            RunState::HeavyPath
        };
        ::log::info!("Cloning {} starting on {:?}", page_url, state);

        loop {
            state = match state {
                RunState::HeavyPath => {
                    let started = Instant::now();
                    match self.run_heavy(&page_url, &base).await {
                        Ok(html) => {
                            attempts.push(attempt(ClonePath::Heavy, None, started));
                            RunState::Success {
                                html,
                                path: ClonePath::Heavy,
                                fallback: false,
                            }
                        }
                        Err(e) => {
                            attempts.push(attempt(ClonePath::Heavy, Some(&e), started));
                            if e.is_recoverable() {
                                ::log::warn!(
                                    "Heavy path failed for {} ({}); falling back to light path",
                                    page_url,
                                    e
                                );
                                RunState::LightPath { fallback: true }
                            } else {
                                RunState::Failure(e)
                            }
                        }
                    }
                }
                RunState::LightPath { fallback } => {
                    let started = Instant::now();
                    match self.run_light(&page_url).await {
                        Ok(html) => {
                            attempts.push(attempt(ClonePath::Light, None, started));
                            RunState::Success {
                                html,
                                path: ClonePath::Light,
                                fallback,
                            }
                        }
                        Err(e) => {
                            attempts.push(attempt(ClonePath::Light, Some(&e), started));
                            ::log::error!("Light path failed for {}: {}", page_url, e);
                            RunState::Failure(e)
                        }
                    }
                }
                RunState::Success {
                    html,
                    path,
                    fallback,
                } => {
                    let artifact_id = self.store.put(html.clone()).await;
                    let message = match (path, fallback) {
                        (ClonePath::Heavy, _) => "Website cloned from browser render".to_string(),
                        (ClonePath::Light, false) => "Website cloned from extracted content".to_string(),
                        (ClonePath::Light, true) => {
                            "Browser render failed; website cloned from extracted content".to_string()
                        }
                    };
                    ::log::info!("Cloned {} as artifact {}", page_url, artifact_id);
                    return Ok(CloneOutcome {
                        html,
                        artifact_id,
                        message,
                        attempts,
                    });
                }
                RunState::Failure(e) => return Err(e),
            };
        }
    }

    /// Stored HTML for `id`, with a warning banner if its body is empty.
    pub async fn preview(&self, id: &str) -> Result<String, CloneError> {
        self.store.preview(id).await
    }

    async fn run_light(&self, page_url: &Url) -> Result<String, CloneError> {
        let content = self.extractor.extract(page_url).await?;
        generation::synthesize(self.generator.as_ref(), &content).await
    }

    async fn run_heavy(&self, page_url: &Url, base: &Url) -> Result<String, CloneError> {
        let _permit = self
            .render_permits
            .acquire()
            .await
            .map_err(|e| CloneError::RenderFailure(e.to_string()))?;
        let document = self.renderer.render(page_url.as_str()).await?;
        renderers::inline_rendered_document(&document, base)
    }
}

fn attempt(path: ClonePath, error: Option<&CloneError>, started: Instant) -> PathAttempt {
    PathAttempt {
        path,
        error: error.map(|e| e.kind().to_string()),
        elapsed: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticFetcher;
    use crate::renderers::RenderedDocument;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PAGE: &str = "<html><head><title>Ex</title></head><body><main><p>Hello</p></main></body></html>";

    struct StubRenderer {
        result: Result<RenderedDocument, CloneError>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl StubRenderer {
        fn new(result: Result<RenderedDocument, CloneError>) -> Self {
            Self {
                result,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn timing_out() -> Self {
            Self::new(Err(CloneError::RenderTimeout {
                url: "https://ex.com/p".to_string(),
                stage: "navigation".to_string(),
            }))
        }
    }

    #[async_trait]
    impl Renderer for StubRenderer {
        async fn render(&self, _url: &str) -> Result<RenderedDocument, CloneError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    struct StubGenerator {
        response: Result<String, CloneError>,
        prompts: Mutex<Vec<String>>,
    }

    impl StubGenerator {
        fn new(response: Result<String, CloneError>) -> Self {
            Self {
                response,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Generator for StubGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, CloneError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.response.clone()
        }
    }

    fn orchestrator(
        renderer: Arc<StubRenderer>,
        generator: Arc<StubGenerator>,
        fetcher: StaticFetcher,
    ) -> Orchestrator {
        Orchestrator::new(
            Arc::new(fetcher),
            renderer,
            generator,
            Arc::new(ArtifactStore::default()),
            5,
            2,
        )
    }

    fn page_fetcher() -> StaticFetcher {
        StaticFetcher::new().with("https://ex.com/p", PAGE)
    }

    #[tokio::test]
    async fn test_heavy_timeout_falls_back_to_light() {
        let renderer = Arc::new(StubRenderer::timing_out());
        let generator = Arc::new(StubGenerator::new(Ok(
            "```html\n<!DOCTYPE html><html><body>Clone</body></html>\n```".to_string(),
        )));
        let orch = orchestrator(renderer.clone(), generator.clone(), page_fetcher());

        let outcome = orch
            .clone_site(&CloneRequest::new("https://ex.com/p", false))
            .await
            .unwrap();

        assert_eq!(outcome.html, "<!DOCTYPE html><html><body>Clone</body></html>");
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.attempts[0].path, ClonePath::Heavy);
        assert_eq!(outcome.attempts[0].error.as_deref(), Some("render_timeout"));
        assert_eq!(outcome.attempts[1].path, ClonePath::Light);
        assert_eq!(outcome.attempts[1].error, None);
        assert!(outcome.message.contains("Browser render failed"));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(generator.prompts.lock().unwrap().len(), 1);
        assert_eq!(orch.store().get(&outcome.artifact_id).await.unwrap(), outcome.html);
    }

    #[tokio::test]
    async fn test_light_flag_skips_renderer() {
        let renderer = Arc::new(StubRenderer::timing_out());
        let generator = Arc::new(StubGenerator::new(Ok("<!DOCTYPE html><p>x</p>".to_string())));
        let orch = orchestrator(renderer.clone(), generator.clone(), page_fetcher());

        let outcome = orch
            .clone_site(&CloneRequest::new("https://ex.com/p", true))
            .await
            .unwrap();

        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.attempts.len(), 1);
        assert!(generator.prompts.lock().unwrap()[0].contains("\"title\": \"Ex\""));
    }

    #[tokio::test]
    async fn test_heavy_success_is_post_processed_and_stored() {
        let renderer = Arc::new(StubRenderer::new(Ok(RenderedDocument {
            html: "<html><head></head><body><img src=\"/a.png\">Hi</body></html>".to_string(),
            stylesheets: vec![".x{color:red}".to_string()],
        })));
        let generator = Arc::new(StubGenerator::new(Err(CloneError::EmptyGeneration)));
        let orch = orchestrator(renderer, generator.clone(), StaticFetcher::new());

        let outcome = orch
            .clone_site(&CloneRequest::new("https://ex.com/p", false))
            .await
            .unwrap();

        assert!(outcome.html.starts_with("<!DOCTYPE html>"));
        assert!(outcome.html.contains(".x{color:red}"));
        assert!(outcome.html.contains("src=\"https://ex.com/a.png\""));
        assert_eq!(outcome.attempts.len(), 1);
        assert!(generator.prompts.lock().unwrap().is_empty());
        assert_eq!(orch.preview(&outcome.artifact_id).await.unwrap(), outcome.html);
    }

    #[tokio::test]
    async fn test_failure_after_fallback_surfaces_light_error() {
        let renderer = Arc::new(StubRenderer::new(Err(CloneError::RenderFailure(
            "crashed".to_string(),
        ))));
        let generator = Arc::new(StubGenerator::new(Err(CloneError::RateLimited(
            "HTTP 429".to_string(),
        ))));
        let orch = orchestrator(renderer.clone(), generator, page_fetcher());

        let err = orch
            .clone_site(&CloneRequest::new("https://ex.com/p", false))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "rate_limited");
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        assert!(orch.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_light_failure_is_terminal() {
        let renderer = Arc::new(StubRenderer::timing_out());
        let generator = Arc::new(StubGenerator::new(Ok("no doctype here".to_string())));
        let orch = orchestrator(renderer.clone(), generator, page_fetcher());

        let err = orch
            .clone_site(&CloneRequest::new("https://ex.com/p", true))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "invalid_generation");
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_up_front() {
        let renderer = Arc::new(StubRenderer::timing_out());
        let generator = Arc::new(StubGenerator::new(Ok("<!DOCTYPE html>".to_string())));
        let orch = orchestrator(renderer.clone(), generator, page_fetcher());

        let err = orch
            .clone_site(&CloneRequest::new("not a url", false))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "invalid_url");
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_heavy_runs_are_bounded() {
        let renderer = Arc::new(StubRenderer::new(Ok(RenderedDocument {
            html: "<html><body>ok</body></html>".to_string(),
            stylesheets: Vec::new(),
        })));
        let generator = Arc::new(StubGenerator::new(Err(CloneError::EmptyGeneration)));
        let orch = Arc::new(orchestrator(renderer.clone(), generator, StaticFetcher::new()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let orch = Arc::clone(&orch);
            handles.push(tokio::spawn(async move {
                orch.clone_site(&CloneRequest::new("https://ex.com/p", false))
                    .await
                    .map(|o| o.artifact_id)
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.sort();
        ids.dedup();

        assert_eq!(ids.len(), 8);
        assert!(renderer.max_in_flight.load(Ordering::SeqCst) <= 2);
    }
}
