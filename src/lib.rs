// Re-export modules
pub mod config;
pub mod error;
pub mod fetch;
pub mod generation;
pub mod normalizer;
pub mod orchestrator;
pub mod parsers;
pub mod renderers;
pub mod resolver;
pub mod results;
pub mod store;
pub mod stylesheets;

// Re-export commonly used types for convenience
pub use error::CloneError;
pub use orchestrator::{CloneOutcome, CloneRequest, ClonePath, Orchestrator};
pub use results::WebsiteContent;

use config::ClonerConfig;
use fetch::{Fetcher, HttpFetcher};
use generation::{Generator, HttpGenerator};
use renderers::{Renderer, WebDriverRenderer};
use std::sync::Arc;
use store::ArtifactStore;

/// Main builder for a clone orchestrator
///
/// Any collaborator left unset is built from the configuration.
pub struct Cloner {
    config: ClonerConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    renderer: Option<Arc<dyn Renderer>>,
    generator: Option<Arc<dyn Generator>>,
    store: Option<Arc<ArtifactStore>>,
}

impl Default for Cloner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cloner {
    /// Create a new builder with the default configuration
    pub fn new() -> Self {
        Self {
            config: ClonerConfig::default(),
            fetcher: None,
            renderer: None,
            generator: None,
            store: None,
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: ClonerConfig) -> Self {
        self.config = config;
        self
    }

    /// Load configuration from a file
    pub fn with_config_file(self, path: impl AsRef<std::path::Path>) -> Result<Self, CloneError> {
        let config = ClonerConfig::from_file(path)?;
        Ok(self.with_config(config))
    }

    /// Load configuration from a string
    pub fn with_config_str(self, config_str: &str) -> Result<Self, CloneError> {
        let config = ClonerConfig::from_json(config_str)?;
        Ok(self.with_config(config))
    }

    /// Set the maximum number of concurrent stylesheet fetches
    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.config.max_concurrent_fetches = max;
        self
    }

    /// Set the WebDriver server used for browser renders
    pub fn with_webdriver_url(mut self, url: &str) -> Self {
        self.config.webdriver_url = url.to_string();
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_store(mut self, store: Arc<ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &ClonerConfig {
        &self.config
    }

    /// Build the orchestrator
    pub fn build(self) -> Result<Orchestrator, CloneError> {
        let config = self.config;

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::from_config(&config)?),
        };
        let renderer: Arc<dyn Renderer> = match self.renderer {
            Some(renderer) => renderer,
            None => Arc::new(WebDriverRenderer::from_config(&config)),
        };
        let generator: Arc<dyn Generator> = match self.generator {
            Some(generator) => generator,
            None => Arc::new(HttpGenerator::from_config(&config)?),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(ArtifactStore::from_config(&config)));

        ::log::debug!(
            "Building orchestrator (fetches: {}, renders: {}, webdriver: {})",
            config.max_concurrent_fetches,
            config.max_concurrent_renders,
            config.webdriver_url
        );

        Ok(Orchestrator::new(
            fetcher,
            renderer,
            generator,
            store,
            config.max_concurrent_fetches,
            config.max_concurrent_renders,
        ))
    }
}
