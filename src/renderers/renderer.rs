use crate::error::CloneError;
use async_trait::async_trait;

/// A page as seen by a real browser after scripts have run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedDocument {
    /// Serialized DOM
    pub html: String,
    /// Text of every stylesheet the browser could read, in document order
    pub stylesheets: Vec<String>,
}

// Define a base trait for renderers
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Load `url` in a browser and capture the resulting document.
    ///
    /// Implementations report navigation or load-state timeouts as
    /// `CloneError::RenderTimeout` and everything else as `RenderFailure`.
    async fn render(&self, url: &str) -> Result<RenderedDocument, CloneError>;
}
