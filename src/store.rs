use crate::config::ClonerConfig;
use crate::error::CloneError;
use chrono::{DateTime, Utc};
use crate::parsers::dom;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Id of the warning inserted at the top of previews whose body has nothing visible.
pub const EMPTY_BODY_BANNER_ID: &str = "site-clone-empty-warning";

const EMPTY_BODY_BANNER_STYLE: &str = "padding:12px;background:#fff3cd;color:#664d03;\
border:1px solid #ffecb5;font-family:sans-serif;";

const EMPTY_BODY_BANNER_TEXT: &str = "Warning: the generated page has no visible content.";

/// A generated HTML document kept for later retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub id: String,
    pub html: String,
    pub created_at: DateTime<Utc>,
}

/// Concurrent in-memory store of generated documents.
///
/// Entries expire after `ttl` (if set) and the oldest entries are evicted once
/// more than `max_entries` are held.
pub struct ArtifactStore {
    artifacts: RwLock<HashMap<String, Artifact>>,
    ttl: Option<Duration>,
    max_entries: usize,
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::from_config(&ClonerConfig::default())
    }
}

impl ArtifactStore {
    pub fn new(ttl: Option<Duration>, max_entries: usize) -> Self {
        Self {
            artifacts: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &ClonerConfig) -> Self {
        Self::new(config.artifact_ttl(), config.max_artifacts)
    }

    fn is_expired(&self, artifact: &Artifact, now: DateTime<Utc>) -> bool {
        match self.ttl {
            Some(ttl) => now
                .signed_duration_since(artifact.created_at)
                .to_std()
                .is_ok_and(|age| age >= ttl),
            None => false,
        }
    }

    /// Stores `html` under a fresh id and returns the id.
    pub async fn put(&self, html: impl Into<String>) -> String {
        let now = Utc::now();
        let artifact = Artifact {
            id: Uuid::new_v4().to_string(),
            html: html.into(),
            created_at: now,
        };
        let id = artifact.id.clone();

        let mut artifacts = self.artifacts.write().await;
        artifacts.retain(|_, a| !self.is_expired(a, now));
        while artifacts.len() >= self.max_entries {
            let oldest = artifacts
                .values()
                .min_by_key(|a| a.created_at)
                .map(|a| a.id.clone());
            match oldest {
                Some(oldest) => {
                    ::log::debug!("Evicting artifact {}", oldest);
                    artifacts.remove(&oldest);
                }
                None => break,
            }
        }
        artifacts.insert(id.clone(), artifact);

        ::log::debug!("Stored artifact {} ({} held)", id, artifacts.len());
        id
    }

    /// Returns the stored artifact, or `ArtifactNotFound` for unknown or expired ids.
    pub async fn artifact(&self, id: &str) -> Result<Artifact, CloneError> {
        let artifacts = self.artifacts.read().await;
        artifacts
            .get(id)
            .filter(|a| !self.is_expired(a, Utc::now()))
            .cloned()
            .ok_or_else(|| CloneError::ArtifactNotFound(id.to_string()))
    }

    pub async fn get(&self, id: &str) -> Result<String, CloneError> {
        self.artifact(id).await.map(|a| a.html)
    }

    /// Returns the stored HTML for display, adding a warning banner when its
    /// body has no visible content.
    pub async fn preview(&self, id: &str) -> Result<String, CloneError> {
        let html = self.get(id).await?;
        if has_visible_body(&html) {
            return Ok(html);
        }

        ::log::warn!("Artifact {} has an empty body; adding warning banner", id);
        with_empty_body_banner(&html)
    }

    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Inserts the warning banner as the first child of `<body>`, which the parser
/// creates when the document has none.
fn with_empty_body_banner(html: &str) -> Result<String, CloneError> {
    let document = dom::parse_dom(html);
    if let Some(body) = dom::find_elements(&document.document, "body").into_iter().next() {
        let banner = dom::new_element(
            &document,
            "div",
            &[("id", EMPTY_BODY_BANNER_ID), ("style", EMPTY_BODY_BANNER_STYLE)],
            EMPTY_BODY_BANNER_TEXT,
        );
        dom::prepend_child(&body, banner);
    }
    dom::serialize_dom(&document)
        .map_err(|e| CloneError::MalformedContent(format!("serializing preview: {}", e)))
}

/// True when the body has non-whitespace text or embedded media.
fn has_visible_body(html: &str) -> bool {
    let doc = Html::parse_document(html);
    let Ok(body) = Selector::parse("body") else {
        return true;
    };
    let Ok(media) = Selector::parse("img, svg, video, canvas, picture, iframe, object, embed")
    else {
        return true;
    };

    doc.select(&body).next().is_some_and(|body| {
        let text = body
            .descendants()
            .filter_map(|node| {
                let parent_is_code = node
                    .parent()
                    .and_then(|p| p.value().as_element())
                    .map(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
                    .unwrap_or(false);
                if parent_is_code {
                    None
                } else {
                    node.value().as_text().map(|t| t.to_string())
                }
            })
            .collect::<String>();
        !text.trim().is_empty() || body.select(&media).next().is_some()
    })
}
