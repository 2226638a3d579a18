use crate::config::ClonerConfig;
use crate::error::CloneError;
use crate::results::WebsiteContent;
use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::sync::LazyLock;
use std::time::Duration;

static FENCE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_-]*[ \t]*\r?\n?").unwrap());
static EXTRA_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

const INSTRUCTIONS: &str = "You are an expert web developer. Recreate the website described below \
as a single standalone HTML document. Inline all CSS in a <style> element in the <head>, keep the \
original layout, colors, typography and imagery, and reference images by their absolute URLs. \
Respond with the HTML document only, starting with <!DOCTYPE html>.";

/// Synthesizes an HTML document from a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the raw model output for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, CloneError>;
}

/// Builds the generator prompt. Identical content always yields an identical prompt.
pub fn build_prompt(content: &WebsiteContent) -> String {
    let payload = serde_json::to_string_pretty(&content.to_payload()).unwrap_or_default();
    let css = content.combined_css();

    let mut prompt = format!("{}\n\nWebsite content:\n{}", INSTRUCTIONS, payload);
    if !css.is_empty() {
        prompt.push_str("\n\nCSS:\n");
        prompt.push_str(&css);
    }
    prompt
}

/// Cleans raw generator output and checks that it is a usable document.
pub fn finalize(raw: &str) -> Result<String, CloneError> {
    let without_fences = FENCE_LINE.replace_all(raw, "");
    let normalized = without_fences.replace("\r\n", "\n");
    let html = EXTRA_NEWLINES
        .replace_all(normalized.trim(), "\n\n")
        .into_owned();

    if html.is_empty() {
        return Err(CloneError::EmptyGeneration);
    }

    let starts_with_doctype = html
        .get(..9)
        .map(|head| head.eq_ignore_ascii_case("<!doctype"))
        .unwrap_or(false);
    if !starts_with_doctype {
        let preview: String = html.chars().take(60).collect();
        return Err(CloneError::InvalidGeneration(format!(
            "output does not start with a doctype: {:?}",
            preview
        )));
    }

    Ok(html)
}

/// Runs the generator on `content` and returns the finalized document.
pub async fn synthesize(
    generator: &dyn Generator,
    content: &WebsiteContent,
) -> Result<String, CloneError> {
    let prompt = build_prompt(content);
    ::log::debug!("Sending {} byte prompt to generator", prompt.len());
    let raw = generator.generate(&prompt).await?;
    finalize(&raw)
}

/// Decides whether a failed generator response means quota or rate exhaustion.
pub fn classify_failure(status: StatusCode, body: &str) -> CloneError {
    let lower = body.to_ascii_lowercase();
    let limited = status == StatusCode::TOO_MANY_REQUESTS
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("quota");

    let detail = format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>());
    if limited {
        CloneError::RateLimited(detail)
    } else {
        CloneError::GenerationFailed(detail)
    }
}

/// `Generator` for OpenAI-compatible chat completion endpoints.
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CloneError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CloneError::Config(format!("failed to build generator client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        })
    }

    /// Reads the API key from the environment variable named in the config.
    pub fn from_config(config: &ClonerConfig) -> Result<Self, CloneError> {
        let api_key = std::env::var(&config.generator_api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        if api_key.is_none() {
            ::log::warn!(
                "{} is not set; generator requests will be unauthenticated",
                config.generator_api_key_env
            );
        }
        Self::new(
            config.generator_endpoint.clone(),
            config.generator_model.clone(),
            api_key,
            Duration::from_secs(config.generator_timeout_secs),
        )
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, CloneError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CloneError::GenerationFailed(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CloneError::GenerationFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| CloneError::InvalidGeneration(format!("unparseable response: {}", e)))?;
        Ok(parsed["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}
