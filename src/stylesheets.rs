use crate::fetch::{FetchedResource, Fetcher};
use crate::parsers::css::{self, CssRuleMap};
use crate::resolver;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use url::Url;

type ExtractFuture<'a> = Pin<Box<dyn Future<Output = CssRuleMap> + Send + 'a>>;

/// Turns stylesheet text into a `CssRuleMap`, inlining `@import`ed sheets.
pub struct CssExtractor {
    fetcher: Arc<dyn Fetcher>,
}

impl CssExtractor {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Extracts an inline `<style>` block found on a page with base `base`.
    pub async fn extract(&self, text: &str, base: &Url) -> CssRuleMap {
        let mut visited = HashSet::new();
        self.extract_with_visited(text, base, &mut visited).await
    }

    /// Extracts a stylesheet fetched from its own URL; relative references
    /// inside it resolve against that URL.
    pub async fn extract_resource(&self, resource: &FetchedResource, page_base: &Url) -> CssRuleMap {
        let sheet_base = Url::parse(&resource.url).unwrap_or_else(|_| page_base.clone());
        let mut visited = HashSet::new();
        visited.insert(resource.url.clone());
        self.extract_with_visited(&resource.body, &sheet_base, &mut visited)
            .await
    }

    fn extract_with_visited<'a>(
        &'a self,
        text: &'a str,
        base: &'a Url,
        visited: &'a mut HashSet<String>,
    ) -> ExtractFuture<'a> {
        Box::pin(async move {
            let sheet = css::parse_stylesheet(text);
            let mut rules = CssRuleMap::new();

            for import in &sheet.imports {
                let Some(import_url) = resolver::absolutize(import, base) else {
                    ::log::warn!("Skipping unresolvable @import: {}", import);
                    continue;
                };
                if !visited.insert(import_url.clone()) {
                    ::log::debug!("Skipping already imported stylesheet: {}", import_url);
                    continue;
                }

                let body = match self.fetcher.fetch_text(&import_url).await {
                    Ok(body) => body,
                    Err(e) => {
                        ::log::warn!("Error fetching imported CSS: {}", e);
                        continue;
                    }
                };

                let import_base = Url::parse(&import_url).unwrap_or_else(|_| base.clone());
                let imported = self
                    .extract_with_visited(&body, &import_base, visited)
                    .await;
                ::log::debug!(
                    "Imported {} rules from {}",
                    imported.len(),
                    import_url
                );
                rules.extend(imported);
            }

            rules.extend(css::rule_map(&sheet, base));
            rules
        })
    }
}
