use crate::error::CloneError;
use crate::fetch::{FetchPool, Fetcher};
use crate::parsers::css::{self, CssRuleMap};
use crate::parsers::html::{self, ParsedPage};
use crate::resolver;
use crate::results::{Assets, CssFile, WebsiteContent};
use crate::stylesheets::CssExtractor;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};
use url::Url;

static FONT_FAMILY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)font-family:\s*([^;}]+)").unwrap());

/// Builds a `WebsiteContent` from a live page without running a browser.
pub struct ContentExtractor {
    fetcher: Arc<dyn Fetcher>,
    css: CssExtractor,
    pool: FetchPool,
}

impl ContentExtractor {
    pub fn new(fetcher: Arc<dyn Fetcher>, max_concurrent_fetches: usize) -> Self {
        Self {
            css: CssExtractor::new(Arc::clone(&fetcher)),
            pool: FetchPool::new(Arc::clone(&fetcher), max_concurrent_fetches),
            fetcher,
        }
    }

    /// Fetches `page_url` and extracts structure, styles and assets from it.
    ///
    /// Only a failure to fetch the page itself is an error; stylesheet and
    /// import failures just leave those resources out.
    pub async fn extract(&self, page_url: &Url) -> Result<WebsiteContent, CloneError> {
        let base = resolver::base_url(page_url)?;
        let html = self.fetcher.fetch_text(page_url.as_str()).await?;

        let page = html::parse_page(&html, &base);
        ::log::info!(
            "Parsed {}: {} inline styles, {} stylesheet links",
            page_url,
            page.inline_styles.len(),
            page.stylesheet_links.len()
        );

        let mut inline_rules = Vec::with_capacity(page.inline_styles.len());
        for style in &page.inline_styles {
            let rules = self.css.extract(style, &base).await;
            if !rules.is_empty() {
                inline_rules.push(rules);
            }
        }

        let mut sheets = Vec::new();
        for resource in self.pool.fetch_all(&page.stylesheet_links, &base).await {
            let rules = self.css.extract_resource(&resource, &base).await;
            sheets.push((resource.url, rules));
        }

        Ok(normalize(page, inline_rules, sheets, &base))
    }
}

/// Assembles the final bundle from a parsed page and its extracted CSS.
pub fn normalize(
    page: ParsedPage,
    inline_rules: Vec<CssRuleMap>,
    sheets: Vec<(String, CssRuleMap)>,
    base: &Url,
) -> WebsiteContent {
    let all_rules = inline_rules.iter().chain(sheets.iter().map(|(_, r)| r));
    let mut fonts = BTreeSet::new();
    let mut backgrounds = BTreeSet::new();

    for rules in all_rules {
        for block in rules.blocks() {
            collect_fonts(block, &mut fonts);
            collect_backgrounds(block, base, &mut backgrounds);
        }
    }

    WebsiteContent {
        title: page.title,
        meta: page.meta,
        structure: page.structure,
        styles: inline_rules.iter().map(CssRuleMap::to_css).collect(),
        css_files: sheets
            .into_iter()
            .map(|(url, rules)| CssFile {
                url,
                content: rules.to_css(),
            })
            .collect(),
        assets: Assets {
            images: page.images,
            icons: page.icons,
            scripts: page.scripts,
            fonts: fonts.into_iter().collect(),
            background_images: backgrounds.into_iter().collect(),
        },
    }
}

fn collect_fonts(block: &str, fonts: &mut BTreeSet<String>) {
    for caps in FONT_FAMILY.captures_iter(block) {
        let family = caps[1].trim();
        if !family.is_empty() {
            fonts.insert(family.to_string());
        }
    }
}

fn collect_backgrounds(block: &str, base: &Url, backgrounds: &mut BTreeSet<String>) {
    for url in css::collect_urls(block) {
        if let Some(absolute) = resolver::absolutize(&url, base) {
            backgrounds.insert(absolute);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticFetcher;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><head>
<title>Example</title>
<meta name="description" content="An example">
<link rel="stylesheet" href="/css/a.css">
<link rel="stylesheet" href="/css/missing.css">
<link rel="stylesheet" href="https://cdn.ex.net/b.css">
<link rel="icon" href="/favicon.ico">
<style>
@import url(/css/base.css);
.hero { background: url(/img/hero.jpg); font-family: Inter, sans-serif; }
.card { background: url("/img/hero.jpg"); font-family: Inter, sans-serif }
</style>
</head><body>
<header><h1>Example</h1></header>
<nav></nav>
<main><img src="/logo.png"><p>Content</p></main>
<script src="/app.js"></script>
</body></html>"#;

    fn fetcher() -> StaticFetcher {
        StaticFetcher::new()
            .with("https://ex.com/p", PAGE)
            .with("https://ex.com/css/base.css", "html{font-family: Inter, sans-serif;}")
            .with("https://ex.com/css/a.css", ".a{background:url(../img/a.png)}")
            .with("https://cdn.ex.net/b.css", ".b{font-family: Mono}")
    }

    #[tokio::test]
    async fn test_light_extraction_end_to_end() {
        let extractor = ContentExtractor::new(Arc::new(fetcher()), 5);
        let page_url = Url::parse("https://ex.com/p").unwrap();

        let content = extractor.extract(&page_url).await.unwrap();

        assert_eq!(content.title, "Example");
        assert_eq!(content.meta.description.as_deref(), Some("An example"));
        assert!(content.structure.header.is_some());
        assert!(content.structure.nav.is_none());
        assert!(content.structure.main.is_some());

        assert_eq!(content.styles.len(), 1);
        assert!(content.styles[0].starts_with("html{font-family: Inter, sans-serif;}"));

        let mut files: Vec<_> = content.css_files.iter().map(|f| f.url.as_str()).collect();
        files.sort();
        assert_eq!(files, vec!["https://cdn.ex.net/b.css", "https://ex.com/css/a.css"]);

        assert_eq!(content.assets.images[0].src, "https://ex.com/logo.png");
        assert_eq!(content.assets.icons[0].href, "https://ex.com/favicon.ico");
        assert_eq!(content.assets.scripts, vec!["https://ex.com/app.js"]);
        assert_eq!(content.assets.fonts, vec!["Inter, sans-serif", "Mono"]);
        assert_eq!(
            content.assets.background_images,
            vec!["https://ex.com/img/a.png", "https://ex.com/img/hero.jpg"]
        );
    }

    #[tokio::test]
    async fn test_page_fetch_failure_is_an_error() {
        let extractor = ContentExtractor::new(Arc::new(StaticFetcher::new()), 5);
        let page_url = Url::parse("https://ex.com/p").unwrap();

        let err = extractor.extract(&page_url).await.unwrap_err();

        assert_eq!(err.kind(), "fetch_unavailable");
    }

    #[test]
    fn test_normalize_deduplicates_fonts_and_backgrounds() {
        let base = Url::parse("https://ex.com/").unwrap();
        let mut first = CssRuleMap::new();
        first.insert(".x", "font-family: Arial; background: url(/bg.png)");
        first.insert(".y", "font-family:Arial;background:url(https://ex.com/bg.png)");
        let mut second = CssRuleMap::new();
        second.insert(".z", "font-family:   Arial ; background: url(data:image/png;base64,AA)");

        let content = normalize(
            ParsedPage::default(),
            vec![first, second],
            Vec::new(),
            &base,
        );

        assert_eq!(content.assets.fonts, vec!["Arial"]);
        assert_eq!(
            content.assets.background_images,
            vec!["data:image/png;base64,AA", "https://ex.com/bg.png"]
        );
        assert_eq!(content.styles.len(), 2);
    }
}
