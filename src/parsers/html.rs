use crate::resolver;
use crate::results::{IconAsset, ImageAsset, Meta, Structure};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Everything the light path needs from a single parsed document.
///
/// Owned so the (non-`Send`) DOM can be dropped before any further awaits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    pub title: String,
    pub meta: Meta,
    pub structure: Structure,
    /// Raw text of each `<style>` element
    pub inline_styles: Vec<String>,
    /// Raw hrefs of `<link rel="stylesheet">` elements
    pub stylesheet_links: Vec<String>,
    pub images: Vec<ImageAsset>,
    pub icons: Vec<IconAsset>,
    pub scripts: Vec<String>,
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

/// Parses HTML and collects structure, metadata and asset references,
/// resolving every asset URL against `base`.
pub fn parse_page(html: &str, base: &Url) -> ParsedPage {
    let doc = Html::parse_document(html);

    let page = ParsedPage {
        title: extract_title(&doc),
        meta: extract_meta(&doc),
        structure: extract_structure(&doc),
        inline_styles: extract_inline_styles(&doc),
        stylesheet_links: extract_stylesheet_links(&doc),
        images: extract_images(&doc, base),
        icons: extract_icons(&doc, base),
        scripts: extract_scripts(&doc, base),
    };

    ::log::debug!(
        "HTML parser found {} styles, {} stylesheet links, {} images, {} icons, {} scripts",
        page.inline_styles.len(),
        page.stylesheet_links.len(),
        page.images.len(),
        page.icons.len(),
        page.scripts.len()
    );

    page
}

fn extract_title(doc: &Html) -> String {
    doc.select(&selector("title"))
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn extract_meta(doc: &Html) -> Meta {
    let mut meta = Meta::default();

    for element in doc.select(&selector("meta")) {
        let attrs = element.value();
        if let Some(charset) = attrs.attr("charset").map(str::trim) {
            if !charset.is_empty() {
                meta.charset = charset.to_string();
            }
            continue;
        }

        let Some(name) = attrs.attr("name") else {
            continue;
        };
        let content = attrs
            .attr("content")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        match name.trim().to_ascii_lowercase().as_str() {
            "description" if meta.description.is_none() => meta.description = content,
            "viewport" if meta.viewport.is_none() => meta.viewport = content,
            _ => {}
        }
    }

    meta
}

/// Text of the element with markup removed, trimmed.
fn visible_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_with_text(doc: &Html, tag: &str) -> Option<String> {
    doc.select(&selector(tag))
        .next()
        .filter(|e| !visible_text(e).is_empty())
        .map(|e| e.html())
}

fn extract_structure(doc: &Html) -> Structure {
    Structure {
        header: first_with_text(doc, "header"),
        nav: first_with_text(doc, "nav"),
        main: first_with_text(doc, "main").or_else(|| first_with_text(doc, "body")),
        footer: first_with_text(doc, "footer"),
    }
}

fn extract_inline_styles(doc: &Html) -> Vec<String> {
    doc.select(&selector("style"))
        .map(|s| s.text().collect::<String>())
        .filter(|css| !css.trim().is_empty())
        .collect()
}

fn rel_contains(element: &ElementRef, needle: &str) -> bool {
    element
        .value()
        .attr("rel")
        .map(|rel| rel.to_ascii_lowercase().contains(needle))
        .unwrap_or(false)
}

fn extract_stylesheet_links(doc: &Html) -> Vec<String> {
    doc.select(&selector("link[href]"))
        .filter(|link| {
            link.value()
                .attr("rel")
                .map(|rel| {
                    rel.split_ascii_whitespace()
                        .any(|token| token.eq_ignore_ascii_case("stylesheet"))
                })
                .unwrap_or(false)
        })
        .filter_map(|link| link.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string)
        .collect()
}

fn attr_or_empty(element: &ElementRef, name: &str) -> String {
    element.value().attr(name).unwrap_or_default().to_string()
}

fn extract_images(doc: &Html, base: &Url) -> Vec<ImageAsset> {
    doc.select(&selector("img[src]"))
        .filter_map(|img| {
            let src = resolver::absolutize(img.value().attr("src")?, base)?;
            Some(ImageAsset {
                src,
                alt: attr_or_empty(&img, "alt"),
                classes: img
                    .value()
                    .attr("class")
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
                id: attr_or_empty(&img, "id"),
                style: attr_or_empty(&img, "style"),
            })
        })
        .collect()
}

fn extract_icons(doc: &Html, base: &Url) -> Vec<IconAsset> {
    doc.select(&selector("link[rel][href]"))
        .filter(|link| rel_contains(link, "icon"))
        .filter_map(|link| {
            let href = resolver::absolutize(link.value().attr("href")?, base)?;
            Some(IconAsset {
                href,
                kind: attr_or_empty(&link, "type"),
                sizes: attr_or_empty(&link, "sizes"),
            })
        })
        .collect()
}

fn extract_scripts(doc: &Html, base: &Url) -> Vec<String> {
    doc.select(&selector("script[src]"))
        .filter_map(|script| resolver::absolutize(script.value().attr("src")?, base))
        .collect()
}
