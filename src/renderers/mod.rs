pub mod renderer;
pub mod webdriver;

pub use renderer::{RenderedDocument, Renderer};
pub use webdriver::WebDriverRenderer;

use crate::error::CloneError;
use crate::parsers::dom;
use crate::resolver;
use url::Url;

/// Appended after the captured styles of every rendered clone.
pub const BASELINE_RESET: &str = "*, *::before, *::after { box-sizing: border-box; }\n\
body { margin: 0; }\n\
img { max-width: 100%; height: auto; }";

/// Turns a rendered document into a standalone page.
///
/// Captured stylesheets and the baseline reset are inlined into `<head>`,
/// `<img src>` values are made absolute against `base`, and a doctype is added
/// when missing.
pub fn inline_rendered_document(doc: &RenderedDocument, base: &Url) -> Result<String, CloneError> {
    let document = dom::parse_dom(&doc.html);

    for img in dom::find_elements(&document.document, "img") {
        let Some(src) = dom::get_attr(&img, "src") else {
            continue;
        };
        if let Some(absolute) = resolver::absolutize(&src, base) {
            if absolute != src {
                dom::set_attr(&img, "src", &absolute);
            }
        }
    }

    let mut css = doc
        .stylesheets
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if !css.is_empty() {
        css.push('\n');
    }
    css.push_str(BASELINE_RESET);

    // the parser always creates a head
    if let Some(head) = dom::find_elements(&document.document, "head").into_iter().next() {
        let style = dom::new_element(&document, "style", &[], &format!("\n{}\n", css));
        dom::append_child(&head, style);
    }

    let mut html = dom::serialize_dom(&document)
        .map_err(|e| CloneError::MalformedContent(format!("serializing rendered document: {}", e)))?;
    if !html.trim_start().to_ascii_lowercase().starts_with("<!doctype") {
        html.insert_str(0, "<!DOCTYPE html>\n");
    }
    Ok(html)
}
