use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized model of a website, built fresh for each clone request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebsiteContent {
    /// Document title (empty if the page has none)
    pub title: String,

    pub meta: Meta,

    /// Serialized landmark sections with visible text
    pub structure: Structure,

    /// Inline `<style>` contents with imports expanded, in document order
    pub styles: Vec<String>,

    /// External stylesheets that were fetched successfully
    pub css_files: Vec<CssFile>,

    pub assets: Assets,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<String>,

    pub charset: String,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            description: None,
            viewport: None,
            charset: "UTF-8".to_string(),
        }
    }
}

/// Landmark sections of the page, each present only if it has visible text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nav: Option<String>,

    /// `<main>`, or `<body>` when there is no non-empty `<main>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

impl Structure {
    pub fn is_empty(&self) -> bool {
        self.header.is_none() && self.nav.is_none() && self.main.is_none() && self.footer.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CssFile {
    /// Absolute URL of the stylesheet
    pub url: String,

    /// Extracted rules in flat text form
    pub content: String,
}

/// Every URL in here is absolute or a `data:` URI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assets {
    pub images: Vec<ImageAsset>,
    pub icons: Vec<IconAsset>,
    pub scripts: Vec<String>,

    /// Distinct font-family values, sorted
    pub fonts: Vec<String>,

    /// Distinct background image URLs, sorted
    pub background_images: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub src: String,
    pub alt: String,
    #[serde(rename = "class")]
    pub classes: Vec<String>,
    pub id: String,
    pub style: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IconAsset {
    pub href: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sizes: String,
}

impl WebsiteContent {
    /// Serialized form handed to the generator, with empty values removed.
    pub fn to_payload(&self) -> Value {
        let raw = serde_json::to_value(self).unwrap_or(Value::Null);
        clean_empty(raw).unwrap_or_else(|| Value::Object(Default::default()))
    }

    /// All CSS text of the page: inline styles first, then external files.
    pub fn combined_css(&self) -> String {
        self.styles
            .iter()
            .map(String::as_str)
            .chain(self.css_files.iter().map(|f| f.content.as_str()))
            .filter(|css| !css.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Recursively drops empty strings, arrays, objects and nulls.
///
/// Children are cleaned first, so a container whose children were all removed
/// is itself removed. Returns `None` when nothing is left.
pub fn clean_empty(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) => {
            let items: Vec<Value> = items.into_iter().filter_map(clean_empty).collect();
            (!items.is_empty()).then_some(Value::Array(items))
        }
        Value::Object(map) => {
            let map: serde_json::Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| clean_empty(v).map(|v| (k, v)))
                .collect();
            (!map.is_empty()).then_some(Value::Object(map))
        }
        other => Some(other),
    }
}
