use crate::error::CloneError;
use url::Url;

/// Parses an inbound page URL, requiring an absolute http(s) URL with a host.
pub fn parse_page_url(raw: &str) -> Result<Url, CloneError> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(CloneError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                other, raw
            )));
        }
    }
    if url.host_str().is_none() {
        return Err(CloneError::InvalidUrl(format!("missing host in {}", raw)));
    }
    Ok(url)
}

/// Reduces a page URL to `scheme://host[:port]/`.
pub fn base_url(page: &Url) -> Result<Url, CloneError> {
    let origin = page.origin();
    if !origin.is_tuple() {
        return Err(CloneError::InvalidUrl(format!("opaque origin for {}", page)));
    }
    Ok(Url::parse(&origin.ascii_serialization())?)
}

/// True for references that are passed through untouched.
pub fn is_absolute(reference: &str) -> bool {
    let lower = reference.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:")
}

/// Resolves `reference` against `base`.
///
/// Absolute http(s) and `data:` references are returned unchanged, which keeps the
/// operation idempotent. Returns `None` for references that cannot be resolved to
/// anything usable, so callers can drop them instead of leaking a relative URL.
pub fn absolutize(reference: &str, base: &Url) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    if is_absolute(reference) {
        return Some(reference.to_string());
    }

    match base.join(reference) {
        Ok(joined) if joined.host_str().is_some() => Some(joined.to_string()),
        Ok(joined) => {
            ::log::debug!("Dropping hostless reference {} -> {}", reference, joined);
            None
        }
        Err(e) => {
            ::log::debug!("Could not resolve {} against {}: {}", reference, base, e);
            None
        }
    }
}
