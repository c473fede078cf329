//! Locator canonicalization before any blob request.

use glimmer_core::RemoteError;

/// Canonicalize an asset locator.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require an absolute http(s) URL
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (signed CDN URLs depend on it)
pub fn canonicalize(input: &str) -> Result<url::Url, RemoteError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(RemoteError::InvalidLocator("empty locator".into()));
    }

    let mut parsed = url::Url::parse(trimmed).map_err(|e| RemoteError::InvalidLocator(format!("{trimmed}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(RemoteError::InvalidLocator(format!("unsupported scheme: {scheme}"))),
    }

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        parsed
            .set_host(Some(&lowered))
            .map_err(|e| RemoteError::InvalidLocator(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}
