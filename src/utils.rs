use url::Url;

/// Canonical form used for frontier membership.
///
/// Scheme and host are already lowercased by the `url` parser, which also drops
/// default ports. On top of that the fragment is removed, and a trailing slash
/// is stripped from every path except the root.
pub fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    let path = normalized.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed }.to_string();
        normalized.set_path(&trimmed);
    }

    normalized
}

/// Lowercased extension of the last path segment, if it has one
pub fn path_extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
