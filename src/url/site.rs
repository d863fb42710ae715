use crate::{UrlError, UrlResult};
use url::Url;

/// Returns the canonical site id (lowercased host) that owns a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use corpus_harvest::url::site_id_for;
///
/// let url = Url::parse("https://Docs.Example.COM/guide").unwrap();
/// assert_eq!(site_id_for(&url).unwrap(), "docs.example.com");
/// ```
pub fn site_id_for(url: &Url) -> UrlResult<String> {
    url.host_str()
        .map(|h| h.to_lowercase())
        .ok_or(UrlError::MissingHost)
}

/// Checks whether a URL is served by the given site
///
/// Only the host is compared; scheme and port may differ.
pub fn belongs_to_site(url: &Url, site_id: &str) -> bool {
    site_id_for(url).map(|id| id == site_id).unwrap_or(false)
}
