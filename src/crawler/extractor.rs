//! HTML cleaning and link extraction
//!
//! This module turns a raw payload into:
//! - Cleaned main-content text (boilerplate, scripts and navigation removed)
//! - Links to follow within the site

use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Elements whose whole subtree is dropped before text extraction
const DROPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "svg", "nav", "header", "footer",
    "aside", "form", "button", "select", "head",
];

/// Class or id fragments that mark boilerplate containers
const BOILERPLATE_MARKERS: &[&str] = &[
    "cookie", "banner", "sidebar", "navbar", "menu", "breadcrumb", "footer", "header",
    "share", "social", "advert", "popup", "newsletter",
];

/// Elements that end a line of text
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "td", "th",
    "table", "section", "article", "main", "blockquote", "pre", "dd", "dt", "figcaption",
];

/// Capability to clean a payload into text and find its outgoing links
pub trait Extractor: Send + Sync {
    /// Returns main-content text with boilerplate removed
    fn clean(&self, raw: &[u8]) -> String;

    /// Returns absolute http(s) links found in the payload
    fn links(&self, raw: &[u8], base_url: &Url) -> Vec<Url>;
}

/// Extractor built on the scraper HTML parser
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for HtmlExtractor {
    /// # Example
    ///
    /// ```
    /// use corpus_harvest::crawler::{Extractor, HtmlExtractor};
    ///
    /// let html = b"<html><body><nav>Home About</nav><p>Hello   world</p></body></html>";
    /// assert_eq!(HtmlExtractor::new().clean(html), "Hello world");
    /// ```
    fn clean(&self, raw: &[u8]) -> String {
        let html = String::from_utf8_lossy(raw);
        let document = Html::parse_document(&html);

        let mut text = String::new();
        collect_text(document.root_element(), &mut text);

        text.lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn links(&self, raw: &[u8], base_url: &Url) -> Vec<Url> {
        let html = String::from_utf8_lossy(raw);
        let document = Html::parse_document(&html);
        let mut links = Vec::new();

        if let Ok(a_selector) = Selector::parse("a[href]") {
            for element in document.select(&a_selector) {
                // Skip if it has the download attribute
                if element.value().attr("download").is_some() {
                    continue;
                }

                if let Some(href) = element.value().attr("href") {
                    if let Some(absolute_url) = resolve_link(href, base_url) {
                        links.push(absolute_url);
                    }
                }
            }
        }

        links
    }
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if DROPPED_ELEMENTS.contains(&name) || is_boilerplate(element) {
        return;
    }

    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            collect_text(child_element, out);
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }

    if BLOCK_ELEMENTS.contains(&name) {
        out.push('\n');
    } else {
        out.push(' ');
    }
}

fn is_boilerplate(element: ElementRef<'_>) -> bool {
    let value = element.value();
    let marked = |token: &str| {
        let token = token.to_ascii_lowercase();
        BOILERPLATE_MARKERS.iter().any(|marker| token.contains(marker))
    };

    value.classes().any(marked) || value.id().map(marked).unwrap_or(false)
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    // Same-page anchors
    if href.starts_with('#') {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
        Some(absolute_url)
    } else {
        None
    }
}
