//! Hyperlink and title extraction from fetched HTML

use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

use crate::crawler::content;
use crate::models::PageAnalysis;
use crate::utils::normalize_whitespace;

// Helper macro to parse selectors safely at compile time
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    static ref LINK: Selector = parse_selector!("a[href], area[href]");
    static ref TITLE: Selector = parse_selector!("title");
    static ref BASE: Selector = parse_selector!("base[href]");
    static ref IMG: Selector = parse_selector!("img[alt]");
}

/// Schemes that never lead to a crawlable page
const NON_NAVIGATIONAL: &[&str] = &["mailto:", "javascript:", "tel:"];

/// One outbound link as written in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    /// Raw `href` value (trimmed, unresolved)
    pub href: String,
    /// Link text, `title` attribute or image alt text
    pub text: Option<String>,
}

/// Everything the crawler needs from one HTML page
#[derive(Debug, Clone)]
pub struct PageLinks {
    pub title: Option<String>,
    /// Base for resolving relative links (`<base href>` or the page URL)
    pub base: Url,
    /// Links in document order, first occurrence of each href only
    pub links: Vec<ExtractedLink>,
    pub analysis: PageAnalysis,
}

/// Pulls hyperlink targets out of anchor-like elements
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkExtractor;

impl LinkExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse `html` once and return its title, base, outbound links and
    /// content analysis
    pub fn extract(&self, html: &str, page_url: &Url) -> PageLinks {
        let document = Html::parse_document(html);

        let base = document
            .select(&BASE)
            .next()
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| page_url.join(href.trim()).ok())
            .unwrap_or_else(|| page_url.clone());

        let mut seen = HashSet::new();
        let links = document
            .select(&LINK)
            .filter_map(|el| {
                let href = el.value().attr("href")?.trim();
                if !is_navigational(href) || !seen.insert(href.to_string()) {
                    return None;
                }
                Some(ExtractedLink {
                    href: href.to_string(),
                    text: link_text(&el),
                })
            })
            .collect();

        PageLinks {
            title: title_of(&document),
            analysis: content::analyze(&document, &base),
            base,
            links,
        }
    }

    /// Raw hyperlink targets of `html`, in document order
    pub fn extract_links(&self, html: &str, page_url: &Url) -> Vec<String> {
        self.extract(html, page_url)
            .links
            .into_iter()
            .map(|link| link.href)
            .collect()
    }

    /// Contents of the `<title>` element, whitespace-normalized
    pub fn extract_title(&self, html: &str) -> Option<String> {
        title_of(&Html::parse_document(html))
    }
}

fn title_of(document: &Html) -> Option<String> {
    document
        .select(&TITLE)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Label for a link: its text, else its title attribute, else an image alt
fn link_text(el: &ElementRef<'_>) -> Option<String> {
    let text = normalize_whitespace(&el.text().collect::<String>());
    if !text.is_empty() {
        return Some(text);
    }

    if let Some(title) = el.value().attr("title").map(normalize_whitespace) {
        if !title.is_empty() {
            return Some(title);
        }
    }

    el.select(&IMG)
        .filter_map(|img| img.value().attr("alt"))
        .map(normalize_whitespace)
        .find(|alt| !alt.is_empty())
}

fn is_navigational(href: &str) -> bool {
    if href.is_empty() || href.starts_with('#') {
        return false;
    }
    let lower = href.to_ascii_lowercase();
    !NON_NAVIGATIONAL.iter().any(|scheme| lower.starts_with(scheme))
}
