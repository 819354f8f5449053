//! Content extraction from HTML
//!
//! Strips boilerplate (navigation, ads, sidebars) and returns the main
//! article body as plain text, plus metadata, links, and structured data
//! (JSON-LD and schema.org microdata).

mod metadata;
pub mod pdf;
mod structured;
mod text;

pub use pdf::{PdfDocument, PdfError, PdfExtractor};

use scraper::{Html, Selector};
use std::collections::HashMap;
use url::Url;

use crate::fetch::{ExtractedLink, PageMetadata, StructuredData};
use crate::util::{collapse_whitespace, truncate_to_bytes};

/// Maximum length of link text kept per anchor
const MAX_LINK_TEXT: usize = 200;

/// Content extractor with pre-compiled selectors
pub struct ContentExtractor {
    /// Selectors for finding main content, in priority order
    content_selectors: Vec<Selector>,
    /// Maps meta name → (name selector, property selector)
    meta_selectors: HashMap<&'static str, (Option<Selector>, Option<Selector>)>,
    anchor_selector: Selector,
}

impl ContentExtractor {
    pub fn new() -> Self {
        let content_selectors: Vec<Selector> = [
            "article",
            "main",
            "[role='main']",
            ".post-content",
            ".article-content",
            ".entry-content",
            ".content",
            "#content",
        ]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect();

        let meta_names = [
            "og:title",
            "og:description",
            "og:image",
            "og:url",
            "og:locale",
            "twitter:title",
            "twitter:description",
            "title",
            "description",
            "author",
            "language",
            "article:published_time",
            "date",
            "pubdate",
            "publishdate",
        ];

        let mut meta_selectors = HashMap::with_capacity(meta_names.len());
        for name in meta_names {
            let name_sel = Selector::parse(&format!("meta[name='{name}']")).ok();
            let prop_sel = Selector::parse(&format!("meta[property='{name}']")).ok();
            meta_selectors.insert(name, (name_sel, prop_sel));
        }

        Self {
            content_selectors,
            meta_selectors,
            anchor_selector: Selector::parse("a[href]").expect("static selector"),
        }
    }

    /// Extract the main article body as plain text with paragraph breaks.
    pub fn extract_text(&self, html: &str) -> String {
        if html.is_empty() {
            return String::new();
        }
        let document = Html::parse_document(html);
        self.main_content_text(&document)
    }

    /// Extract page metadata with OpenGraph → Twitter → meta → title →
    /// canonical → lang priority.
    pub fn extract_metadata(&self, html: &str, base: &Url) -> PageMetadata {
        if html.is_empty() {
            return PageMetadata::default();
        }
        let document = Html::parse_document(html);
        self.build_metadata(&document, base)
    }

    /// Extract every `<a href>` in document order, duplicates preserved.
    pub fn extract_links(&self, html: &str, base: &Url) -> Vec<ExtractedLink> {
        if html.is_empty() {
            return Vec::new();
        }
        let document = Html::parse_document(html);
        let mut links = Vec::new();

        for anchor in document.select(&self.anchor_selector) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if href.is_empty()
                || href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
            {
                continue;
            }
            let Ok(resolved) = base.join(href) else {
                continue;
            };

            let text = collapse_whitespace(&anchor.text().collect::<String>());
            links.push(ExtractedLink {
                href: resolved.to_string(),
                text: truncate_to_bytes(&text, MAX_LINK_TEXT).to_string(),
                rel: anchor.value().attr("rel").map(|r| r.to_string()),
            });
        }

        links
    }

    /// Extract JSON-LD payloads and schema.org microdata.
    pub fn extract_structured_data(&self, html: &str) -> StructuredData {
        if html.is_empty() {
            return StructuredData::default();
        }
        let document = Html::parse_document(html);
        structured::extract(&document)
    }

    pub(crate) fn meta_content(&self, document: &Html, name: &str) -> Option<String> {
        let lookup = |selector: &Option<Selector>| -> Option<String> {
            let selector = selector.as_ref()?;
            document
                .select(selector)
                .next()
                .and_then(|el| el.value().attr("content"))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        if let Some((name_sel, prop_sel)) = self.meta_selectors.get(name) {
            return lookup(name_sel).or_else(|| lookup(prop_sel));
        }

        // Uncached names fall back to one-off selector parsing
        let name_sel = Selector::parse(&format!("meta[name='{name}']")).ok();
        let prop_sel = Selector::parse(&format!("meta[property='{name}']")).ok();
        lookup(&name_sel).or_else(|| lookup(&prop_sel))
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new()
    }
}
