//! Metadata extraction: OpenGraph, Twitter Cards, meta tags, canonical, lang

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use url::Url;

use crate::fetch::PageMetadata;

use super::ContentExtractor;

impl ContentExtractor {
    /// Assemble metadata from a parsed document.
    ///
    /// Source priority: OpenGraph, then Twitter Cards, then standard meta
    /// tags, then document structure (`<title>`, `<link rel=canonical>`,
    /// `<html lang>`).
    pub(super) fn build_metadata(&self, document: &Html, base: &Url) -> PageMetadata {
        let og_title = self.meta_content(document, "og:title");
        let og_description = self.meta_content(document, "og:description");
        let og_image = self
            .meta_content(document, "og:image")
            .map(|image| resolve(base, &image));

        let title = og_title
            .clone()
            .or_else(|| self.meta_content(document, "twitter:title"))
            .or_else(|| self.meta_content(document, "title"))
            .or_else(|| title_tag(document));

        let description = og_description
            .clone()
            .or_else(|| self.meta_content(document, "twitter:description"))
            .or_else(|| self.meta_content(document, "description"));

        let canonical_url = canonical_link(document)
            .map(|href| resolve(base, &href))
            .or_else(|| self.meta_content(document, "og:url"));

        let language = html_lang(document)
            .or_else(|| self.meta_content(document, "language"))
            .or_else(|| self.meta_content(document, "og:locale"));

        let author = self
            .meta_content(document, "author")
            .or_else(|| itemprop_text(document, "author"));

        let published_date = self.published_date(document).map(|d| normalize_date(&d));

        PageMetadata {
            title,
            description,
            og_title,
            og_description,
            og_image,
            language,
            canonical_url,
            author,
            published_date,
            pdf_pages: None,
            pdf_author: None,
            pdf_created_date: None,
        }
    }

    fn published_date(&self, document: &Html) -> Option<String> {
        for name in ["article:published_time", "date", "pubdate", "publishdate"] {
            if let Some(value) = self.meta_content(document, name) {
                return Some(value);
            }
        }

        if let Some(value) = itemprop_content(document, "datePublished") {
            return Some(value);
        }

        // <time datetime="...">
        if let Ok(selector) = Selector::parse("time[datetime]") {
            if let Some(el) = document.select(&selector).next() {
                if let Some(datetime) = el.value().attr("datetime") {
                    let trimmed = datetime.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed.to_string());
                    }
                }
            }
        }

        None
    }
}

fn title_tag(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let el = document.select(&selector).next()?;
    let title = el.text().collect::<String>().trim().to_string();
    (!title.is_empty()).then_some(title)
}

fn canonical_link(document: &Html) -> Option<String> {
    let selector = Selector::parse("link[rel='canonical']").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(|href| href.to_string())
}

fn html_lang(document: &Html) -> Option<String> {
    let selector = Selector::parse("html").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(|lang| lang.trim().to_string())
        .filter(|lang| !lang.is_empty())
}

fn itemprop_text(document: &Html, prop: &str) -> Option<String> {
    let selector = Selector::parse(&format!("[itemprop='{prop}']")).ok()?;
    let el = document.select(&selector).next()?;
    let text = el.text().collect::<String>().trim().to_string();
    (!text.is_empty() && text.len() < 100).then_some(text)
}

fn itemprop_content(document: &Html, prop: &str) -> Option<String> {
    let selector = Selector::parse(&format!("meta[itemprop='{prop}']")).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

fn resolve(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Normalize a date string to RFC 3339 when it parses; keep the raw value
/// otherwise so callers never lose information.
fn normalize_date(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc).to_rfc3339();
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return dt.with_timezone(&Utc).to_rfc3339();
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y"] {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, format) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339();
            }
        }
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339();
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_date_handles_common_forms() {
        assert_eq!(
            normalize_date("2024-01-15T10:00:00Z"),
            "2024-01-15T10:00:00+00:00"
        );
        assert!(normalize_date("2024-01-15").starts_with("2024-01-15T00:00:00"));
        assert!(normalize_date("January 15, 2024").starts_with("2024-01-15"));
        // Unparseable values pass through untouched
        assert_eq!(normalize_date("last Tuesday"), "last Tuesday");
    }

    #[test]
    fn time_element_is_last_resort() {
        let html = r#"<html><body><time datetime="2023-06-01T08:00:00Z">June 1</time></body></html>"#;
        let extractor = ContentExtractor::new();
        let doc = Html::parse_document(html);
        assert_eq!(
            extractor.published_date(&doc).as_deref(),
            Some("2023-06-01T08:00:00Z")
        );
    }

    #[test]
    fn og_image_resolves_relative_urls() {
        let html = r#"<html><head><meta property="og:image" content="/img/cover.png"></head></html>"#;
        let extractor = ContentExtractor::new();
        let base = Url::parse("https://example.com/article").unwrap();
        let meta = extractor.extract_metadata(html, &base);
        assert_eq!(
            meta.og_image.as_deref(),
            Some("https://example.com/img/cover.png")
        );
    }
}
