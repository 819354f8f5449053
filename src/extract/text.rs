//! Main-content selection and plain-text rendering

use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node, Selector};

use super::ContentExtractor;

/// Subtrees that never contribute to article text
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "noscript", "iframe", "svg",
];

/// Elements that start a new paragraph (blank line)
const PARAGRAPH_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "table", "ul", "ol", "figure",
];

/// Elements that start a new line
const LINE_TAGS: &[&str] = &["li", "br", "tr", "div", "section", "article", "main", "dd", "dt"];

/// Minimum serialized size for a candidate container to win over `body`
const MIN_CONTAINER_LEN: usize = 100;

impl ContentExtractor {
    /// Render the main content area of `document` as plain text.
    pub(super) fn main_content_text(&self, document: &Html) -> String {
        // Try each content selector in priority order
        for selector in &self.content_selectors {
            if let Some(element) = document.select(selector).next() {
                if element.html().len() > MIN_CONTAINER_LEN {
                    return render_text(&element);
                }
            }
        }

        // Fall back to body
        if let Ok(body_sel) = Selector::parse("body") {
            if let Some(body) = document.select(&body_sel).next() {
                return render_text(&body);
            }
        }

        String::new()
    }
}

/// Walk an element's subtree and emit plain text with paragraph breaks.
fn render_text(element: &ElementRef) -> String {
    let mut out = String::new();
    walk(**element, &mut out, false);
    normalize_whitespace(&out)
}

fn walk(node: NodeRef<Node>, out: &mut String, in_pre: bool) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => {
                if in_pre {
                    out.push_str(text);
                } else {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        if !out.is_empty() && !out.ends_with(char::is_whitespace) {
                            out.push(' ');
                        }
                        out.push_str(trimmed);
                    }
                }
            }
            Node::Element(element) => {
                let name = element.name();
                if SKIP_TAGS.contains(&name) {
                    continue;
                }

                let is_paragraph = PARAGRAPH_TAGS.contains(&name);
                let is_line = LINE_TAGS.contains(&name);
                if is_paragraph {
                    out.push_str("\n\n");
                } else if is_line {
                    out.push('\n');
                }

                walk(child, out, in_pre || name == "pre");

                if is_paragraph {
                    out.push_str("\n\n");
                } else if is_line {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Collapse runs of spaces on each line, cap blank runs at one empty line,
/// and trim the ends.
fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut pending_break = 0u32;

    for line in text.split('\n') {
        let trimmed = line.split_whitespace().collect::<Vec<_>>().join(" ");

        if trimmed.is_empty() {
            pending_break += 1;
            continue;
        }

        if !result.is_empty() {
            if pending_break >= 2 {
                result.push_str("\n\n");
            } else {
                result.push('\n');
            }
        }

        pending_break = 0;
        result.push_str(&trimmed);
    }

    result
}
