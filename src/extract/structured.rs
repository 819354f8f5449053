//! Structured data: JSON-LD payloads and schema.org microdata

use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::fetch::StructuredData;
use crate::util::collapse_whitespace;

/// Extract JSON-LD and microdata from a parsed document.
pub(super) fn extract(document: &Html) -> StructuredData {
    let mut types: BTreeSet<String> = BTreeSet::new();

    let json_ld = extract_json_ld(document, &mut types);
    let microdata = extract_microdata(document, &mut types);

    StructuredData {
        json_ld,
        microdata,
        schema_org_types: types.into_iter().collect(),
    }
}

/// Parse every `<script type="application/ld+json">` leniently; malformed
/// payloads are dropped, top-level arrays are flattened into items.
fn extract_json_ld(document: &Html, types: &mut BTreeSet<String>) -> Vec<Value> {
    let Ok(selector) = Selector::parse("script[type='application/ld+json']") else {
        return Vec::new();
    };

    let mut items = Vec::new();
    for script in document.select(&selector) {
        let raw = script.text().collect::<String>();
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(array)) => items.extend(array),
            Ok(value) => items.push(value),
            Err(_) => continue,
        }
    }

    for item in &items {
        collect_types(item, types);
    }

    items
}

/// Record every `@type` value (string or array of strings) in an item tree.
fn collect_types(value: &Value, types: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            match map.get("@type") {
                Some(Value::String(t)) => {
                    types.insert(t.clone());
                }
                Some(Value::Array(list)) => {
                    for t in list.iter().filter_map(Value::as_str) {
                        types.insert(t.to_string());
                    }
                }
                _ => {}
            }
            for nested in map.values() {
                collect_types(nested, types);
            }
        }
        Value::Array(list) => {
            for nested in list {
                collect_types(nested, types);
            }
        }
        _ => {}
    }
}

/// Flatten top-level `itemscope` elements into nested JSON objects.
fn extract_microdata(document: &Html, types: &mut BTreeSet<String>) -> Vec<Value> {
    let Ok(scope_selector) = Selector::parse("[itemscope]") else {
        return Vec::new();
    };

    document
        .select(&scope_selector)
        .filter(|el| !has_itemscope_ancestor(el))
        .map(|el| build_item(&el, types))
        .collect()
}

fn has_itemscope_ancestor(element: &ElementRef) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| ancestor.value().attr("itemscope").is_some())
}

fn build_item(scope: &ElementRef, types: &mut BTreeSet<String>) -> Value {
    let mut map = Map::new();

    if let Some(itemtype) = scope.value().attr("itemtype") {
        let itemtype = itemtype.trim();
        if !itemtype.is_empty() {
            types.insert(itemtype.to_string());
            map.insert("@type".to_string(), Value::String(itemtype.to_string()));
        }
    }

    collect_props(scope, &mut map, types);
    Value::Object(map)
}

/// Gather the itemprops belonging to `scope`, descending until a nested
/// itemscope takes ownership of its own subtree.
fn collect_props(node: &ElementRef, map: &mut Map<String, Value>, types: &mut BTreeSet<String>) {
    for child in node.children().filter_map(ElementRef::wrap) {
        let prop_name = child.value().attr("itemprop").map(str::trim);
        let is_scope = child.value().attr("itemscope").is_some();

        match (prop_name, is_scope) {
            (Some(name), true) if !name.is_empty() => {
                let nested = build_item(&child, types);
                insert_prop(map, name, nested);
            }
            (Some(name), false) if !name.is_empty() => {
                insert_prop(map, name, Value::String(prop_value(&child)));
            }
            // Independent nested item without a prop name; top-level pass
            // already picks it up
            (_, true) => continue,
            _ => collect_props(&child, map, types),
        }
    }
}

/// Repeated property names accumulate into arrays.
fn insert_prop(map: &mut Map<String, Value>, name: &str, value: Value) {
    match map.get_mut(name) {
        Some(Value::Array(existing)) => existing.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(name.to_string(), value);
        }
    }
}

/// The value of a non-scope itemprop element, per the microdata rules for
/// each tag.
fn prop_value(element: &ElementRef) -> String {
    let el = element.value();
    match el.name() {
        "meta" => el.attr("content").unwrap_or_default().trim().to_string(),
        "a" | "link" | "area" => el.attr("href").unwrap_or_default().trim().to_string(),
        "img" | "audio" | "video" | "source" | "iframe" | "embed" => {
            el.attr("src").unwrap_or_default().trim().to_string()
        }
        "time" => el
            .attr("datetime")
            .map(|d| d.trim().to_string())
            .unwrap_or_else(|| collapse_whitespace(&element.text().collect::<String>())),
        "data" | "meter" => el
            .attr("value")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| collapse_whitespace(&element.text().collect::<String>())),
        _ => collapse_whitespace(&element.text().collect::<String>()),
    }
}
