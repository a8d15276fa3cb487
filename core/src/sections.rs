//! Free-text research parsing
//!
//! Chat-style research endpoints answer with markdown-ish text broken into
//! `#`, `##` or `###` sections rather than JSON. This module maps those
//! sections onto a [`ResearchResult`] by keyword-matching section titles.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::ResearchResult;

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n#{1,3}\s+").expect("valid heading regex"))
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n-\s+|\n\d+\.\s+").expect("valid bullet regex"))
}

fn spec_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([\w\s]+):(.+)$").expect("valid specification line regex"))
}

fn value_range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$(\d{1,3}(?:,\d{3})*(?:\.\d{2})?)\s*-\s*\$(\d{1,3}(?:,\d{3})*(?:\.\d{2})?)")
            .expect("valid value range regex")
    })
}

/// Parse sectioned research text.
///
/// The returned overview is empty when no overview-like section exists;
/// callers decide whether that is acceptable.
pub fn parse_research_text(content: &str) -> ResearchResult {
    let mut result = ResearchResult::default();

    for section in heading_re().split(content) {
        if section.trim().is_empty() {
            continue;
        }

        let (title, body) = match section.split_once('\n') {
            Some((title, body)) => (title, body.trim()),
            None => (section, ""),
        };
        let title = title.trim().trim_start_matches('#').trim().to_lowercase();

        if title.contains("overview") || title.contains("introduction") || title.contains("significance") {
            result.overview = body.to_string();
        } else if title.contains("specification") || title.contains("specs") {
            result.specifications = Some(parse_specifications(body));
        } else if title.contains("history") || title.contains("background") || title.contains("context") {
            result.history = non_empty(body);
        } else if title.contains("market value") || title.contains("price") || title.contains("market trends") {
            result.market_trends = non_empty(body);
            if let Some(caps) = value_range_re().captures(body) {
                result.value_range = Some(format!("${} - ${}", &caps[1], &caps[2]));
            }
        } else if title.contains("factors affecting value") {
            result.factors_affecting_value = bullets(body);
        } else if title.contains("upgrades") || title.contains("modifications") {
            result.common_upgrades = bullets(body);
        } else if title.contains("restomod") {
            result.restomod_options = bullets(body);
        } else if title.contains("recommended parts") || title.contains("parts and modifications") {
            result.recommended_parts = bullets(body);
        } else if title.contains("compatibility") {
            result.compatibility = non_empty(body);
        } else if title.contains("key moments") || title.contains("key dates") {
            result.key_moments = bullets(body);
        } else if title.contains("notable examples") || title.contains("special editions") {
            result.notable_examples = bullets(body);
        } else if title.contains("investment") {
            result.investment_potential = non_empty(body);
        }
    }

    result
}

fn parse_specifications(body: &str) -> BTreeMap<String, String> {
    let mut specs = BTreeMap::new();
    for line in body.lines() {
        let line = line.trim().trim_start_matches("- ");
        if let Some(caps) = spec_line_re().captures(line) {
            specs.insert(caps[1].trim().to_string(), caps[2].trim().to_string());
        }
    }

    if specs.is_empty() && !body.is_empty() {
        specs.insert("General".to_string(), body.to_string());
    }
    specs
}

fn bullets(body: &str) -> Option<Vec<String>> {
    if body.is_empty() {
        return None;
    }
    let padded = format!("\n{}", body);
    let items: Vec<String> = bullet_re()
        .split(&padded)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if items.is_empty() {
        Some(vec![body.to_string()])
    } else {
        Some(items)
    }
}

fn non_empty(body: &str) -> Option<String> {
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}
