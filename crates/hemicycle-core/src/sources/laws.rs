//! Legislative file pages, used to theme ballots.

use crate::extract::{SectionMarker, ShapeDescriptor, TagMatcher, extract};
use crate::models::LawRecord;

use super::absolute_url;

pub fn law_shape() -> ShapeDescriptor {
    ShapeDescriptor::new("law", TagMatcher::tag("p"))
        .section(SectionMarker::by_id("div", "theme"))
        .section(SectionMarker::by_id("div", "senat"))
        .entry("a")
        .capture("href")
}

/// The Senate's copy of a file only contributes its theme.
pub fn senate_law_shape() -> ShapeDescriptor {
    ShapeDescriptor::new("senate-law", TagMatcher::tag("p"))
        .section(SectionMarker::by_id("div", "theme"))
}

pub fn parse_law(document: &str, base: &str) -> Option<LawRecord> {
    let doc = extract(document, &law_shape());
    if doc.is_empty() {
        return None;
    }
    let senate_url = doc
        .section("senat")
        .and_then(|s| s.entries.iter().find_map(|e| e.attribute("href")))
        .and_then(|href| absolute_url(base, href));
    Some(LawRecord {
        theme_label: doc.joined("theme"),
        senate_url,
    })
}

pub fn parse_senate_theme(document: &str) -> Option<String> {
    extract(document, &senate_law_shape()).joined("theme")
}
