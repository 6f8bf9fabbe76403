//! Paginated work listings and work detail pages.

use crate::extract::{Entry, SectionMarker, ShapeDescriptor, TagMatcher, extract};
use crate::models::{ExtraInfo, WorkItemRecord, WorkKind};
use crate::util::{collapse_whitespace, find_date};

use super::absolute_url;

const SECTION_DOCUMENTS: &str = "documents";
const SECTION_THEME: &str = "theme";
const SECTION_DESCRIPTION: &str = "description";
const SECTION_EXTRA: &str = "infos-complementaires";

pub fn work_page_shape() -> ShapeDescriptor {
    ShapeDescriptor::new("work-page", TagMatcher::tag("li"))
        .section(SectionMarker::new(
            SECTION_DOCUMENTS,
            TagMatcher::with_class("ul", "liste-documents"),
        ))
        .entry("li")
        .capture("data-id")
        .capture("href")
}

pub fn work_detail_shape() -> ShapeDescriptor {
    ShapeDescriptor::new("work-detail", TagMatcher::tag("p"))
        .section(SectionMarker::by_id("div", SECTION_THEME))
        .section(SectionMarker::by_id("div", SECTION_DESCRIPTION))
        .section(
            SectionMarker::by_id("div", SECTION_EXTRA).with_container(TagMatcher::tag("ul")),
        )
        .entry("li")
}

/// One page of a deputy's works of `kind`.
///
/// Each `li` reads as date, subtype, then description. A page without the
/// document list is `None`; a list with no entries is an empty page.
pub fn parse_work_page(document: &str, base: &str, kind: WorkKind) -> Option<Vec<WorkItemRecord>> {
    let doc = extract(document, &work_page_shape());
    let section = doc.section(SECTION_DOCUMENTS)?;

    let works = section
        .entries
        .iter()
        .filter_map(|entry| {
            let href = entry.attribute("href");
            let external_id = entry
                .attribute("data-id")
                .or(href)
                .map(str::trim)
                .filter(|id| !id.is_empty())?
                .to_string();
            let subtype = entry.text(1).map(collapse_whitespace).unwrap_or_default();
            Some(WorkItemRecord {
                external_id,
                date: entry.text(0).and_then(find_date),
                kind,
                subtype: adjust_subtype(&subtype, kind),
                description: collapse_whitespace(&entry.texts.get(2..).unwrap_or_default().join(" ")),
                url: href.and_then(|h| absolute_url(base, h)),
                theme: None,
                unclassified_theme: None,
                is_creation: kind.is_creation(),
                extra_infos: Vec::new(),
            })
        })
        .collect();
    Some(works)
}

/// Commission subtypes read "Commission des lois - Réunion du ..."; keep the part after the dash.
fn adjust_subtype(subtype: &str, kind: WorkKind) -> String {
    if kind != WorkKind::Commission {
        return subtype.to_string();
    }
    match subtype.split('-').nth(1).map(str::trim) {
        Some(part) if !part.is_empty() => part.to_string(),
        _ => subtype.to_string(),
    }
}

/// Theme, description and complementary lines read from a work's own page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkDetail {
    pub theme: Option<String>,
    pub description: Option<String>,
    pub extra_infos: Vec<ExtraInfo>,
}

pub fn parse_work_detail(document: &str) -> Option<WorkDetail> {
    let doc = extract(document, &work_detail_shape());
    if doc.is_empty() {
        return None;
    }
    Some(WorkDetail {
        theme: doc.joined(SECTION_THEME),
        description: doc.joined(SECTION_DESCRIPTION),
        extra_infos: doc
            .section(SECTION_EXTRA)
            .map(|section| section.entries.iter().filter_map(extra_info).collect())
            .unwrap_or_default(),
    })
}

/// `<li><span>Rapporteur :</span><span>Mme Martin</span></li>`; case is kept.
fn extra_info(entry: &Entry) -> Option<ExtraInfo> {
    let (label, rest) = entry.texts.split_first()?;
    let label = collapse_whitespace(label.trim_end_matches(':'));
    let value = collapse_whitespace(&rest.join(" "));
    (!label.is_empty() && !value.is_empty()).then_some(ExtraInfo { label, value })
}
