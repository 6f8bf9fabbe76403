//! Ballot list and ballot detail pages.

use crate::extract::{ExtractedDocument, SectionMarker, ShapeDescriptor, TagMatcher, extract};
use crate::models::{BallotRecord, BallotSummary, VoteEntry, VoteValue};
use crate::util::{collapse_whitespace, find_date};

use super::deputies::official_id_from_href;
use super::{absolute_url, label_value};

const SECTION_BALLOT: &str = "scrutin";
const SECTION_FILE: &str = "dossier";

const VOTE_SECTIONS: [(&str, VoteValue); 4] = [
    ("votes-pour", VoteValue::For),
    ("votes-contre", VoteValue::Against),
    ("votes-abstention", VoteValue::Abstention),
    ("votes-non-votants", VoteValue::NonVoting),
];

pub fn ballot_list_shape() -> ShapeDescriptor {
    ShapeDescriptor::new("ballot-list", TagMatcher::tag("tbody"))
        .section(SectionMarker::by_id("table", "scrutins"))
        .entry("tr")
        .capture("data-id")
}

pub fn ballot_detail_shape() -> ShapeDescriptor {
    let shape = ShapeDescriptor::new("ballot-detail", TagMatcher::tag("ul"))
        .section(SectionMarker::by_id("div", SECTION_BALLOT))
        .section(SectionMarker::by_id("div", SECTION_FILE));
    VOTE_SECTIONS
        .iter()
        .fold(shape, |shape, (id, _)| shape.section(SectionMarker::by_id("div", id)))
        .entry("li")
        .capture("href")
        .capture("data-id")
}

pub fn parse_ballot_list(document: &str) -> Option<Vec<BallotSummary>> {
    let doc = extract(document, &ballot_list_shape());
    let section = doc.section("scrutins")?;
    let ballots = section
        .entries
        .iter()
        .filter_map(|row| {
            let id = row.attribute("data-id")?.trim();
            (!id.is_empty()).then(|| BallotSummary {
                official_id: id.to_string(),
            })
        })
        .collect();
    Some(ballots)
}

/// Parse a ballot page. Theme fields are left for the caller to resolve.
///
/// `None` when the page has no ballot block or the block has no title.
pub fn parse_ballot(document: &str, base: &str, official_id: &str) -> Option<BallotRecord> {
    let doc = extract(document, &ballot_detail_shape());
    let summary = doc.section(SECTION_BALLOT)?;

    let mut record = BallotRecord {
        official_id: official_id.to_string(),
        title: String::new(),
        date: None,
        kind: None,
        total_votes: None,
        yes_votes: None,
        no_votes: None,
        is_adopted: None,
        file_url: None,
        analysis_url: None,
        theme: None,
        unclassified_theme: None,
        votes: votes(&doc),
        non_voting: 0,
    };

    for (label, value) in summary.entries.iter().filter_map(label_value) {
        match label.as_str() {
            "titre" | "objet" => record.title = value,
            "date" => record.date = find_date(&value),
            "type" => record.kind = Some(value),
            "votants" | "nombre de votants" => record.total_votes = count(&value),
            "pour" => record.yes_votes = count(&value),
            "contre" => record.no_votes = count(&value),
            "résultat" | "sort" => record.is_adopted = adoption(&value),
            _ => {}
        }
    }
    if record.title.is_empty() {
        return None;
    }

    if let Some(file) = doc.section(SECTION_FILE) {
        for entry in &file.entries {
            let Some(url) = entry.attribute("href").and_then(|h| absolute_url(base, h)) else {
                continue;
            };
            let text = entry.texts.join(" ").to_lowercase();
            if text.contains("analyse") {
                record.analysis_url = Some(url);
            } else if text.contains("dossier") {
                record.file_url = Some(url);
            }
        }
    }

    record.non_voting = record
        .votes
        .iter()
        .filter(|v| v.value == VoteValue::NonVoting)
        .count() as u32;
    Some(record)
}

fn votes(doc: &ExtractedDocument) -> Vec<VoteEntry> {
    let mut votes = Vec::new();
    for (id, value) in VOTE_SECTIONS {
        let Some(section) = doc.section(id) else {
            continue;
        };
        for entry in &section.entries {
            let deputy_name = collapse_whitespace(&entry.texts.join(" "));
            if deputy_name.is_empty() {
                continue;
            }
            let official_id = entry
                .attribute("data-id")
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .or_else(|| entry.attribute("href").and_then(official_id_from_href));
            votes.push(VoteEntry {
                deputy_name,
                official_id,
                value,
            });
        }
    }
    votes
}

fn count(value: &str) -> Option<u32> {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn adoption(value: &str) -> Option<bool> {
    let value = value.to_lowercase();
    if value.contains("adopt") {
        Some(true)
    } else if value.contains("rejet") {
        Some(false)
    } else {
        None
    }
}
