use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::taxonomy::UnclassifiedLabel;

/// How the body of a response is turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Decode with the response charset (UTF-8 when none is declared).
    #[default]
    Text,
    /// Decode every byte as one ISO-8859-1 code point.
    Binary,
}

/// One fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub encoding: EncodingMode,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, encoding: EncodingMode) -> Self {
        Self {
            url: url.into(),
            encoding,
        }
    }

    pub fn text(url: impl Into<String>) -> Self {
        Self::new(url, EncodingMode::Text)
    }
}

/// Position in a paginated remote collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationCursor {
    pub range_start: usize,
    pub range_size: usize,
}

impl PaginationCursor {
    pub fn first(range_size: usize) -> Self {
        Self {
            range_start: 0,
            range_size,
        }
    }

    /// Zero-based page number.
    pub fn page(&self) -> usize {
        self.range_start / self.range_size.max(1)
    }

    #[must_use]
    pub fn advance(self) -> Self {
        Self {
            range_start: self.range_start + self.range_size,
            range_size: self.range_size,
        }
    }
}

/// Category of parliamentary work, as named in the remote URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkKind {
    LawProposal,
    Report,
    Question,
    Commission,
    PublicSession,
}

impl WorkKind {
    pub const ALL: [WorkKind; 5] = [
        WorkKind::LawProposal,
        WorkKind::Report,
        WorkKind::Question,
        WorkKind::Commission,
        WorkKind::PublicSession,
    ];

    /// Path segment used in work listing URLs.
    pub fn as_path(&self) -> &'static str {
        match self {
            WorkKind::LawProposal => "propositions-loi",
            WorkKind::Report => "rapports",
            WorkKind::Question => "questions",
            WorkKind::Commission => "comptes-rendus-commission",
            WorkKind::PublicSession => "comptes-rendus-seance",
        }
    }

    /// Works the deputy authored, as opposed to took part in.
    pub fn is_creation(&self) -> bool {
        matches!(self, WorkKind::LawProposal | WorkKind::Report)
    }

    /// Public session reports carry no detail page worth fetching.
    pub fn has_detail_page(&self) -> bool {
        !matches!(self, WorkKind::PublicSession)
    }

    /// Detail pages are Latin-1 except for questions.
    pub fn detail_encoding(&self) -> EncodingMode {
        match self {
            WorkKind::Question => EncodingMode::Text,
            _ => EncodingMode::Binary,
        }
    }

    /// Proposals and commission reports list complementary information on
    /// their detail page.
    pub fn has_extra_infos(&self) -> bool {
        matches!(self, WorkKind::LawProposal | WorkKind::Commission)
    }

    /// Theme label used when the work carries none of its own.
    pub fn default_theme(&self) -> Option<&'static str> {
        match self {
            WorkKind::Commission | WorkKind::PublicSession => Some("Politique générale"),
            _ => None,
        }
    }
}

/// Reference to a node of the theme taxonomy, as persisted with a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeRef {
    pub id: u32,
    pub name: String,
}

/// Labelled line of complementary information on a work detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraInfo {
    pub label: String,
    pub value: String,
}

/// One parliamentary work (proposal, report, question, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemRecord {
    pub external_id: String,
    pub date: Option<NaiveDate>,
    pub kind: WorkKind,
    pub subtype: String,
    pub description: String,
    pub url: Option<String>,
    pub theme: Option<ThemeRef>,
    /// Raw label kept when no theme matched, pending manual theming.
    pub unclassified_theme: Option<String>,
    pub is_creation: bool,
    #[serde(default)]
    pub extra_infos: Vec<ExtraInfo>,
}

impl WorkItemRecord {
    pub fn is_unclassified(&self) -> bool {
        self.theme.is_none() && self.unclassified_theme.is_some()
    }
}

/// Career history read from a deputy profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandateRecord {
    pub current_mandates: Vec<String>,
    pub past_deputy_mandates: Vec<String>,
    pub past_national_missions: Vec<String>,
    pub past_international_missions: Vec<String>,
    /// Section ids absent from the page; non-empty means partial.
    pub missing_sections: Vec<String>,
}

impl MandateRecord {
    pub fn is_partial(&self) -> bool {
        !self.missing_sections.is_empty()
    }
}

/// Entry of the deputy list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeputySummary {
    pub official_id: String,
    pub first_name: String,
    pub last_name: String,
    pub constituency: Option<String>,
}

impl DeputySummary {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndOfMandate {
    pub date: Option<NaiveDate>,
    pub reason: String,
}

/// Contact and status information from a deputy profile page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeputyProfile {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub parliament_group: Option<String>,
    pub seat_number: Option<String>,
    pub current_mandate_start: Option<NaiveDate>,
    pub end_of_mandate: Option<EndOfMandate>,
}

/// Seat held in a parliamentary body (commission, delegation, group, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRole {
    pub instance: String,
    pub role: Option<String>,
}

/// One published interest declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationRecord {
    pub title: String,
    pub date: Option<NaiveDate>,
    pub url: String,
}

/// Independently fetched part of a deputy composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubResource {
    Works,
    Declarations,
    Mandates,
}

/// Fully assembled deputy, the unit of persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeputyRecord {
    pub summary: DeputySummary,
    pub profile: DeputyProfile,
    pub mandates: Option<MandateRecord>,
    /// Bodies the deputy currently sits in, read from the profile page.
    #[serde(default)]
    pub instances: Vec<InstanceRole>,
    pub works: Vec<WorkItemRecord>,
    pub declarations: Vec<DeclarationRecord>,
    /// Sub-resources that could not be retrieved this cycle.
    pub missing: Vec<SubResource>,
}

impl DeputyRecord {
    pub fn official_id(&self) -> &str {
        &self.summary.official_id
    }

    pub fn is_partial(&self) -> bool {
        !self.missing.is_empty() || self.mandates.as_ref().is_some_and(|m| m.is_partial())
    }

    /// Most recent work date, used as the next delta watermark.
    pub fn last_work_date(&self) -> Option<NaiveDate> {
        self.works.iter().filter_map(|w| w.date).max()
    }
}

/// A deputy as the store knows it.
#[derive(Debug, Clone)]
pub struct StoredDeputy {
    pub record: DeputyRecord,
    pub data_hash: String,
    pub last_work_date: Option<NaiveDate>,
    pub last_seen_at: DateTime<Utc>,
}

/// Minimal identity used to resolve votes by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub official_id: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&DeputySummary> for RosterEntry {
    fn from(summary: &DeputySummary) -> Self {
        Self {
            official_id: summary.official_id.clone(),
            first_name: summary.first_name.clone(),
            last_name: summary.last_name.clone(),
        }
    }
}

/// A stored work still waiting for a theme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnclassifiedWork {
    pub deputy_official_id: String,
    pub work_id: String,
    pub label: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotSummary {
    pub official_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoteValue {
    For,
    Against,
    Abstention,
    NonVoting,
}

/// One vote as listed on a ballot page; `official_id` is filled once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEntry {
    pub deputy_name: String,
    pub official_id: Option<String>,
    pub value: VoteValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotRecord {
    pub official_id: String,
    pub title: String,
    pub date: Option<NaiveDate>,
    pub kind: Option<String>,
    pub total_votes: Option<u32>,
    pub yes_votes: Option<u32>,
    pub no_votes: Option<u32>,
    pub is_adopted: Option<bool>,
    pub file_url: Option<String>,
    pub analysis_url: Option<String>,
    pub theme: Option<ThemeRef>,
    pub unclassified_theme: Option<String>,
    pub votes: Vec<VoteEntry>,
    pub non_voting: u32,
}

/// Theme information from a legislative file page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LawRecord {
    pub theme_label: Option<String>,
    pub senate_url: Option<String>,
}

/// What an idempotent upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    pub fn is_change(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

/// Summary of one ingestion cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reclassified: usize,
    pub deputies_updated: usize,
    pub deputies_unchanged: usize,
    pub deputies_skipped: usize,
    pub ballots_updated: usize,
    pub ballots_unchanged: usize,
    pub ballots_skipped: usize,
    pub expired_mandates: usize,
    pub unclassified: Vec<UnclassifiedLabel>,
}

impl CycleReport {
    pub(crate) fn start() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            reclassified: 0,
            deputies_updated: 0,
            deputies_unchanged: 0,
            deputies_skipped: 0,
            ballots_updated: 0,
            ballots_unchanged: 0,
            ballots_skipped: 0,
            expired_mandates: 0,
            unclassified: Vec::new(),
        }
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash of a record's JSON form, used for upsert change detection.
pub fn record_hash<T: Serialize>(record: &T) -> Result<String, serde_json::Error> {
    Ok(compute_hash(&serde_json::to_string(record)?))
}
