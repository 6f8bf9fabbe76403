//! The ingestion cycle: deputies, their works and declarations, then ballots.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::{join, join_all};
use tracing::Instrument;

use crate::batch::{BatchOrchestrator, BatchReporter, PaginationOutcome, TracingBatchReporter};
use crate::config::IngestConfig;
use crate::models::{
    BallotRecord, BallotSummary, CycleReport, DeclarationRecord, DeputyRecord, DeputySummary,
    EncodingMode, RosterEntry, SubResource, UpsertOutcome, WorkItemRecord, WorkKind,
};
use crate::resilient::ResilientFetcher;
use crate::sources::ballots::{parse_ballot, parse_ballot_list};
use crate::sources::declarations::{
    DeclarantLink, find_declarant, parse_declaration_index, parse_declarations,
};
use crate::sources::deputies::{ProfilePage, parse_deputy_list, parse_profile};
use crate::sources::laws::{parse_law, parse_senate_theme};
use crate::sources::works::{parse_work_detail, parse_work_page};
use crate::taxonomy::{Resolution, Taxonomy, UnclassifiedLabel};
use crate::traits::{Fetcher, IngestionStore, Notifier};
use crate::util::{fill_template, normalize_name};

/// What happened to one deputy or ballot of the cycle.
struct EntityOutcome {
    upsert: UpsertOutcome,
    unclassified: Vec<UnclassifiedLabel>,
}

/// Works gathered for one deputy across every kind.
struct WorksOutcome {
    works: Vec<WorkItemRecord>,
    /// At least one kind's first page could not be read.
    failed: bool,
    unclassified: Vec<UnclassifiedLabel>,
}

/// Runs ingestion cycles against one fetcher, store and notifier.
pub struct IngestionCoordinator<F, S, N, R = TracingBatchReporter>
where
    F: Fetcher,
    S: IngestionStore,
    N: Notifier,
    R: BatchReporter,
{
    fetcher: ResilientFetcher<F>,
    store: S,
    notifier: N,
    taxonomy: Arc<Taxonomy>,
    config: IngestConfig,
    orchestrator: BatchOrchestrator,
    reporter: R,
}

impl<F, S, N> IngestionCoordinator<F, S, N>
where
    F: Fetcher,
    S: IngestionStore,
    N: Notifier,
{
    pub fn new(
        fetcher: F,
        store: S,
        notifier: N,
        taxonomy: Arc<Taxonomy>,
        config: IngestConfig,
    ) -> Self {
        Self {
            fetcher: ResilientFetcher::new(fetcher, config.fetch_policy.clone()),
            store,
            notifier,
            taxonomy,
            orchestrator: BatchOrchestrator::new(config.range_size, config.max_pages),
            config,
            reporter: TracingBatchReporter,
        }
    }
}

impl<F, S, N, R> IngestionCoordinator<F, S, N, R>
where
    F: Fetcher,
    S: IngestionStore,
    N: Notifier,
    R: BatchReporter,
{
    pub fn with_reporter<R2: BatchReporter>(
        self,
        reporter: R2,
    ) -> IngestionCoordinator<F, S, N, R2> {
        IngestionCoordinator {
            fetcher: self.fetcher,
            store: self.store,
            notifier: self.notifier,
            taxonomy: self.taxonomy,
            config: self.config,
            orchestrator: self.orchestrator,
            reporter,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one full cycle.
    ///
    /// 1. Stored works still waiting for a theme are resolved again.
    /// 2. The declaration index and the deputy list are read.
    /// 3. Each deputy is assembled from its profile, works and declarations
    ///    and upserted, `range_size` deputies at a time.
    /// 4. Ballots are read, themed, their votes resolved against the roster,
    ///    and upserted.
    /// 5. Deputies not seen during the cycle are checked for an ended mandate.
    ///
    /// Nothing here fails the cycle: unavailable pages and store errors are
    /// logged and counted in the returned report.
    pub async fn run_cycle(&self) -> CycleReport {
        let report = CycleReport::start();
        let span = tracing::info_span!("cycle", run_id = %report.run_id);
        self.cycle(report).instrument(span).await
    }

    async fn cycle(&self, mut report: CycleReport) -> CycleReport {
        tracing::info!("Cycle started");
        let mut unclassified = Vec::new();

        report.reclassified = self.reclassify_pending().await;

        let (declarants, deputies) = join(self.declaration_index(), self.deputy_list()).await;
        let outcome = self
            .orchestrator
            .process_in_ranges(
                "deputies",
                &deputies,
                |deputy| self.ingest_deputy(deputy, declarants.as_deref()),
                &self.reporter,
            )
            .await;
        report.deputies_skipped = outcome.skipped;
        for entity in outcome.records {
            if entity.upsert.is_change() {
                report.deputies_updated += 1;
            } else {
                report.deputies_unchanged += 1;
            }
            unclassified.extend(entity.unclassified);
        }

        let roster = match self.store.roster().await {
            Ok(roster) => roster,
            Err(e) => {
                tracing::warn!(error = %e, "Roster unavailable, votes resolve by id only");
                Vec::new()
            }
        };
        let names = name_index(&roster);
        let ballots = self.ballot_list().await;
        let outcome = self
            .orchestrator
            .process_in_ranges(
                "ballots",
                &ballots,
                |ballot| self.ingest_ballot(ballot, &names),
                &self.reporter,
            )
            .await;
        report.ballots_skipped = outcome.skipped;
        for entity in outcome.records {
            if entity.upsert.is_change() {
                report.ballots_updated += 1;
            } else {
                report.ballots_unchanged += 1;
            }
            unclassified.extend(entity.unclassified);
        }
        self.notifier.batch_completed("ballots", report.ballots_updated);

        report.expired_mandates = self.sweep_expired(report.started_at).await;

        let mut seen = HashSet::new();
        unclassified.retain(|label| seen.insert(label.raw_text.clone()));
        for label in &unclassified {
            self.notifier.unclassified_label(label);
        }
        report.unclassified = unclassified;
        report.finished_at = Utc::now();

        tracing::info!(
            reclassified = report.reclassified,
            deputies_updated = report.deputies_updated,
            deputies_unchanged = report.deputies_unchanged,
            deputies_skipped = report.deputies_skipped,
            ballots_updated = report.ballots_updated,
            ballots_unchanged = report.ballots_unchanged,
            ballots_skipped = report.ballots_skipped,
            expired_mandates = report.expired_mandates,
            unclassified = report.unclassified.len(),
            "Cycle completed"
        );
        report
    }

    /// Give a theme to stored works whose label now resolves.
    async fn reclassify_pending(&self) -> usize {
        let pending = match self.store.unclassified_works().await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list unclassified works");
                return 0;
            }
        };

        let mut reclassified = 0;
        for work in pending {
            let Resolution::Matched(node) = self.taxonomy.resolve(&work.label, work.url.as_deref())
            else {
                continue;
            };
            match self
                .store
                .assign_work_theme(&work.deputy_official_id, &work.work_id, &node.to_ref())
                .await
            {
                Ok(()) => reclassified += 1,
                Err(e) => tracing::warn!(
                    deputy = %work.deputy_official_id,
                    work = %work.work_id,
                    error = %e,
                    "Could not assign theme"
                ),
            }
        }
        if reclassified > 0 {
            tracing::info!(reclassified, "Stored works reclassified");
        }
        reclassified
    }

    /// `None` when the index itself is unavailable.
    async fn declaration_index(&self) -> Option<Vec<DeclarantLink>> {
        let url = &self.config.declaration_index_url;
        let links = self
            .fetcher
            .fetch(url, EncodingMode::Text)
            .await
            .and_then(|body| parse_declaration_index(&body, url));
        if links.is_none() {
            tracing::warn!(%url, "Declaration index unavailable");
        }
        links
    }

    async fn deputy_list(&self) -> Vec<DeputySummary> {
        let url = &self.config.deputy_list_url;
        match self
            .fetcher
            .fetch(url, EncodingMode::Text)
            .await
            .and_then(|body| parse_deputy_list(&body))
        {
            Some(deputies) => {
                tracing::info!(count = deputies.len(), "Deputy list read");
                deputies
            }
            None => {
                tracing::warn!(%url, "Deputy list unavailable");
                Vec::new()
            }
        }
    }

    async fn ballot_list(&self) -> Vec<BallotSummary> {
        let url = &self.config.ballot_list_url;
        match self
            .fetcher
            .fetch(url, EncodingMode::Text)
            .await
            .and_then(|body| parse_ballot_list(&body))
        {
            Some(ballots) => {
                tracing::info!(count = ballots.len(), "Ballot list read");
                ballots
            }
            None => {
                tracing::warn!(%url, "Ballot list unavailable");
                Vec::new()
            }
        }
    }

    /// Assemble and store one deputy. `None` counts the deputy as skipped.
    async fn ingest_deputy(
        &self,
        summary: &DeputySummary,
        declarants: Option<&[DeclarantLink]>,
    ) -> Option<EntityOutcome> {
        let official_id = summary.official_id.as_str();
        // The stored record supplies the watermark and carried-over sub-resources.
        let stored = match self.store.find_deputy(official_id).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(%official_id, error = %e, "Could not read stored deputy, skipped");
                return None;
            }
        };

        let Some(page) = self.profile(official_id).await else {
            tracing::warn!(%official_id, "Profile unavailable, deputy skipped");
            return None;
        };

        let watermark = stored.as_ref().and_then(|s| s.last_work_date);
        let (fresh, declarations) = join(
            self.deputy_works(official_id, watermark),
            self.deputy_declarations(summary, declarants),
        )
        .await;

        let previous = stored.map(|s| s.record);
        let mut missing = Vec::new();

        let mut works = fresh.works;
        if let Some(previous) = &previous {
            let keys: HashSet<(WorkKind, String)> = works
                .iter()
                .map(|w| (w.kind, w.external_id.clone()))
                .collect();
            works.extend(
                previous
                    .works
                    .iter()
                    .filter(|w| !keys.contains(&(w.kind, w.external_id.clone())))
                    .cloned(),
            );
        }
        works.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });
        if fresh.failed {
            missing.push(SubResource::Works);
        }

        let declarations = match declarations {
            Some(declarations) => declarations,
            None => {
                missing.push(SubResource::Declarations);
                previous
                    .as_ref()
                    .map(|p| p.declarations.clone())
                    .unwrap_or_default()
            }
        };

        let mandates = match page.mandates {
            Some(mandates) => Some(mandates),
            None => {
                missing.push(SubResource::Mandates);
                previous.as_ref().and_then(|p| p.mandates.clone())
            }
        };

        let record = DeputyRecord {
            summary: summary.clone(),
            profile: page.profile,
            mandates,
            instances: page.instances,
            works,
            declarations,
            missing,
        };
        if record.is_partial() {
            tracing::debug!(%official_id, missing = ?record.missing, "Deputy record is partial");
        }

        match self.store.upsert_deputy(&record).await {
            Ok(upsert) => {
                if upsert.is_change() {
                    self.notifier.entity_updated(official_id);
                }
                Some(EntityOutcome {
                    upsert,
                    unclassified: fresh.unclassified,
                })
            }
            Err(e) => {
                tracing::warn!(%official_id, error = %e, "Could not store deputy");
                None
            }
        }
    }

    async fn profile(&self, official_id: &str) -> Option<ProfilePage> {
        let url = fill_template(&self.config.deputy_profile_url, &[("deputy_id", official_id)]);
        self.fetcher
            .fetch(&url, EncodingMode::Text)
            .await
            .and_then(|body| parse_profile(&body))
    }

    async fn deputy_works(&self, official_id: &str, watermark: Option<NaiveDate>) -> WorksOutcome {
        let per_kind = join_all(
            WorkKind::ALL
                .iter()
                .map(|&kind| self.works_of_kind(official_id, kind, watermark)),
        )
        .await;

        let mut failed = false;
        let mut listed = Vec::new();
        for (kind, outcome) in WorkKind::ALL.iter().zip(per_kind) {
            if outcome.failed() {
                tracing::debug!(%official_id, kind = kind.as_path(), "Work listing unavailable");
                failed = true;
            }
            listed.extend(outcome.items);
        }

        let enriched = join_all(listed.into_iter().map(|work| self.enrich_work(work))).await;
        let mut works = Vec::with_capacity(enriched.len());
        let mut unclassified = Vec::new();
        for (work, label) in enriched {
            works.push(work);
            unclassified.extend(label);
        }
        WorksOutcome {
            works,
            failed,
            unclassified,
        }
    }

    async fn works_of_kind(
        &self,
        official_id: &str,
        kind: WorkKind,
        watermark: Option<NaiveDate>,
    ) -> PaginationOutcome<WorkItemRecord> {
        let batch = format!("works:{}:{}", official_id, kind.as_path());
        self.orchestrator
            .paginate(
                &batch,
                watermark,
                self.config.work_page_size,
                move |cursor| {
                    let url = fill_template(
                        &self.config.deputy_works_url,
                        &[
                            ("deputy_id", official_id),
                            ("offset", &cursor.range_start.to_string()),
                            ("work_type", kind.as_path()),
                        ],
                    );
                    async move {
                        let body = self.fetcher.fetch(&url, EncodingMode::Text).await?;
                        parse_work_page(&body, &url, kind)
                    }
                },
                &self.reporter,
            )
            .await
    }

    /// Read the work's own page for its theme, then resolve it.
    async fn enrich_work(
        &self,
        mut work: WorkItemRecord,
    ) -> (WorkItemRecord, Option<UnclassifiedLabel>) {
        let mut label = None;
        if let Some(url) = work.url.as_deref().filter(|_| work.kind.has_detail_page()) {
            match self
                .fetcher
                .fetch(url, work.kind.detail_encoding())
                .await
                .and_then(|body| parse_work_detail(&body))
            {
                Some(detail) => {
                    if work.kind != WorkKind::Question {
                        if let Some(description) = detail.description {
                            work.description = description;
                        }
                    }
                    if work.kind.has_extra_infos() {
                        work.extra_infos = detail.extra_infos;
                    }
                    label = detail.theme;
                }
                None => tracing::debug!(%url, "Work detail unavailable"),
            }
        }

        let Some(label) = label.or_else(|| work.kind.default_theme().map(String::from)) else {
            return (work, None);
        };
        match self.taxonomy.resolve(&label, work.url.as_deref()) {
            Resolution::Matched(node) => {
                work.theme = Some(node.to_ref());
                work.unclassified_theme = None;
                (work, None)
            }
            Resolution::Unrecognized(unclassified) => {
                work.theme = None;
                work.unclassified_theme = Some(unclassified.raw_text.clone());
                (work, Some(unclassified))
            }
        }
    }

    /// `None` when the declarations could not be read this cycle.
    async fn deputy_declarations(
        &self,
        summary: &DeputySummary,
        declarants: Option<&[DeclarantLink]>,
    ) -> Option<Vec<DeclarationRecord>> {
        let Some(link) = find_declarant(declarants?, summary) else {
            tracing::debug!(official_id = %summary.official_id, "No declarant entry");
            return Some(Vec::new());
        };
        self.fetcher
            .fetch(&link.url, EncodingMode::Text)
            .await
            .and_then(|body| parse_declarations(&body, &link.url))
    }

    async fn ingest_ballot(
        &self,
        summary: &BallotSummary,
        names: &HashMap<String, String>,
    ) -> Option<EntityOutcome> {
        let official_id = summary.official_id.as_str();
        let url = fill_template(&self.config.ballot_url, &[("ballot_id", official_id)]);
        let Some(mut ballot) = self
            .fetcher
            .fetch(&url, EncodingMode::Text)
            .await
            .and_then(|body| parse_ballot(&body, &url, official_id))
        else {
            tracing::warn!(%official_id, "Ballot unavailable, skipped");
            return None;
        };

        let mut unclassified = Vec::new();
        if let Some(unrecognized) = self.theme_ballot(&mut ballot).await {
            unclassified.push(unrecognized);
        }
        resolve_votes(&mut ballot, names);

        match self.store.upsert_ballot(&ballot).await {
            Ok(upsert) => Some(EntityOutcome {
                upsert,
                unclassified,
            }),
            Err(e) => {
                tracing::warn!(%official_id, error = %e, "Could not store ballot");
                None
            }
        }
    }

    async fn theme_ballot(&self, ballot: &mut BallotRecord) -> Option<UnclassifiedLabel> {
        let file_url = ballot.file_url.clone()?;
        let label = self.law_theme(&file_url).await?;
        match self.taxonomy.resolve(&label, Some(file_url.as_str())) {
            Resolution::Matched(node) => {
                ballot.theme = Some(node.to_ref());
                None
            }
            Resolution::Unrecognized(unclassified) => {
                ballot.unclassified_theme = Some(unclassified.raw_text.clone());
                Some(unclassified)
            }
        }
    }

    /// Theme label of a legislative file, falling back to its Senate copy.
    async fn law_theme(&self, url: &str) -> Option<String> {
        let law = self
            .fetcher
            .fetch(url, EncodingMode::Text)
            .await
            .and_then(|body| parse_law(&body, url))?;
        if law.theme_label.is_some() {
            return law.theme_label;
        }
        let senate_url = law.senate_url?;
        self.fetcher
            .fetch(&senate_url, EncodingMode::Binary)
            .await
            .and_then(|body| parse_senate_theme(&body))
    }

    /// Record the end of mandate of deputies the cycle did not see.
    async fn sweep_expired(&self, since: DateTime<Utc>) -> usize {
        let stale = match self.store.deputies_not_seen_since(since).await {
            Ok(stale) => stale,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list unseen deputies");
                return 0;
            }
        };
        if stale.is_empty() {
            return 0;
        }
        tracing::info!(count = stale.len(), "Checking mandates of unseen deputies");
        self.orchestrator
            .process_in_ranges(
                "mandates",
                &stale,
                |deputy| self.check_mandate(deputy),
                &self.reporter,
            )
            .await
            .records
            .len()
    }

    async fn check_mandate(&self, deputy: &RosterEntry) -> Option<()> {
        let official_id = deputy.official_id.as_str();
        let end = self.profile(official_id).await?.profile.end_of_mandate?;
        match self.store.record_end_of_mandate(official_id, &end).await {
            Ok(()) => {
                tracing::info!(%official_id, date = ?end.date, reason = %end.reason, "Mandate ended");
                self.notifier.entity_updated(official_id);
                Some(())
            }
            Err(e) => {
                tracing::warn!(%official_id, error = %e, "Could not record end of mandate");
                None
            }
        }
    }
}

/// Normalized name, in both orders, to official id.
fn name_index(roster: &[RosterEntry]) -> HashMap<String, String> {
    let mut names = HashMap::with_capacity(roster.len() * 2);
    for entry in roster {
        for name in [
            format!("{} {}", entry.first_name, entry.last_name),
            format!("{} {}", entry.last_name, entry.first_name),
        ] {
            names.insert(normalize_name(&name), entry.official_id.clone());
        }
    }
    names
}

/// Fill missing vote ids from the roster and drop votes that stay unknown.
fn resolve_votes(ballot: &mut BallotRecord, names: &HashMap<String, String>) {
    let before = ballot.votes.len();
    ballot.votes.retain_mut(|vote| {
        if vote.official_id.is_none() {
            vote.official_id = names.get(&vote_key(&vote.deputy_name)).cloned();
        }
        vote.official_id.is_some()
    });
    let dropped = before - ballot.votes.len();
    if dropped > 0 {
        tracing::debug!(ballot = %ballot.official_id, dropped, "Unresolved votes dropped");
    }
}

/// Normalized name without a leading civility ("M.", "Mme").
fn vote_key(name: &str) -> String {
    let name = normalize_name(name);
    ["m. ", "mme "]
        .iter()
        .find_map(|civility| name.strip_prefix(civility))
        .map(str::to_string)
        .unwrap_or(name)
}
