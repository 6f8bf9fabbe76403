use std::time::Duration;

use crate::error::AppError;
use crate::resilient::FetchPolicy;

const BASE_URL: &str = "http://www2.assemblee-nationale.fr/";
const DECLARATIONS_BASE_URL: &str = "http://www.hatvp.fr/";

/// Everything one ingestion cycle needs to know besides its collaborators.
///
/// URL templates use `{deputy_id}`, `{offset}`, `{work_type}` and
/// `{ballot_id}` placeholders.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub deputy_list_url: String,
    pub deputy_profile_url: String,
    pub deputy_works_url: String,
    pub declaration_index_url: String,
    pub ballot_list_url: String,
    pub ballot_url: String,

    /// Items processed concurrently per range.
    pub range_size: usize,
    /// Items per page of a work listing.
    pub work_page_size: usize,
    /// Upper bound on pages requested per work listing.
    pub max_pages: usize,

    pub request_timeout: Duration,
    pub fetch_policy: FetchPolicy,

    /// Local hours at which scheduled cycles start.
    pub schedule_hours: Vec<u32>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            deputy_list_url: format!("{BASE_URL}deputes/liste/departements/(vue)/tableau"),
            deputy_profile_url: format!("{BASE_URL}deputes/fiche/OMC_PA{{deputy_id}}"),
            deputy_works_url: format!(
                "{BASE_URL}deputes/documents_parlementaires/(offset)/{{offset}}/(id_omc)/OMC_PA{{deputy_id}}/(type)/{{work_type}}"
            ),
            declaration_index_url: format!(
                "{DECLARATIONS_BASE_URL}resultat-de-recherche-avancee/?document=&mandat=depute&region=0&dep="
            ),
            ballot_list_url: format!("{BASE_URL}scrutins/liste/(legislature)/15"),
            ballot_url: format!("{BASE_URL}scrutins/detail/(legislature)/15/(num)/{{ballot_id}}"),
            range_size: 20,
            work_page_size: 10,
            max_pages: 50,
            request_timeout: Duration::from_secs(60),
            fetch_policy: FetchPolicy::default(),
            schedule_hours: vec![10, 18],
        }
    }
}

impl IngestConfig {
    /// Defaults overridden by `HEMICYCLE_*` environment variables.
    ///
    /// - `HEMICYCLE_DEPUTY_LIST_URL`, `HEMICYCLE_DEPUTY_PROFILE_URL`,
    ///   `HEMICYCLE_DEPUTY_WORKS_URL`, `HEMICYCLE_DECLARATION_INDEX_URL`,
    ///   `HEMICYCLE_BALLOT_LIST_URL`, `HEMICYCLE_BALLOT_URL`
    /// - `HEMICYCLE_RANGE_SIZE` (default 20), `HEMICYCLE_WORK_PAGE_SIZE` (10),
    ///   `HEMICYCLE_MAX_PAGES` (50)
    /// - `HEMICYCLE_TIMEOUT_SECS` (60), `HEMICYCLE_MAX_ATTEMPTS` (3),
    ///   `HEMICYCLE_MIN_CONTENT_LENGTH` (1000), `HEMICYCLE_RETRY_DELAY_MS` (0)
    /// - `HEMICYCLE_SCHEDULE_HOURS` (comma-separated, default `10,18`)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        let urls = [
            ("HEMICYCLE_DEPUTY_LIST_URL", &mut config.deputy_list_url),
            ("HEMICYCLE_DEPUTY_PROFILE_URL", &mut config.deputy_profile_url),
            ("HEMICYCLE_DEPUTY_WORKS_URL", &mut config.deputy_works_url),
            ("HEMICYCLE_DECLARATION_INDEX_URL", &mut config.declaration_index_url),
            ("HEMICYCLE_BALLOT_LIST_URL", &mut config.ballot_list_url),
            ("HEMICYCLE_BALLOT_URL", &mut config.ballot_url),
        ];
        for (key, slot) in urls {
            if let Some(value) = lookup(key) {
                url::Url::parse(&value).map_err(|e| {
                    AppError::ConfigError(format!("Invalid {key} '{value}': {e}"))
                })?;
                *slot = value;
            }
        }

        if let Some(n) = positive(&lookup, "HEMICYCLE_RANGE_SIZE")? {
            config.range_size = n;
        }
        if let Some(n) = positive(&lookup, "HEMICYCLE_WORK_PAGE_SIZE")? {
            config.work_page_size = n;
        }
        if let Some(n) = positive(&lookup, "HEMICYCLE_MAX_PAGES")? {
            config.max_pages = n;
        }
        if let Some(secs) = positive(&lookup, "HEMICYCLE_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(n) = positive(&lookup, "HEMICYCLE_MAX_ATTEMPTS")? {
            config.fetch_policy = config.fetch_policy.with_max_attempts(n as u32);
        }
        if let Some(n) = positive(&lookup, "HEMICYCLE_MIN_CONTENT_LENGTH")? {
            config.fetch_policy = config.fetch_policy.with_min_content_length(n);
        }
        if let Some(raw) = lookup("HEMICYCLE_RETRY_DELAY_MS") {
            let ms: u64 = raw.parse().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid HEMICYCLE_RETRY_DELAY_MS '{raw}': must be a non-negative integer"
                ))
            })?;
            let delay = Duration::from_millis(ms);
            config.fetch_policy = config.fetch_policy.with_retry_delay(delay, delay / 2);
        }
        if let Some(raw) = lookup("HEMICYCLE_SCHEDULE_HOURS") {
            config.schedule_hours = parse_hours(&raw)?;
        }

        Ok(config)
    }
}

fn positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<usize>, AppError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(AppError::ConfigError(format!(
            "Invalid {key} '{raw}': must be a positive integer"
        ))),
    }
}

/// `"10,18"` -> `[10, 18]`, sorted and deduplicated.
pub fn parse_hours(raw: &str) -> Result<Vec<u32>, AppError> {
    let mut hours = raw
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(|h| match h.parse::<u32>() {
            Ok(hour) if hour < 24 => Ok(hour),
            _ => Err(AppError::ConfigError(format!(
                "Invalid schedule hour '{h}': must be between 0 and 23"
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if hours.is_empty() {
        return Err(AppError::ConfigError(
            "At least one schedule hour is required".into(),
        ));
    }
    hours.sort_unstable();
    hours.dedup();
    Ok(hours)
}
