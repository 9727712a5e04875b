// =============================================================================
// models.rs - THE SHAPES OF A USERNAME HUNT
// =============================================================================
//
// Everything the engine passes around lives here: the catalog entries we probe,
// the verdict we reach for each one, and the receipt we hand back when a scan
// is done.
//
// A catalog entry is born once at startup and never touched again. A result is
// born once per entry per scan and belongs to whoever receives it. Nothing in
// this file is mutable after construction, and that is the whole point.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::metrics::MetricsSnapshot;

/// The placeholder that marks where the username goes in a URL template.
pub const PLACEHOLDER: &str = "{}";

/// The closed set of service categories. Used for grouping in whatever
/// consumes the results; the engine itself never branches on it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SiteCategory {
    Social,
    Developer,
    Gaming,
    Video,
    Adult,
    Blogging,
    /// Chinese-language services (Bilibili, Zhihu, Weibo and friends).
    #[serde(rename = "China")]
    RegionalCn,
    Other,
}

impl fmt::Display for SiteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteCategory::Social => write!(f, "Social"),
            SiteCategory::Developer => write!(f, "Developer"),
            SiteCategory::Gaming => write!(f, "Gaming"),
            SiteCategory::Video => write!(f, "Video"),
            SiteCategory::Adult => write!(f, "Adult"),
            SiteCategory::Blogging => write!(f, "Blogging"),
            SiteCategory::RegionalCn => write!(f, "China"),
            SiteCategory::Other => write!(f, "Other"),
        }
    }
}

/// One service in the catalog.
///
/// `url` is the human-facing profile page. `check_url`, when present, is what
/// we actually request (usually a JSON API that answers 404 honestly where the
/// profile page would not). Both are templates with a single `{}`.
///
/// `error_strings` are literal fragments that, when found in a 200 body, mean
/// the service is politely lying to us and the user does not exist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,

    pub url: String,

    #[serde(default, alias = "checkUrl", skip_serializing_if = "Option::is_none")]
    pub check_url: Option<String>,

    pub category: SiteCategory,

    #[serde(
        default,
        alias = "errorMsg",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub error_strings: Vec<String>,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, url: impl Into<String>, category: SiteCategory) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            check_url: None,
            category,
            error_strings: Vec::new(),
        }
    }

    pub fn with_check_url(mut self, check_url: impl Into<String>) -> Self {
        self.check_url = Some(check_url.into());
        self
    }

    pub fn with_error_strings<I, S>(mut self, strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.error_strings = strings.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a 200 from this service has to be checked against
    /// `error_strings` before it counts as FOUND.
    pub fn has_error_strings(&self) -> bool {
        !self.error_strings.is_empty()
    }

    /// The canonical profile URL for `identifier`. This is what results
    /// report, regardless of what we actually requested.
    pub fn profile_url(&self, identifier: &str) -> String {
        render_template(&self.url, identifier)
    }

    /// The URL the probe actually hits: the check template if there is one,
    /// otherwise the profile URL.
    pub fn check_target(&self, identifier: &str) -> String {
        match &self.check_url {
            Some(template) => render_template(template, identifier),
            None => self.profile_url(identifier),
        }
    }
}

/// Substitute `identifier` into the first `{}` of `template`.
///
/// Exactly one substitution happens, so an identifier that itself contains
/// `{}` comes out verbatim instead of recursing.
pub fn render_template(template: &str, identifier: &str) -> String {
    template.replacen(PLACEHOLDER, identifier, 1)
}

/// `errorMsg` in hand-written catalogs is sometimes a string and sometimes a
/// list. We accept both and always store a list.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// The verdict for one entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeOutcome {
    /// 200 OK and no negative-match string in sight.
    Found,
    /// 404, or a 200 whose body admits the user does not exist.
    NotFound,
    /// 403 or 429. The service saw us coming.
    Blocked,
    /// Transport failure, timeout, or a status we have no rule for.
    Error,
    /// The probe itself fell over before it could reach a verdict.
    Unknown,
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Found => write!(f, "FOUND"),
            ProbeOutcome::NotFound => write!(f, "NOT_FOUND"),
            ProbeOutcome::Blocked => write!(f, "BLOCKED"),
            ProbeOutcome::Error => write!(f, "ERROR"),
            ProbeOutcome::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// One completed probe. Built by the executor, handed to the sink, never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub entry: Arc<CatalogEntry>,
    pub outcome: ProbeOutcome,
    /// Always the human-facing profile URL, never the check or proxied URL.
    pub profile_url: String,
    pub latency_ms: u64,
    pub checked_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn new(
        entry: Arc<CatalogEntry>,
        outcome: ProbeOutcome,
        profile_url: String,
        latency_ms: u64,
    ) -> Self {
        Self {
            entry,
            outcome,
            profile_url,
            latency_ms,
            checked_at: Utc::now(),
        }
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:<9}] {} ({}) {} ({} ms)",
            self.outcome.to_string(),
            self.entry.name,
            self.entry.category,
            self.profile_url,
            self.latency_ms
        )
    }
}

/// What a scan hands back once the last result is out the door.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub session_id: Uuid,
    pub identifier: String,
    pub total: u64,
    #[serde(flatten)]
    pub counts: MetricsSnapshot,
    /// True when a shutdown signal stopped dispatch before the queue drained.
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ScanSummary {
    /// Entries that never left the queue because the scan was cancelled.
    pub fn skipped(&self) -> u64 {
        self.total.saturating_sub(self.counts.dispatched)
    }
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scan {} for '{}': {}/{} checked, {} found, {} not found, {} blocked, {} error, {} unknown in {} ms{}",
            self.session_id,
            self.identifier,
            self.counts.completed,
            self.total,
            self.counts.found,
            self.counts.not_found,
            self.counts.blocked,
            self.counts.error,
            self.counts.unknown,
            self.elapsed_ms,
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}
