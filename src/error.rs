// =============================================================================
// error.rs - EVERY WAY A PROBE CAN GO SIDEWAYS
// =============================================================================
//
// Probe errors never escape the executor. They exist so the executor can say
// precisely what happened in its logs before flattening everything into a
// ProbeOutcome. A scan does not fail because one service had a bad day.
//
// Catalog errors are different: a broken catalog is a broken scan, so those
// propagate all the way up to the CLI.
// =============================================================================

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::models::ProbeOutcome;

/// Why a probe did not produce a clean FOUND.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// DNS, connect, TLS, or body read failure.
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// 403 or 429: access denied or rate limited.
    #[error("blocked with HTTP {0}")]
    Blocked(u16),

    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    /// 200 OK, but the body contained a configured negative-match string.
    #[error("200 OK but body matched '{0}'")]
    ContentMismatch(String),
}

impl ProbeError {
    /// The outcome this error is reported as.
    pub fn outcome(&self) -> ProbeOutcome {
        match self {
            ProbeError::Transport(_) => ProbeOutcome::Error,
            ProbeError::Timeout(_) => ProbeOutcome::Error,
            ProbeError::Blocked(_) => ProbeOutcome::Blocked,
            ProbeError::UnexpectedStatus(_) => ProbeOutcome::Error,
            ProbeError::ContentMismatch(_) => ProbeOutcome::NotFound,
        }
    }
}

/// Problems loading or validating a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("entry '{name}': template '{template}' has no '{{}}' placeholder")]
    MissingPlaceholder { name: String, template: String },

    #[error("entry '{name}': template '{template}' is not a valid URL: {reason}")]
    InvalidUrl {
        name: String,
        template: String,
        reason: String,
    },

    #[error("duplicate catalog entry '{0}'")]
    DuplicateName(String),

    #[error("catalog entry with an empty name")]
    EmptyName,
}
