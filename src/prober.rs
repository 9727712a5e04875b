// =============================================================================
// prober.rs - ONE SERVICE, ONE KNOCK
// =============================================================================
//
// The probe executor. Given a catalog entry and a username it:
//
//   1. renders the profile URL and the check URL,
//   2. optionally wraps the check URL in the forwarding proxy,
//   3. fires a single GET with a hard deadline,
//   4. hands status + body to the classifier,
//   5. returns a ScanResult.
//
// It never returns an error and it never panics on purpose. Every failure we
// know about is folded into the outcome. The scan coordinator relies on this:
// one probe in, exactly one result out.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::classifier::classify_response;
use crate::config::Config;
use crate::error::ProbeError;
use crate::models::{CatalogEntry, ProbeOutcome, ScanResult};
use crate::transport::{HttpTransport, ProbeRequest};

/// Hard deadline for one probe, measured from dispatch.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(8);

/// Public CORS proxy. The target URL is appended percent-encoded.
pub const DEFAULT_PROXY_BASE_URL: &str = "https://api.allorigins.win/raw?url=";

/// Some services serve different pages to things that do not look like a
/// browser, so direct requests pretend to be desktop Chrome.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Knobs for the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    pub timeout: Duration,
    pub proxy_base_url: String,
    pub user_agent: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
            proxy_base_url: DEFAULT_PROXY_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ProbeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.probe_timeout,
            proxy_base_url: config.proxy_base_url.clone(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Wrap `target` as a query parameter of the forwarding proxy.
pub fn proxied_url(proxy_base_url: &str, target: &str) -> String {
    format!("{}{}", proxy_base_url, urlencoding::encode(target))
}

/// The probe executor. Cheap to share: the coordinator holds one behind an
/// `Arc` and every worker borrows it.
pub struct Prober {
    transport: Arc<dyn HttpTransport>,
    settings: ProbeSettings,
}

impl Prober {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: ProbeSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Build the outbound request for `entry` without sending it.
    pub fn build_request(
        &self,
        entry: &CatalogEntry,
        identifier: &str,
        use_forwarding_proxy: bool,
    ) -> ProbeRequest {
        let target = entry.check_target(identifier);
        // Only a 200 from an entry with negative-match strings needs its body.
        let read_body_on_ok = entry.has_error_strings();

        if use_forwarding_proxy {
            ProbeRequest {
                url: proxied_url(&self.settings.proxy_base_url, &target),
                user_agent: None,
                read_body_on_ok,
            }
        } else {
            ProbeRequest {
                url: target,
                user_agent: Some(self.settings.user_agent.clone()),
                read_body_on_ok,
            }
        }
    }

    /// Probe one entry. Always yields a result.
    ///
    /// Latency is wall-clock time from dispatch to completion or to the
    /// deadline. A transport failure (as opposed to a timeout) reports 0.
    pub async fn probe(
        &self,
        entry: &Arc<CatalogEntry>,
        identifier: &str,
        use_forwarding_proxy: bool,
    ) -> ScanResult {
        let profile_url = entry.profile_url(identifier);
        let request = self.build_request(entry, identifier, use_forwarding_proxy);

        let start = Instant::now();
        let fetched = tokio::time::timeout(self.settings.timeout, self.transport.fetch(&request)).await;

        let (outcome, latency_ms) = match fetched {
            Err(_) => {
                let latency_ms = elapsed_ms(start);
                let err = ProbeError::Timeout(self.settings.timeout);
                debug!(entry = %entry.name, url = %request.url, latency_ms, error = %err, "Probe abandoned at deadline");
                (err.outcome(), latency_ms)
            }
            Ok(Err(err)) => {
                debug!(entry = %entry.name, url = %request.url, error = %err, "Probe transport failure");
                (err.outcome(), 0)
            }
            Ok(Ok(response)) => {
                let latency_ms = elapsed_ms(start);
                let outcome = match classify_response(
                    response.status,
                    response.body.as_deref(),
                    &entry.error_strings,
                ) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        debug!(entry = %entry.name, status = response.status, error = %err, "Probe classified from error rule");
                        err.outcome()
                    }
                };
                (outcome, latency_ms)
            }
        };

        debug!(
            entry = %entry.name,
            outcome = %outcome,
            latency_ms,
            "Probe complete"
        );

        ScanResult::new(Arc::clone(entry), outcome, profile_url, latency_ms)
    }

    /// The result reported for a probe that died before reaching a verdict.
    pub fn aborted(entry: &Arc<CatalogEntry>, identifier: &str) -> ScanResult {
        ScanResult::new(
            Arc::clone(entry),
            ProbeOutcome::Unknown,
            entry.profile_url(identifier),
            0,
        )
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
