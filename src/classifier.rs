// =============================================================================
// classifier.rs - THE RULE TABLE
// =============================================================================
//
// Status code in, verdict out. No sockets, no clocks, no state. Given the same
// (status, body, error strings) triple this module always says the same thing,
// which is what lets us test the entire decision table without the network.
//
// Precedence, first match wins:
//
//   200 + error strings + body contains one  -> NOT_FOUND
//   200                                      -> FOUND
//   404                                      -> NOT_FOUND
//   403 / 429                                -> BLOCKED
//   anything else                            -> ERROR
//
// Transport failures and timeouts never reach this module; the executor
// handles those before there is a status to look at.
//
// Known false positive source: a service that serves a generic 200 landing
// page for missing users, and has no error strings configured, reads as FOUND.
// We keep that behavior because nothing here can tell the difference.
// =============================================================================

use aho_corasick::AhoCorasick;
use tracing::warn;

use crate::error::ProbeError;
use crate::models::ProbeOutcome;

/// Classify a completed HTTP response.
///
/// `Ok` carries the clean verdicts (FOUND for 200, NOT_FOUND for 404).
/// Everything else comes back as the `ProbeError` explaining it, which the
/// caller can log and then flatten with [`ProbeError::outcome`].
pub fn classify_response(
    status: u16,
    body: Option<&str>,
    error_strings: &[String],
) -> Result<ProbeOutcome, ProbeError> {
    match status {
        200 => {
            if !error_strings.is_empty() {
                if let Some(matched) = body.and_then(|b| find_negative_match(b, error_strings)) {
                    return Err(ProbeError::ContentMismatch(matched.to_string()));
                }
            }
            Ok(ProbeOutcome::Found)
        }
        404 => Ok(ProbeOutcome::NotFound),
        403 | 429 => Err(ProbeError::Blocked(status)),
        other => Err(ProbeError::UnexpectedStatus(other)),
    }
}

/// [`classify_response`] flattened to an outcome.
pub fn classify(status: u16, body: Option<&str>, error_strings: &[String]) -> ProbeOutcome {
    classify_response(status, body, error_strings).unwrap_or_else(|e| e.outcome())
}

/// Return the first configured error string found in `body`, if any.
///
/// Matching is literal and case-sensitive. All patterns are searched in a
/// single pass with an Aho-Corasick automaton.
pub fn find_negative_match<'a>(body: &str, error_strings: &'a [String]) -> Option<&'a str> {
    if error_strings.is_empty() {
        return None;
    }

    match AhoCorasick::new(error_strings) {
        Ok(automaton) => automaton
            .find(body)
            .map(|m| error_strings[m.pattern().as_usize()].as_str()),
        Err(e) => {
            warn!(error = %e, "Negative-match automaton failed to build, falling back to substring search");
            error_strings
                .iter()
                .find(|s| body.contains(s.as_str()))
                .map(String::as_str)
        }
    }
}
