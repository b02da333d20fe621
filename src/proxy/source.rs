//! Proxy candidate sources
//!
//! Candidates are always supplied by the caller; these helpers only turn text the
//! caller already has (a list file, a proxy-API response body) into candidates.

use crate::error::Result;
use crate::types::ProxyCandidate;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

// The pattern is a literal and known to compile
#[allow(clippy::expect_used)]
fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}:\d{1,5}\b").expect("valid proxy address pattern")
    })
}

/// Extract every `ip:port` occurrence from free text, first occurrence order, deduplicated
pub fn parse_candidates(text: &str) -> Vec<ProxyCandidate> {
    let mut seen = HashSet::new();
    address_pattern()
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|address| seen.insert(*address))
        .map(ProxyCandidate::new)
        .collect()
}

/// Parse a newline-separated address list
///
/// Blank lines and lines starting with `#` are skipped; everything else is taken
/// verbatim (trimmed), so hostnames work too.
pub fn parse_candidate_lines(text: &str) -> Vec<ProxyCandidate> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ProxyCandidate::new)
        .collect()
}

/// Read a newline-separated address list from disk
pub async fn load_candidates(path: impl AsRef<Path>) -> Result<Vec<ProxyCandidate>> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path).await?;
    let candidates = parse_candidate_lines(&text);
    tracing::debug!(path = %path.display(), count = candidates.len(), "Loaded proxy candidates");
    Ok(candidates)
}
