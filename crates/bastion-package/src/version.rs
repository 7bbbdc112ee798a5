use semver::{Version, VersionReq};
use std::cmp::Ordering;

/// Semantic-version ordering used for update decisions and host
/// compatibility checks.
pub trait VersionComparator: Send + Sync {
    fn compare(&self, a: &str, b: &str) -> Ordering;

    /// Whether `version` satisfies the requirement `range` (e.g. `>=1.2, <2`).
    fn satisfies(&self, version: &str, range: &str) -> bool;

    fn is_newer(&self, candidate: &str, current: &str) -> bool {
        self.compare(candidate, current) == Ordering::Greater
    }
}

/// [`VersionComparator`] backed by the `semver` crate.
///
/// Accepts a leading `v` and short forms (`1.2` → `1.2.0`). Strings that still
/// do not parse are ordered as plain strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemverComparator;

fn parse_lenient(s: &str) -> Option<Version> {
    let s = s.trim();
    let s = s.strip_prefix('v').unwrap_or(s);
    if let Ok(v) = Version::parse(s) {
        return Some(v);
    }
    let parts: Vec<&str> = s.split('.').collect();
    if parts.is_empty() || parts.len() > 2 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }
    let padded = match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        _ => format!("{}.{}.0", parts[0], parts[1]),
    };
    Version::parse(&padded).ok()
}

impl VersionComparator for SemverComparator {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        match (parse_lenient(a), parse_lenient(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a.cmp(b),
        }
    }

    fn satisfies(&self, version: &str, range: &str) -> bool {
        match (parse_lenient(version), VersionReq::parse(range)) {
            (Some(v), Ok(req)) => req.matches(&v),
            _ => false,
        }
    }
}
