//! Branch version parsing and the eligibility policy built on it.
//!
//! Branch names such as `5.11`, `v5.12.1` or `wip/5.10` carry a Qt version;
//! others (`dev`, `qtwayland-dev`) carry none and are eligible by default.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// A `major.minor[.patch]` version extracted from a branch name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    /// `None` when the branch only names `major.minor`.
    pub patch: Option<u32>,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.patch {
            Some(patch) => write!(f, "{}.{}.{}", self.major, self.minor, patch),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"v?(\d+)\.(\d+)(?:\.(\d+))?").expect("static regex"))
}

/// Extract the first version found in `branch`.
///
/// Returns `None` when no `major.minor` pattern is present, or when a
/// captured number does not fit in a `u32`.
pub fn parse(branch: &str) -> Option<Version> {
    let caps = version_re().captures(branch)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    let patch = match caps.get(3) {
        Some(m) => Some(m.as_str().parse().ok()?),
        None => None,
    };
    Some(Version { major, minor, patch })
}

/// Oldest Qt 5 minor release that is still tested.
pub const MIN_QT5_MINOR: u32 = 11;

/// Whether a change on `branch` should be tested at all.
///
/// Only branches that parse to `5.x` with `x < 11` are rejected.
pub fn is_eligible(branch: &str) -> bool {
    match parse(branch) {
        Some(v) => !(v.major == 5 && v.minor < MIN_QT5_MINOR),
        None => true,
    }
}
