use std::fmt;

/// Version assigned to a freshly created spec.
pub const SPEC_BASE_VERSION: &str = "0.1.0";

/// `major.minor.patch` version of a spec document.
///
/// Parsing is lenient: missing or non-numeric components read as zero so a
/// hand-edited document never blocks a version bump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SpecVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SpecVersion {
    pub fn parse(s: &str) -> Self {
        let mut parts = s
            .trim()
            .trim_start_matches('v')
            .split('.')
            .map(|p| p.trim().parse::<u32>().unwrap_or(0));
        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            patch: parts.next().unwrap_or(0),
        }
    }

    pub fn add(self, major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major: self.major.saturating_add(major),
            minor: self.minor.saturating_add(minor),
            patch: self.patch.saturating_add(patch),
        }
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// One patch step past `version`.
pub fn bump_patch(version: &str) -> String {
    SpecVersion::parse(version).add(0, 0, 1).to_string()
}
