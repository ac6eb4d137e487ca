use anyhow::{anyhow, bail, Result};
use semver::{BuildMetadata, Prerelease, Version};
use std::fmt;

/// Parse a NuGet-style version string. Short forms pad to three parts
/// ("1.0" becomes 1.0.0); prerelease and build metadata pass through.
pub fn parse_version(input: &str) -> Result<Version> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        bail!("empty version string");
    }
    let (rest, build) = match trimmed.split_once('+') {
        Some((head, tail)) => (head, Some(tail)),
        None => (trimmed, None),
    };
    let (numeric, pre) = match rest.split_once('-') {
        Some((head, tail)) => (head, Some(tail)),
        None => (rest, None),
    };
    let parts: Vec<&str> = numeric.split('.').collect();
    if parts.len() > 4 {
        bail!("unsupported version '{input}': too many numeric parts");
    }
    // Legacy four-part forms are common on real feeds; a zero revision
    // is the three-part version, anything else has no representation.
    if parts.len() == 4 {
        let revision: u64 = parts[3]
            .parse()
            .map_err(|_| anyhow!("invalid version component '{}' in '{input}'", parts[3]))?;
        if revision != 0 {
            bail!("unsupported version '{input}': nonzero revision");
        }
    }
    let mut nums = [0u64; 3];
    for (slot, part) in nums.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| anyhow!("invalid version component '{part}' in '{input}'"))?;
    }
    let mut version = Version::new(nums[0], nums[1], nums[2]);
    if let Some(pre) = pre {
        version.pre =
            Prerelease::new(pre).map_err(|e| anyhow!("invalid prerelease tag in '{input}': {e}"))?;
    }
    if let Some(build) = build {
        version.build = BuildMetadata::new(build)
            .map_err(|e| anyhow!("invalid build metadata in '{input}': {e}"))?;
    }
    Ok(version)
}

/// A NuGet version range. Parsed from the bracket grammar:
/// `1.0` is "1.0 or higher", `[1.0]` exactly 1.0, `(,1.0]` up to and
/// including 1.0, `(1.0,2.0)` exclusive both ends, `[1.0,2.0]` inclusive
/// both ends. `(1.0)` and `(,)` are invalid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    min: Option<Version>,
    min_inclusive: bool,
    max: Option<Version>,
    max_inclusive: bool,
    include_prerelease: bool,
}

impl VersionRange {
    /// The unbounded sentinel accepting every release version.
    pub fn all() -> Self {
        Self {
            min: None,
            min_inclusive: true,
            max: None,
            max_inclusive: true,
            include_prerelease: false,
        }
    }

    pub fn exact(version: Version) -> Self {
        Self {
            min: Some(version.clone()),
            min_inclusive: true,
            max: Some(version),
            max_inclusive: true,
            include_prerelease: false,
        }
    }

    pub fn with_prerelease(mut self, include: bool) -> Self {
        self.include_prerelease = include;
        self
    }

    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            bail!("empty version range");
        }
        if trimmed == "*" {
            return Ok(Self::all());
        }
        let Some(first) = trimmed.chars().next() else {
            bail!("empty version range");
        };
        if first != '[' && first != '(' {
            // Plain version: minimum bound, inclusive.
            return Ok(Self {
                min: Some(parse_version(trimmed)?),
                min_inclusive: true,
                max: None,
                max_inclusive: true,
                include_prerelease: false,
            });
        }
        let min_inclusive = first == '[';
        let max_inclusive = match trimmed.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => bail!("version range '{input}' is missing a closing bracket"),
        };
        let inner = &trimmed[1..trimmed.len() - 1];
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        if parts.len() > 2 {
            bail!("version range '{input}' has too many bounds");
        }
        if parts.iter().all(|p| p.is_empty()) {
            bail!("version range '{input}' has no bounds");
        }
        let (min_text, max_text) = if parts.len() == 2 {
            (parts[0], parts[1])
        } else {
            // A single bracketed version is only valid as an exact pin.
            if !(min_inclusive && max_inclusive) {
                bail!("version range '{input}' must use [v] for an exact version");
            }
            (parts[0], parts[0])
        };
        let min = if min_text.is_empty() {
            None
        } else {
            Some(parse_version(min_text)?)
        };
        let max = if max_text.is_empty() {
            None
        } else {
            Some(parse_version(max_text)?)
        };
        if let (Some(min), Some(max)) = (&min, &max) {
            if min > max {
                bail!("version range '{input}' is empty: minimum exceeds maximum");
            }
        }
        Ok(Self {
            min,
            min_inclusive,
            max,
            max_inclusive,
            include_prerelease: false,
        })
    }

    pub fn min(&self) -> Option<&Version> {
        self.min.as_ref()
    }

    pub fn max(&self) -> Option<&Version> {
        self.max.as_ref()
    }

    pub fn is_min_inclusive(&self) -> bool {
        self.min_inclusive
    }

    pub fn is_max_inclusive(&self) -> bool {
        self.max_inclusive
    }

    pub fn includes_prerelease(&self) -> bool {
        self.include_prerelease
    }

    pub fn is_exact(&self) -> bool {
        self.min_inclusive
            && self.max_inclusive
            && matches!((&self.min, &self.max), (Some(min), Some(max)) if min == max)
    }

    fn has_prerelease_bound(&self) -> bool {
        self.min.as_ref().is_some_and(|v| !v.pre.is_empty())
            || self.max.as_ref().is_some_and(|v| !v.pre.is_empty())
    }

    /// Whether `version` falls inside the range. Prerelease versions only
    /// match when the range opts in or a bound itself is a prerelease.
    pub fn satisfies(&self, version: &Version) -> bool {
        if !version.pre.is_empty() && !self.include_prerelease && !self.has_prerelease_bound() {
            return false;
        }
        if let Some(min) = &self.min {
            match version.cmp(min) {
                std::cmp::Ordering::Less => return false,
                std::cmp::Ordering::Equal if !self.min_inclusive => return false,
                _ => {}
            }
        }
        if let Some(max) = &self.max {
            match version.cmp(max) {
                std::cmp::Ordering::Greater => return false,
                std::cmp::Ordering::Equal if !self.max_inclusive => return false,
                _ => {}
            }
        }
        true
    }

    /// Human-readable constraint form used in conflict messages,
    /// e.g. "(= 1.5.0)", "(>= 1.0.0 && < 2.0.0)". Empty for the
    /// unbounded range.
    pub fn pretty_print(&self) -> String {
        if self.is_exact() {
            if let Some(min) = &self.min {
                return format!("(= {min})");
            }
        }
        let min = self.min.as_ref().map(|v| {
            let op = if self.min_inclusive { ">=" } else { ">" };
            format!("{op} {v}")
        });
        let max = self.max.as_ref().map(|v| {
            let op = if self.max_inclusive { "<=" } else { "<" };
            format!("{op} {v}")
        });
        match (min, max) {
            (Some(min), Some(max)) => format!("({min} && {max})"),
            (Some(min), None) => format!("({min})"),
            (None, Some(max)) => format!("({max})"),
            (None, None) => String::new(),
        }
    }
}

impl fmt::Display for VersionRange {
    /// Normalized interval notation, e.g. "[1.0.0, 2.0.0)" or "[1.5.0]".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            if let Some(min) = &self.min {
                return write!(f, "[{min}]");
            }
        }
        let open = if self.min_inclusive { '[' } else { '(' };
        let close = if self.max_inclusive { ']' } else { ')' };
        match &self.min {
            Some(min) => write!(f, "{open}{min}, ")?,
            None => write!(f, "(, ")?,
        }
        match &self.max {
            Some(max) => write!(f, "{max}{close}"),
            None => write!(f, ")"),
        }
    }
}
