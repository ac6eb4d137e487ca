use crate::version::VersionRange;
use semver::Version;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Case-insensitive fold used for package-id keys throughout the crate.
pub fn fold_id(id: &str) -> String {
    id.to_ascii_lowercase()
}

pub fn ids_equal(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// A package pinned to one version. Ids compare case-insensitively,
/// versions exactly.
#[derive(Debug, Clone)]
pub struct PackageIdentity {
    pub id: String,
    pub version: Version,
}

impl PackageIdentity {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl PartialEq for PackageIdentity {
    fn eq(&self, other: &Self) -> bool {
        ids_equal(&self.id, &other.id) && self.version == other.version
    }
}

impl Eq for PackageIdentity {}

impl Hash for PackageIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.id.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        self.version.hash(state);
    }
}

impl Ord for PackageIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        let ids = self
            .id
            .bytes()
            .map(|b| b.to_ascii_lowercase())
            .cmp(other.id.bytes().map(|b| b.to_ascii_lowercase()));
        ids.then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for PackageIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// One declared dependency edge: a package id and the range of versions
/// that satisfy it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDependency {
    pub id: String,
    pub range: VersionRange,
}

impl PackageDependency {
    pub fn new(id: impl Into<String>, range: VersionRange) -> Self {
        Self {
            id: id.into(),
            range,
        }
    }
}

impl fmt::Display for PackageDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pretty = self.range.pretty_print();
        if pretty.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{} {}", self.id, pretty)
        }
    }
}

/// A gathered candidate: one concrete version with its dependency edges
/// for the selected framework. Equality and hashing use the identity
/// alone so a set of these deduplicates per (id, version).
#[derive(Debug, Clone)]
pub struct PackageDependencyInfo {
    pub identity: PackageIdentity,
    pub dependencies: Vec<PackageDependency>,
    pub listed: bool,
    pub content_url: Option<String>,
}

impl PartialEq for PackageDependencyInfo {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for PackageDependencyInfo {}

impl Hash for PackageDependencyInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

/// Resolver-side view of a candidate.
#[derive(Debug, Clone)]
pub struct ResolverPackage {
    pub identity: PackageIdentity,
    pub dependencies: Vec<PackageDependency>,
    pub listed: bool,
}

impl ResolverPackage {
    pub fn new(
        id: impl Into<String>,
        version: Version,
        dependencies: Vec<PackageDependency>,
        listed: bool,
    ) -> Self {
        Self {
            identity: PackageIdentity::new(id, version),
            dependencies,
            listed,
        }
    }

    pub fn from_dependency_info(info: PackageDependencyInfo) -> Self {
        Self {
            identity: info.identity,
            dependencies: info.dependencies,
            listed: info.listed,
        }
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn version(&self) -> &Version {
        &self.identity.version
    }

    pub fn find_dependency_range(&self, id: &str) -> Option<&VersionRange> {
        self.dependencies
            .iter()
            .find(|dep| ids_equal(&dep.id, id))
            .map(|dep| &dep.range)
    }
}

/// Which version to prefer when several satisfy every constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependencyBehavior {
    /// Resolve the targets only; dependency edges are not followed.
    Ignore,
    #[default]
    Lowest,
    HighestPatch,
    HighestMinor,
    Highest,
}
