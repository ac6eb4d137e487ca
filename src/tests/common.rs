use crate::fetch::{FetchError, FetchJson};
use crate::package::{fold_id, PackageDependency, PackageIdentity, ResolverPackage};
use crate::resolver::PackageResolverContext;
use crate::version::{parse_version, VersionRange};
use parking_lot::Mutex;
use semver::Version;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

pub const BASE: &str = "https://test.local/registration";

/// Serves registration documents from memory and counts requests, so
/// tests can assert both behavior and fetch deduplication.
#[derive(Default)]
pub struct InMemoryFetcher {
    docs: HashMap<String, Value>,
    hits: Mutex<HashMap<String, usize>>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, doc: Value) {
        self.docs.insert(url.into(), doc);
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().get(url).copied().unwrap_or(0)
    }
}

impl FetchJson for InMemoryFetcher {
    fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        *self.hits.lock().entry(url.to_string()).or_insert(0) += 1;
        self.docs
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }
}

pub fn index_uri(id: &str) -> String {
    format!("{BASE}/{}/index.json", id.to_ascii_lowercase())
}

pub fn catalog_entry(id: &str, version: &str, deps: &[(&str, &str)], listed: bool) -> Value {
    let dependencies: Vec<Value> = deps
        .iter()
        .map(|(dep, range)| json!({ "id": dep, "range": range }))
        .collect();
    json!({
        "id": id,
        "version": version,
        "listed": listed,
        "dependencyGroups": [
            { "targetFramework": "any", "dependencies": dependencies }
        ]
    })
}

pub fn leaf(id: &str, version: &str, deps: &[(&str, &str)]) -> Value {
    json!({
        "@type": "Package",
        "catalogEntry": catalog_entry(id, version, deps, true),
        "packageContent": format!("{BASE}/flat/{}/{version}.nupkg", id.to_ascii_lowercase()),
    })
}

pub fn index_doc(leaves: Vec<Value>) -> Value {
    json!({ "items": [ { "@type": "catalog:CatalogPage", "items": leaves } ] })
}

/// Register one package id with a list of (version, dependencies).
pub fn add_package(
    fetcher: &mut InMemoryFetcher,
    id: &str,
    versions: &[(&str, &[(&str, &str)])],
) {
    let leaves = versions
        .iter()
        .map(|(version, deps)| leaf(id, version, deps))
        .collect();
    fetcher.insert(index_uri(id), index_doc(leaves));
}

pub fn v(text: &str) -> Version {
    parse_version(text).unwrap()
}

pub fn range(text: &str) -> VersionRange {
    VersionRange::parse(text).unwrap()
}

/// Candidate builder mirroring the shapes the resolver tests need:
/// `None` for a range means "any version".
pub fn pkg(id: &str, version: &str, deps: &[(&str, Option<&str>)]) -> ResolverPackage {
    pkg_listed(id, version, deps, true)
}

pub fn pkg_listed(
    id: &str,
    version: &str,
    deps: &[(&str, Option<&str>)],
    listed: bool,
) -> ResolverPackage {
    let dependencies = deps
        .iter()
        .map(|(dep, dep_range)| {
            let parsed = match dep_range {
                Some(text) => range(text),
                None => VersionRange::all(),
            };
            PackageDependency::new((*dep).to_string(), parsed)
        })
        .collect();
    ResolverPackage::new(id, v(version), dependencies, listed)
}

/// Context with the given packages as pinned targets, matching how the
/// client builds one for an install of explicit identities.
pub fn context_for(
    behavior: crate::package::DependencyBehavior,
    targets: &[&ResolverPackage],
    available: Vec<ResolverPackage>,
) -> PackageResolverContext {
    let mut context = PackageResolverContext::new(
        behavior,
        targets.iter().map(|p| p.id().to_string()).collect(),
        available,
    );
    context.preferred_versions = targets.iter().map(|p| p.identity.clone()).collect();
    context
}

/// Structural checks every successful resolution must pass: one version
/// per id, and each selected package's dependency ranges satisfied by
/// the selected version of every dependency present in the output.
pub fn assert_consistent(solution: &[PackageIdentity], available: &[ResolverPackage]) {
    let mut seen: HashSet<String> = HashSet::new();
    for identity in solution {
        assert!(
            seen.insert(fold_id(&identity.id)),
            "duplicate id '{}' in solution",
            identity.id
        );
    }
    let chosen: HashMap<String, &Version> = solution
        .iter()
        .map(|identity| (fold_id(&identity.id), &identity.version))
        .collect();
    for identity in solution {
        let package = available
            .iter()
            .find(|p| p.identity == *identity)
            .unwrap_or_else(|| panic!("selected '{identity}' is not in the pool"));
        for dep in &package.dependencies {
            if let Some(version) = chosen.get(&fold_id(&dep.id)) {
                assert!(
                    dep.range.satisfies(version),
                    "'{identity}' needs '{dep}' but the solution picked {version}"
                );
            }
        }
    }
}

pub fn by_id(solution: &[PackageIdentity]) -> HashMap<String, Version> {
    solution
        .iter()
        .map(|identity| (identity.id.clone(), identity.version.clone()))
        .collect()
}
