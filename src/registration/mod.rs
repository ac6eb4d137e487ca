pub mod client;
pub mod flatten;
pub mod wire;

pub use client::{DependencyInfoClient, GatherContext};
pub use flatten::flatten;

use crate::framework::TargetFramework;
use crate::package::PackageDependency;
use crate::version::VersionRange;
use parking_lot::Mutex;
use semver::Version;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Every version of one package id gathered during a single operation.
/// Nodes are built inside the request cache and published as shared
/// immutable instances when the walk completes.
#[derive(Debug, Default)]
pub struct RegistrationInfo {
    pub id: String,
    pub packages: Vec<RegistrationPackageInfo>,
}

#[derive(Debug, Clone)]
pub struct RegistrationPackageInfo {
    pub version: Version,
    pub listed: bool,
    pub content_url: Option<String>,
    pub dependencies: Vec<DependencyInfo>,
}

/// A dependency edge. The child node lives in the request cache and is
/// addressed by its canonical registration URI, so cyclic graphs share
/// nodes instead of chasing pointers.
#[derive(Debug, Clone)]
pub struct DependencyInfo {
    pub id: String,
    pub range: VersionRange,
    pub registration_uri: String,
}

/// One parsed dependency group from a catalog entry.
#[derive(Debug, Clone)]
pub(crate) struct ParsedGroup {
    pub(crate) framework: TargetFramework,
    pub(crate) dependencies: Vec<PackageDependency>,
}

/// One version as listed by the registration index, before any range
/// has asked for it.
#[derive(Debug, Clone)]
pub(crate) struct LeafState {
    pub(crate) version: Version,
    pub(crate) listed: bool,
    pub(crate) content_url: Option<String>,
    pub(crate) groups: Vec<ParsedGroup>,
}

/// Mutable build state for a node while the walk is in progress.
#[derive(Debug, Default)]
pub(crate) struct NodeState {
    pub(crate) id: String,
    pub(crate) leaves: Vec<LeafState>,
    pub(crate) expanded_ranges: HashSet<String>,
    pub(crate) expanded_versions: HashSet<Version>,
    pub(crate) packages: Vec<RegistrationPackageInfo>,
}

impl NodeState {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }
}

/// Request-scoped arena keyed by canonical registration URI. A slot is
/// claimed before its index fetch starts, so concurrent and cyclic
/// re-requests converge on a single node. Create one per gather call
/// and drop it with the operation.
#[derive(Debug, Default)]
pub struct RequestCache {
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    building: HashMap<String, NodeState>,
    ready: HashMap<String, Arc<RegistrationInfo>>,
    frozen: bool,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed node for `uri`, if the operation has finished.
    pub fn get(&self, uri: &str) -> Option<Arc<RegistrationInfo>> {
        self.inner.lock().ready.get(uri).cloned()
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.lock().frozen
    }

    /// Atomic get-or-create: returns true when the caller is the first
    /// requester and owns the index fetch for this uri.
    pub(crate) fn claim(&self, uri: &str, id: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.building.contains_key(uri) {
            return false;
        }
        inner.building.insert(uri.to_string(), NodeState::new(id));
        true
    }

    pub(crate) fn set_leaves(&self, uri: &str, leaves: Vec<LeafState>) {
        if let Some(node) = self.inner.lock().building.get_mut(uri) {
            node.leaves = leaves;
        }
    }

    pub(crate) fn with_node<R>(&self, uri: &str, f: impl FnOnce(&mut NodeState) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        inner.building.get_mut(uri).map(f)
    }

    /// Publish every built node as an immutable shared instance. The
    /// cache accepts no further walking afterwards.
    pub(crate) fn freeze(&self) {
        let mut inner = self.inner.lock();
        inner.frozen = true;
        let building = std::mem::take(&mut inner.building);
        for (uri, node) in building {
            inner.ready.insert(
                uri,
                Arc::new(RegistrationInfo {
                    id: node.id,
                    packages: node.packages,
                }),
            );
        }
    }
}
