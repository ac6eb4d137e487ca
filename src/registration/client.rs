use super::wire::{CatalogEntry, RegistrationIndex, RegistrationItem};
use super::{flatten, DependencyInfo, LeafState, NodeState, ParsedGroup, RegistrationInfo};
use super::{RegistrationPackageInfo, RequestCache};
use crate::cancel::CancellationToken;
use crate::error::{ResolverError, Result};
use crate::fetch::{FetchError, FetchJson, DEFAULT_REGISTRATION_BASE};
use crate::framework::{best_group_match, TargetFramework};
use crate::package::{fold_id, ids_equal, PackageDependency, PackageDependencyInfo, PackageIdentity};
use crate::version::{parse_version, VersionRange};
use anyhow::{anyhow, bail, Context};
use log::{debug, warn};
use rayon::prelude::*;
use semver::Version;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Inputs for one gather operation: what to walk and under which policy.
#[derive(Debug, Clone, Default)]
pub struct GatherContext {
    pub target_ids: Vec<String>,
    pub installed: Vec<PackageIdentity>,
    pub target_framework: TargetFramework,
    pub include_prerelease: bool,
    pub allow_downgrades: bool,
}

#[derive(Debug, Clone)]
struct WalkRequest {
    id: String,
    range: VersionRange,
}

/// Walks the registration graph of a NuGet v3 source. All node state
/// lives in the caller-provided `RequestCache`; the client itself is
/// stateless apart from its configuration.
pub struct DependencyInfoClient<'a> {
    fetcher: &'a dyn FetchJson,
    base_url: String,
}

impl<'a> DependencyInfoClient<'a> {
    pub fn new(fetcher: &'a dyn FetchJson, base_url: Option<String>) -> Self {
        let base = base_url.unwrap_or_else(|| DEFAULT_REGISTRATION_BASE.to_string());
        Self {
            fetcher,
            base_url: base.trim_end_matches('/').to_string(),
        }
    }

    /// Canonical request URI for a package id.
    pub fn registration_uri(&self, id: &str) -> String {
        format!("{}/{}/index.json", self.base_url, fold_id(id))
    }

    /// Gather the dependency subgraph reachable from `(id, range)` and
    /// return the shared node for the id. A missing registration index
    /// yields an empty node; transport failures propagate.
    pub fn registration_info(
        &self,
        id: &str,
        range: &VersionRange,
        framework: &TargetFramework,
        cache: &RequestCache,
        token: &CancellationToken,
    ) -> Result<Arc<RegistrationInfo>> {
        let roots = vec![WalkRequest {
            id: id.to_string(),
            range: range.clone(),
        }];
        self.walk(roots, framework, range.includes_prerelease(), cache, token)?;
        cache.freeze();
        let uri = self.registration_uri(id);
        cache
            .get(&uri)
            .ok_or_else(|| anyhow!("registration node missing after walk: {uri}"))
    }

    /// Walk every target (and installed) id, flatten the arena into the
    /// candidate pool, and prune downgrades of installed packages. A
    /// target id whose node comes back empty is a hard error.
    pub fn gather(
        &self,
        context: &GatherContext,
        cache: &RequestCache,
        token: &CancellationToken,
    ) -> Result<HashSet<PackageDependencyInfo>> {
        let all = VersionRange::all().with_prerelease(context.include_prerelease);
        let mut roots: Vec<WalkRequest> = context
            .target_ids
            .iter()
            .map(|id| WalkRequest {
                id: id.clone(),
                range: all.clone(),
            })
            .collect();
        for installed in &context.installed {
            let already = context
                .target_ids
                .iter()
                .any(|id| ids_equal(id, &installed.id));
            if !already {
                roots.push(WalkRequest {
                    id: installed.id.clone(),
                    range: all.clone(),
                });
            }
        }
        let root_uris: Vec<String> = roots.iter().map(|r| self.registration_uri(&r.id)).collect();

        self.walk(
            roots,
            &context.target_framework,
            context.include_prerelease,
            cache,
            token,
        )?;
        cache.freeze();

        for id in &context.target_ids {
            let node = cache.get(&self.registration_uri(id));
            if node.map(|n| n.packages.is_empty()).unwrap_or(true) {
                bail!(ResolverError::PackageNotFound {
                    id: id.clone(),
                    sources: self.base_url.clone(),
                });
            }
        }

        let mut candidates = flatten::flatten(cache, &root_uris, token)?;
        if !context.allow_downgrades {
            for installed in &context.installed {
                candidates.retain(|c| {
                    !(ids_equal(&c.identity.id, &installed.id)
                        && c.identity.version < installed.version)
                });
            }
        }
        debug!(
            "gathered {} candidates for {} target(s)",
            candidates.len(),
            context.target_ids.len()
        );
        Ok(candidates)
    }

    /// Iterative worklist walk. Each round claims cache slots for the
    /// batch, fetches the missing indexes in parallel, then expands the
    /// requested ranges and enqueues child requests not yet seen.
    fn walk(
        &self,
        roots: Vec<WalkRequest>,
        framework: &TargetFramework,
        include_prerelease: bool,
        cache: &RequestCache,
        token: &CancellationToken,
    ) -> Result<()> {
        if cache.is_frozen() {
            bail!("request cache already used by a completed operation");
        }
        let mut requested: HashSet<(String, String)> = HashSet::new();
        let mut pending: VecDeque<WalkRequest> = VecDeque::new();
        for root in roots {
            let key = (fold_id(&root.id), root.range.to_string());
            if requested.insert(key) {
                pending.push_back(root);
            }
        }

        while !pending.is_empty() {
            token.check()?;
            let batch: Vec<WalkRequest> = pending.drain(..).collect();

            // Claim slots up front so each index is fetched exactly once
            // even when several edges in the batch share an id.
            let mut to_fetch: Vec<String> = Vec::new();
            for request in &batch {
                let uri = self.registration_uri(&request.id);
                if cache.claim(&uri, &request.id) {
                    to_fetch.push(uri);
                }
            }
            debug!(
                "walk round: {} request(s), {} index fetch(es)",
                batch.len(),
                to_fetch.len()
            );

            let fetched: Vec<(String, Result<Option<Vec<LeafState>>>)> = to_fetch
                .par_iter()
                .map(|uri| (uri.clone(), self.load_index(uri)))
                .collect();
            for (uri, outcome) in fetched {
                match outcome? {
                    Some(leaves) => cache.set_leaves(&uri, leaves),
                    // 404: the node stays empty; only gather escalates
                    // an empty root.
                    None => debug!("registration index missing: {uri}"),
                }
            }

            for request in batch {
                token.check()?;
                let uri = self.registration_uri(&request.id);
                let children = cache
                    .with_node(&uri, |node| {
                        self.expand_node(node, &request.range, framework, include_prerelease)
                    })
                    .unwrap_or_default();
                for child in children {
                    let key = (fold_id(&child.id), child.range.to_string());
                    if requested.insert(key) {
                        pending.push_back(child);
                    }
                }
            }
        }
        Ok(())
    }

    /// Materialize the versions of `node` matching `range` and return
    /// the child requests their dependency edges introduce. Each
    /// normalized range is expanded at most once per node.
    fn expand_node(
        &self,
        node: &mut NodeState,
        range: &VersionRange,
        framework: &TargetFramework,
        include_prerelease: bool,
    ) -> Vec<WalkRequest> {
        if !node.expanded_ranges.insert(range.to_string()) {
            return Vec::new();
        }
        let mut children = Vec::new();
        for leaf in &node.leaves {
            if !in_range(range, &leaf.version, include_prerelease) {
                continue;
            }
            if !node.expanded_versions.insert(leaf.version.clone()) {
                continue;
            }
            let group = best_group_match(framework, leaf.groups.iter().map(|g| &g.framework))
                .map(|idx| &leaf.groups[idx].dependencies);
            let dependencies: Vec<DependencyInfo> = group
                .map(|deps| {
                    deps.iter()
                        .map(|dep| DependencyInfo {
                            id: dep.id.clone(),
                            range: dep.range.clone(),
                            registration_uri: self.registration_uri(&dep.id),
                        })
                        .collect()
                })
                .unwrap_or_default();
            for dep in &dependencies {
                children.push(WalkRequest {
                    id: dep.id.clone(),
                    range: dep.range.clone(),
                });
            }
            node.packages.push(RegistrationPackageInfo {
                version: leaf.version.clone(),
                listed: leaf.listed,
                content_url: leaf.content_url.clone(),
                dependencies,
            });
        }
        children
    }

    /// Fetch and parse one registration index, following linked catalog
    /// pages and catalog-entry documents. `Ok(None)` means the index
    /// does not exist.
    fn load_index(&self, uri: &str) -> Result<Option<Vec<LeafState>>> {
        let doc = match self.fetcher.fetch_json(uri) {
            Ok(doc) => doc,
            Err(FetchError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let index: RegistrationIndex = serde_json::from_value(doc)
            .with_context(|| format!("parse registration index {uri}"))?;
        let mut leaves = Vec::new();
        let mut items: Vec<RegistrationItem> = index.items;
        while let Some(item) = items.pop() {
            if item.is_page() {
                match item.items {
                    Some(children) => items.extend(children),
                    None => {
                        let url = item
                            .url
                            .ok_or_else(|| anyhow!("catalog page without @id in {uri}"))?;
                        let doc = self
                            .fetcher
                            .fetch_json(&url)
                            .with_context(|| format!("fetch registration page {url}"))?;
                        let page: RegistrationItem = serde_json::from_value(doc)
                            .with_context(|| format!("parse registration page {url}"))?;
                        if let Some(children) = page.items {
                            items.extend(children);
                        }
                    }
                }
            } else if let Some(leaf) = self.load_leaf(uri, item)? {
                leaves.push(leaf);
            }
        }
        leaves.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(Some(leaves))
    }

    fn load_leaf(&self, index_uri: &str, item: RegistrationItem) -> Result<Option<LeafState>> {
        let Some(entry_value) = item.catalog_entry else {
            debug!("registration item without catalogEntry in {index_uri}");
            return Ok(None);
        };
        let entry: CatalogEntry = match entry_value {
            serde_json::Value::String(url) => match self.fetcher.fetch_json(&url) {
                Ok(doc) => serde_json::from_value(doc)
                    .with_context(|| format!("parse catalog entry {url}"))?,
                Err(FetchError::NotFound(_)) => {
                    warn!("catalog entry missing: {url}");
                    return Ok(None);
                }
                Err(err) => return Err(err.into()),
            },
            value => serde_json::from_value(value)
                .with_context(|| format!("parse catalog entry in {index_uri}"))?,
        };
        let version = match parse_version(&entry.version) {
            Ok(version) => version,
            Err(err) => {
                warn!("skipping unparseable version in {index_uri}: {err}");
                return Ok(None);
            }
        };
        let mut groups = Vec::with_capacity(entry.dependency_groups.len());
        for group in &entry.dependency_groups {
            let framework = TargetFramework::parse(group.target_framework.as_deref().unwrap_or(""));
            let mut dependencies = Vec::with_capacity(group.dependencies.len());
            for dep in &group.dependencies {
                let range = match dep.range.as_deref().map(str::trim) {
                    Some(text) if !text.is_empty() => VersionRange::parse(text)
                        .with_context(|| format!("dependency '{}' in {index_uri}", dep.id))?,
                    _ => VersionRange::all(),
                };
                dependencies.push(PackageDependency::new(dep.id.clone(), range));
            }
            groups.push(ParsedGroup {
                framework,
                dependencies,
            });
        }
        Ok(Some(LeafState {
            version,
            listed: entry.listed,
            content_url: entry.package_content.or(item.package_content),
            groups,
        }))
    }
}

fn in_range(range: &VersionRange, version: &Version, include_prerelease: bool) -> bool {
    if range.satisfies(version) {
        return true;
    }
    include_prerelease && range.clone().with_prerelease(true).satisfies(version)
}
