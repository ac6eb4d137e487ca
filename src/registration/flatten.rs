use super::RequestCache;
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::package::{PackageDependencyInfo, PackageIdentity};
use std::collections::HashSet;

/// Collapse the gathered node graph into the candidate pool: one entry
/// per distinct (id, version). Explicit stack, visited-set cycle guard,
/// cancellation checked before each node expansion. Edges pointing at
/// nodes the walk never materialized are skipped.
pub fn flatten(
    cache: &RequestCache,
    root_uris: &[String],
    token: &CancellationToken,
) -> Result<HashSet<PackageDependencyInfo>> {
    let mut results = HashSet::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = root_uris.iter().rev().cloned().collect();

    while let Some(uri) = stack.pop() {
        token.check()?;
        if !visited.insert(uri.clone()) {
            continue;
        }
        let Some(node) = cache.get(&uri) else {
            continue;
        };
        for package in &node.packages {
            let info = PackageDependencyInfo {
                identity: PackageIdentity::new(node.id.clone(), package.version.clone()),
                dependencies: package
                    .dependencies
                    .iter()
                    .map(|dep| {
                        crate::package::PackageDependency::new(dep.id.clone(), dep.range.clone())
                    })
                    .collect(),
                listed: package.listed,
                content_url: package.content_url.clone(),
            };
            results.insert(info);
            for dep in &package.dependencies {
                if !visited.contains(&dep.registration_uri) {
                    stack.push(dep.registration_uri.clone());
                }
            }
        }
    }
    Ok(results)
}
