use crate::package::{fold_id, PackageIdentity, ResolverPackage};
use std::collections::{HashMap, HashSet, VecDeque};

/// Distance cap for the id ordering; anything farther (or unreachable)
/// sorts together at the end.
pub(crate) const MAX_DISTANCE: usize = 20;

/// Breadth-first distance of every id from the target set, over the
/// union of all candidates' dependency edges, capped at `MAX_DISTANCE`.
pub(crate) fn distances_from_targets(
    pool: &[&ResolverPackage],
    targets: &HashSet<String>,
) -> HashMap<String, usize> {
    let mut edges: HashMap<String, HashSet<String>> = HashMap::new();
    for package in pool {
        let entry = edges.entry(fold_id(package.id())).or_default();
        for dep in &package.dependencies {
            entry.insert(fold_id(&dep.id));
        }
    }
    let mut distances: HashMap<String, usize> = HashMap::new();
    let mut frontier: Vec<String> = Vec::new();
    for target in targets {
        distances.insert(target.clone(), 0);
        frontier.push(target.clone());
    }
    let mut depth = 0usize;
    while !frontier.is_empty() && depth < MAX_DISTANCE {
        depth += 1;
        let mut next = Vec::new();
        for id in frontier {
            let Some(children) = edges.get(&id) else {
                continue;
            };
            for child in children {
                if !distances.contains_key(child) {
                    distances.insert(child.clone(), depth);
                    next.push(child.clone());
                }
            }
        }
        frontier = next;
    }
    distances
}

/// Folded ids reachable from `roots` across the selected packages.
pub(crate) fn reachable_closure(
    solution: &[ResolverPackage],
    roots: &HashSet<String>,
) -> HashSet<String> {
    let lookup: HashMap<String, &ResolverPackage> = solution
        .iter()
        .map(|p| (fold_id(p.id()), p))
        .collect();
    let mut keep: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = roots.iter().cloned().collect();
    while let Some(id) = queue.pop_front() {
        if !keep.insert(id.clone()) {
            continue;
        }
        let Some(package) = lookup.get(&id) else {
            continue;
        };
        for dep in &package.dependencies {
            let folded = fold_id(&dep.id);
            if !keep.contains(&folded) && lookup.contains_key(&folded) {
                queue.push_back(folded);
            }
        }
    }
    keep
}

/// First dependency cycle in the solution, as the identity path from
/// the starting package back to the repeated id. `None` when acyclic.
/// Single depth-first pass with in-stack/finished coloring, so every
/// node and edge is visited once regardless of how many distinct paths
/// run through the graph.
pub(crate) fn find_first_circular_dependency(
    solution: &[ResolverPackage],
) -> Option<Vec<PackageIdentity>> {
    let lookup: HashMap<String, &ResolverPackage> = solution
        .iter()
        .map(|p| (fold_id(p.id()), p))
        .collect();
    let mut done: HashSet<String> = HashSet::new();
    for start in solution {
        if done.contains(&fold_id(start.id())) {
            continue;
        }
        // (package, next dependency edge to try)
        let mut stack: Vec<(&ResolverPackage, usize)> = vec![(start, 0)];
        let mut in_stack: HashSet<String> = HashSet::new();
        in_stack.insert(fold_id(start.id()));
        while let Some(frame) = stack.last_mut() {
            let package = frame.0;
            let edge = frame.1;
            if edge >= package.dependencies.len() {
                let folded = fold_id(package.id());
                in_stack.remove(&folded);
                done.insert(folded);
                stack.pop();
                continue;
            }
            frame.1 += 1;
            let folded = fold_id(&package.dependencies[edge].id);
            if done.contains(&folded) {
                continue;
            }
            let Some(&child) = lookup.get(&folded) else {
                continue;
            };
            if in_stack.contains(&folded) {
                let mut path: Vec<PackageIdentity> =
                    stack.iter().map(|(p, _)| p.identity.clone()).collect();
                path.push(child.identity.clone());
                return Some(path);
            }
            in_stack.insert(folded);
            stack.push((child, 0));
        }
    }
    None
}

/// Order the solution dependencies-first. Among the packages whose
/// dependencies are already placed, the lowest id goes next, so the
/// output is fully deterministic. Packages stuck in a cycle (callers
/// reject those beforehand) would be appended in id order.
pub(crate) fn topological_sort(solution: Vec<ResolverPackage>) -> Vec<ResolverPackage> {
    let members: HashSet<String> = solution.iter().map(|p| fold_id(p.id())).collect();
    let mut remaining: Vec<ResolverPackage> = solution;
    remaining.sort_by(|a, b| a.identity.cmp(&b.identity));
    let mut placed: HashSet<String> = HashSet::new();
    let mut result: Vec<ResolverPackage> = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let next = remaining.iter().position(|package| {
            package.dependencies.iter().all(|dep| {
                let folded = fold_id(&dep.id);
                !members.contains(&folded) || placed.contains(&folded)
            })
        });
        match next {
            Some(idx) => {
                let package = remaining.remove(idx);
                placed.insert(fold_id(package.id()));
                result.push(package);
            }
            None => {
                // Cycle remainder; keep id order.
                result.append(&mut remaining);
                break;
            }
        }
    }
    result
}
