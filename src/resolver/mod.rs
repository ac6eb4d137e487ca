pub mod util;

use crate::cancel::CancellationToken;
use crate::error::{Dependent, ResolverConflict, ResolverError};
use crate::package::{
    fold_id, DependencyBehavior, PackageDependency, PackageIdentity, ResolverPackage,
};
use crate::source::{describe_sources, PackageSource};
use log::debug;
use semver::Version;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Everything one resolution needs: the candidate pool plus the policy
/// for choosing among satisfying versions.
#[derive(Debug, Clone, Default)]
pub struct PackageResolverContext {
    pub dependency_behavior: DependencyBehavior,
    /// Ids being installed or updated; each must end up in the result.
    pub target_ids: Vec<String>,
    /// Already-installed ids that must keep a version assigned.
    pub required_ids: Vec<String>,
    /// Pinned versions (targets with an explicit version, installed
    /// packages). These outrank the behavior ordering.
    pub preferred_versions: Vec<PackageIdentity>,
    pub available: Vec<ResolverPackage>,
    /// Diagnostics only.
    pub package_sources: Vec<PackageSource>,
}

impl PackageResolverContext {
    pub fn new(
        dependency_behavior: DependencyBehavior,
        target_ids: Vec<String>,
        available: Vec<ResolverPackage>,
    ) -> Self {
        Self {
            dependency_behavior,
            target_ids,
            available,
            ..Self::default()
        }
    }
}

/// One search slot: every candidate for a package id, ordered by
/// preference. `None` is the synthetic "absent" candidate, legal only
/// for ids that are not required.
struct Slot {
    display: String,
    folded: String,
    candidates: Vec<Option<ResolverPackage>>,
}

#[derive(Debug, Default)]
pub struct PackageResolver;

impl PackageResolver {
    pub fn new() -> Self {
        Self
    }

    /// Pick exactly one version for every package id reachable from the
    /// targets, or explain why none exists. The result is pruned to the
    /// closure reachable from the required ids and returned in
    /// topological order, dependencies first.
    pub fn resolve(
        &self,
        context: &PackageResolverContext,
        token: &CancellationToken,
    ) -> Result<Vec<PackageIdentity>, ResolverError> {
        token.check()?;
        if context.target_ids.is_empty() {
            return Ok(Vec::new());
        }
        let preferred: HashSet<PackageIdentity> =
            context.preferred_versions.iter().cloned().collect();
        if context.dependency_behavior == DependencyBehavior::Ignore {
            return self.resolve_ignoring_dependencies(context, &preferred);
        }

        let mut slots = self.build_slots(context, &preferred)?;
        let required: HashSet<String> = context
            .target_ids
            .iter()
            .chain(context.required_ids.iter())
            .map(|id| fold_id(id))
            .collect();
        self.prune_unsupported(&mut slots, &required)?;

        let choice = self.search(&slots, token)?;

        // Materialize the winning assignment in slot order (targets
        // first) so post-processing is deterministic.
        let mut solution: Vec<ResolverPackage> = Vec::new();
        for (slot, &pick) in slots.iter().zip(&choice) {
            if let Some(package) = &slot.candidates[pick] {
                solution.push(package.clone());
            }
        }
        let keep = util::reachable_closure(&solution, &required);
        solution.retain(|p| keep.contains(&fold_id(p.id())));

        if let Some(path) = util::find_first_circular_dependency(&solution) {
            return Err(ResolverConflict::Circular { path }.into());
        }
        let sorted = util::topological_sort(solution);
        debug!("resolved {} package(s)", sorted.len());
        Ok(sorted.into_iter().map(|p| p.identity).collect())
    }

    /// `Ignore` behavior: assign the targets only, constraints unseen.
    fn resolve_ignoring_dependencies(
        &self,
        context: &PackageResolverContext,
        preferred: &HashSet<PackageIdentity>,
    ) -> Result<Vec<PackageIdentity>, ResolverError> {
        let mut result = Vec::new();
        for id in &context.target_ids {
            let mut candidates: Vec<ResolverPackage> = context
                .available
                .iter()
                .filter(|p| crate::package::ids_equal(p.id(), id))
                .cloned()
                .collect();
            if candidates.is_empty() {
                return Err(self.package_not_found(id, context));
            }
            sort_candidates(&mut candidates, context.dependency_behavior, preferred);
            result.push(candidates.remove(0).identity);
        }
        Ok(result)
    }

    /// Build one slot per id in the universe (candidates plus every id
    /// mentioned by a dependency edge), ordered targets first, then
    /// required ids, then by distance from the targets.
    fn build_slots(
        &self,
        context: &PackageResolverContext,
        preferred: &HashSet<PackageIdentity>,
    ) -> Result<Vec<Slot>, ResolverError> {
        // The pool arrives as a set; sort for deterministic search.
        let mut available = context.available.clone();
        available.sort_by(|a, b| a.identity.cmp(&b.identity));

        let mut display: HashMap<String, String> = HashMap::new();
        fn remember(id: &str, display: &mut HashMap<String, String>) {
            display.entry(fold_id(id)).or_insert_with(|| id.to_string());
        }
        for id in context.target_ids.iter().chain(&context.required_ids) {
            remember(id, &mut display);
        }
        for package in &available {
            remember(package.id(), &mut display);
            for dep in &package.dependencies {
                remember(&dep.id, &mut display);
            }
        }

        let mut by_id: HashMap<String, Vec<ResolverPackage>> = HashMap::new();
        for package in available {
            by_id.entry(fold_id(package.id())).or_default().push(package);
        }

        let targets: HashSet<String> = context.target_ids.iter().map(|id| fold_id(id)).collect();
        let required: HashSet<String> = targets
            .iter()
            .cloned()
            .chain(context.required_ids.iter().map(|id| fold_id(id)))
            .collect();

        let mut ordered: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for id in context.target_ids.iter().chain(&context.required_ids) {
            let folded = fold_id(id);
            if seen.insert(folded.clone()) {
                ordered.push(folded);
            }
        }
        let distances = {
            let pool: Vec<&ResolverPackage> = by_id.values().flatten().collect();
            util::distances_from_targets(&pool, &targets)
        };
        let mut rest: Vec<String> = display
            .keys()
            .filter(|folded| !seen.contains(*folded))
            .cloned()
            .collect();
        rest.sort_by(|a, b| {
            let da = distances.get(a).copied().unwrap_or(util::MAX_DISTANCE);
            let db = distances.get(b).copied().unwrap_or(util::MAX_DISTANCE);
            da.cmp(&db).then_with(|| a.cmp(b))
        });
        ordered.extend(rest);

        let mut slots = Vec::with_capacity(ordered.len());
        for folded in ordered {
            let name = display.get(&folded).cloned().unwrap_or_else(|| folded.clone());
            let mut candidates = by_id.remove(&folded).unwrap_or_default();
            let is_required = required.contains(&folded);
            if is_required && candidates.is_empty() {
                if targets.contains(&folded) {
                    return Err(self.package_not_found(&name, context));
                }
                return Err(ResolverConflict::Missing { id: name }.into());
            }
            sort_candidates(&mut candidates, context.dependency_behavior, preferred);
            let mut candidates: Vec<Option<ResolverPackage>> =
                candidates.into_iter().map(Some).collect();
            if !is_required {
                candidates.push(None);
            }
            slots.push(Slot {
                display: name,
                folded,
                candidates,
            });
        }
        Ok(slots)
    }

    /// Drop candidates that can never appear in any solution: packages
    /// requiring a version of some id that no candidate of that id's
    /// slot provides. Runs to a fixpoint so removals cascade up the
    /// graph. Without this, a dead branch deep in a long chain forces
    /// the search to rediscover the same failure under every ancestor
    /// assignment. A required slot emptied here is a hard conflict,
    /// reported against the slot at the end of the removal chain.
    fn prune_unsupported(
        &self,
        slots: &mut [Slot],
        required: &HashSet<String>,
    ) -> Result<(), ResolverError> {
        let index_of: HashMap<String, usize> = slots
            .iter()
            .enumerate()
            .map(|(idx, slot)| (slot.folded.clone(), idx))
            .collect();
        // Why each removal happened, for diagnostics: the emptied slot's
        // unsatisfiable dependency, and the dependents broken by it.
        let mut removal_cause: HashMap<String, String> = HashMap::new();
        let mut dependents_on: HashMap<String, Vec<Dependent>> = HashMap::new();

        loop {
            let mut removals: Vec<(usize, usize, Dependent, String)> = Vec::new();
            for (idx, slot) in slots.iter().enumerate() {
                for (pos, candidate) in slot.candidates.iter().enumerate() {
                    let Some(package) = candidate else { continue };
                    for dep in &package.dependencies {
                        let folded = fold_id(&dep.id);
                        let Some(&target) = index_of.get(&folded) else {
                            continue;
                        };
                        let supported = slots[target]
                            .candidates
                            .iter()
                            .flatten()
                            .any(|c| dep.range.satisfies(c.version()));
                        if !supported {
                            let dependent = Dependent {
                                package: package.identity.clone(),
                                constraint: PackageDependency::new(
                                    slots[target].display.clone(),
                                    dep.range.clone(),
                                ),
                            };
                            removals.push((idx, pos, dependent, folded));
                            break;
                        }
                    }
                }
            }
            if removals.is_empty() {
                break;
            }
            // Reverse order keeps the positions valid while removing.
            for (idx, pos, dependent, dep) in removals.into_iter().rev() {
                slots[idx].candidates.remove(pos);
                removal_cause.insert(slots[idx].folded.clone(), dep.clone());
                dependents_on.entry(dep).or_default().push(dependent);
            }
        }

        for slot in slots.iter() {
            if required.contains(&slot.folded) && slot.candidates.is_empty() {
                return Err(diagnose_chain(
                    &slot.folded,
                    slots,
                    &index_of,
                    &removal_cause,
                    &dependents_on,
                ));
            }
        }
        Ok(())
    }

    /// Iterative backtracking with conflict-directed backjumping: when
    /// every candidate of a slot fails, jump to the most recent slot
    /// that contributed a rejection instead of the chronological
    /// predecessor. Deterministic, no recursion.
    fn search(
        &self,
        slots: &[Slot],
        token: &CancellationToken,
    ) -> Result<Vec<usize>, ResolverError> {
        let count = slots.len();
        let mut choice = vec![0usize; count];
        let mut conflict_sets: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); count];
        // Deepest dead end seen, kept for diagnostics: the failure
        // closest to the leaves usually names the real problem.
        let mut deepest: Option<(usize, Vec<usize>)> = None;

        let mut level = 0usize;
        while level < count {
            token.check()?;

            let mut assigned = false;
            while choice[level] < slots[level].candidates.len() {
                match conflict_with_assigned(level, &choice, slots) {
                    None => {
                        assigned = true;
                        break;
                    }
                    Some(earlier) => {
                        conflict_sets[level].insert(earlier);
                        choice[level] += 1;
                    }
                }
            }
            if assigned {
                level += 1;
                if level < count {
                    choice[level] = 0;
                    conflict_sets[level].clear();
                }
                continue;
            }

            if deepest.as_ref().map(|(l, _)| level > *l).unwrap_or(true) {
                deepest = Some((level, choice.clone()));
            }
            let Some(jump) = conflict_sets[level].iter().next_back().copied() else {
                let (fail_level, fail_choice) =
                    deepest.unwrap_or_else(|| (level, choice.clone()));
                return Err(self.diagnose(fail_level, &fail_choice, slots));
            };
            let carried: Vec<usize> = conflict_sets[level]
                .iter()
                .copied()
                .filter(|&l| l != jump)
                .collect();
            conflict_sets[jump].extend(carried);
            for reset in jump + 1..=level {
                choice[reset] = 0;
                conflict_sets[reset].clear();
            }
            choice[jump] += 1;
            level = jump;
        }
        Ok(choice)
    }

    /// Turn a dead end into the classic client message: name the
    /// problem id, the lone candidate if there is one, and the
    /// assigned dependents whose constraints it breaks.
    fn diagnose(&self, level: usize, choice: &[usize], slots: &[Slot]) -> ResolverError {
        let slot = &slots[level];
        let real: Vec<&ResolverPackage> = slot.candidates.iter().flatten().collect();
        if real.is_empty() {
            return ResolverConflict::Missing {
                id: slot.display.clone(),
            }
            .into();
        }
        let candidate = if real.len() == 1 {
            Some(real[0].identity.clone())
        } else {
            None
        };
        let mut dependents: Vec<Dependent> = Vec::new();
        for assigned_level in 0..level {
            let Some(package) = &slots[assigned_level].candidates[choice[assigned_level]] else {
                continue;
            };
            let Some(range) = package.find_dependency_range(&slot.folded) else {
                continue;
            };
            let broken = match &candidate {
                Some(candidate) => !range.satisfies(&candidate.version),
                None => true,
            };
            if broken {
                dependents.push(Dependent {
                    package: package.identity.clone(),
                    constraint: PackageDependency::new(slot.display.clone(), range.clone()),
                });
            }
        }
        if dependents.is_empty() {
            return ResolverConflict::Missing {
                id: slot.display.clone(),
            }
            .into();
        }
        dependents.sort_by_key(|d| d.to_string());
        ResolverConflict::Incompatible {
            id: slot.display.clone(),
            candidate,
            dependents,
        }
        .into()
    }

    fn package_not_found(&self, id: &str, context: &PackageResolverContext) -> ResolverError {
        ResolverError::PackageNotFound {
            id: id.to_string(),
            sources: describe_sources(&context.package_sources),
        }
    }
}

/// Walk the removal chain from an emptied slot to the slot that caused
/// it: the first one still holding real candidates is named with the
/// broken constraints, and a slot that never had any yields the plain
/// missing-dependency message.
fn diagnose_chain(
    start: &str,
    slots: &[Slot],
    index_of: &HashMap<String, usize>,
    removal_cause: &HashMap<String, String>,
    dependents_on: &HashMap<String, Vec<Dependent>>,
) -> ResolverError {
    let mut visited: HashSet<String> = HashSet::new();
    let mut current = start.to_string();
    loop {
        let Some(&idx) = index_of.get(&current) else {
            return ResolverConflict::Missing { id: current }.into();
        };
        let slot = &slots[idx];
        let real: Vec<&ResolverPackage> = slot.candidates.iter().flatten().collect();
        if !real.is_empty() {
            let candidate = if real.len() == 1 {
                Some(real[0].identity.clone())
            } else {
                None
            };
            let mut dependents = dependents_on.get(&current).cloned().unwrap_or_default();
            if dependents.is_empty() {
                return ResolverConflict::Missing {
                    id: slot.display.clone(),
                }
                .into();
            }
            dependents.sort_by_key(|d| d.to_string());
            return ResolverConflict::Incompatible {
                id: slot.display.clone(),
                candidate,
                dependents,
            }
            .into();
        }
        match removal_cause.get(&current) {
            Some(next) if visited.insert(current.clone()) => current = next.clone(),
            _ => {
                return ResolverConflict::Missing {
                    id: slot.display.clone(),
                }
                .into();
            }
        }
    }
}

/// Reject reason, if any, for the candidate at `level` against every
/// earlier assignment. Checks both directions of each pair.
fn conflict_with_assigned(level: usize, choice: &[usize], slots: &[Slot]) -> Option<usize> {
    let current = slots[level].candidates[choice[level]].as_ref();
    for earlier in 0..level {
        let other = slots[earlier].candidates[choice[earlier]].as_ref();
        if pair_rejected(current, &slots[level].folded, other, &slots[earlier].folded) {
            return Some(earlier);
        }
    }
    None
}

fn pair_rejected(
    a: Option<&ResolverPackage>,
    a_key: &str,
    b: Option<&ResolverPackage>,
    b_key: &str,
) -> bool {
    if let Some(a) = a {
        if let Some(range) = a.find_dependency_range(b_key) {
            match b {
                None => return true,
                Some(b) if !range.satisfies(b.version()) => return true,
                _ => {}
            }
        }
    }
    if let Some(b) = b {
        if let Some(range) = b.find_dependency_range(a_key) {
            match a {
                None => return true,
                Some(a) if !range.satisfies(a.version()) => return true,
                _ => {}
            }
        }
    }
    false
}

/// Candidate preference: pinned versions first, listed before unlisted,
/// then the behavior ordering.
fn sort_candidates(
    candidates: &mut [ResolverPackage],
    behavior: DependencyBehavior,
    preferred: &HashSet<PackageIdentity>,
) {
    candidates.sort_by(|a, b| {
        let a_preferred = preferred.contains(&a.identity);
        let b_preferred = preferred.contains(&b.identity);
        b_preferred
            .cmp(&a_preferred)
            .then_with(|| b.listed.cmp(&a.listed))
            .then_with(|| behavior_cmp(behavior, a.version(), b.version()))
    });
}

fn behavior_cmp(behavior: DependencyBehavior, a: &Version, b: &Version) -> Ordering {
    match behavior {
        DependencyBehavior::Lowest | DependencyBehavior::Ignore => a.cmp(b),
        DependencyBehavior::Highest => b.cmp(a),
        DependencyBehavior::HighestPatch => (a.major, a.minor)
            .cmp(&(b.major, b.minor))
            .then_with(|| b.cmp(a)),
        DependencyBehavior::HighestMinor => a.major.cmp(&b.major).then_with(|| b.cmp(a)),
    }
}
