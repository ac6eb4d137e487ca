use crate::package::{PackageDependency, PackageIdentity};
use std::fmt;
use thiserror::Error;

pub type Result<T> = anyhow::Result<T>;

/// Resolution failures surfaced to callers.
#[derive(Debug, Clone, Error)]
pub enum ResolverError {
    #[error(transparent)]
    Conflict(#[from] ResolverConflict),
    #[error("Package '{id}' is not found in the following source(s): {sources}.")]
    PackageNotFound { id: String, sources: String },
    #[error("operation cancelled")]
    Cancelled,
}

impl From<crate::cancel::Cancelled> for ResolverError {
    fn from(_: crate::cancel::Cancelled) -> Self {
        Self::Cancelled
    }
}

/// No consistent assignment exists. Carries enough structure to render
/// the classic client messages.
#[derive(Debug, Clone)]
pub enum ResolverConflict {
    /// The id is depended upon but has no candidates at all.
    Missing { id: String },
    /// Candidates exist but none satisfies every dependent.
    Incompatible {
        id: String,
        /// Set when exactly one candidate was available.
        candidate: Option<PackageIdentity>,
        dependents: Vec<Dependent>,
    },
    /// The winning assignment contained a dependency cycle.
    Circular { path: Vec<PackageIdentity> },
}

/// A package whose declared range on the conflicting id could not be met.
#[derive(Debug, Clone)]
pub struct Dependent {
    pub package: PackageIdentity,
    pub constraint: PackageDependency,
}

impl fmt::Display for Dependent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{} constraint: {}'", self.package, self.constraint)
    }
}

impl fmt::Display for ResolverConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { id } => write!(f, "Unable to resolve dependency '{id}'."),
            Self::Incompatible {
                id,
                candidate,
                dependents,
            } => {
                let constraints: Vec<String> =
                    dependents.iter().map(|d| d.to_string()).collect();
                let constraints = constraints.join(", ");
                match candidate {
                    Some(candidate) => write!(
                        f,
                        "Unable to resolve dependencies. '{candidate}' is not compatible with {constraints}."
                    ),
                    None => write!(
                        f,
                        "Unable to find a version of '{id}' that is compatible with {constraints}."
                    ),
                }
            }
            Self::Circular { path } => {
                let chain: Vec<String> = path.iter().map(|p| p.to_string()).collect();
                write!(
                    f,
                    "Circular dependency detected '{}'.",
                    chain.join(" => ")
                )
            }
        }
    }
}

impl std::error::Error for ResolverConflict {}
