use std::fmt;

/// Target framework moniker, parsed from short forms ("net6.0", "net45",
/// "netstandard2.0") or the long form (".NETStandard,Version=v2.0").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetFramework {
    Any,
    Specific {
        identifier: String,
        version: (u64, u64),
    },
}

impl Default for TargetFramework {
    fn default() -> Self {
        Self::Any
    }
}

impl TargetFramework {
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("any") {
            return Self::Any;
        }
        let lower = trimmed.to_ascii_lowercase();
        if let Some((name, version)) = lower.split_once(",version=v") {
            return Self::Specific {
                identifier: canonical_identifier(name),
                version: parse_framework_version(version),
            };
        }
        match lower.find(|c: char| c.is_ascii_digit()) {
            Some(pos) => Self::Specific {
                identifier: canonical_identifier(&lower[..pos]),
                version: parse_framework_version(&lower[pos..]),
            },
            None => Self::Specific {
                identifier: canonical_identifier(&lower),
                version: (0, 0),
            },
        }
    }

    /// Whether a project targeting `self` can consume a dependency group
    /// declared for `group`.
    pub fn supports(&self, group: &TargetFramework) -> bool {
        match (self, group) {
            (_, TargetFramework::Any) => true,
            (TargetFramework::Any, _) => false,
            (
                TargetFramework::Specific {
                    identifier: own,
                    version: own_version,
                },
                TargetFramework::Specific {
                    identifier: other,
                    version: other_version,
                },
            ) => own == other && other_version <= own_version,
        }
    }
}

impl fmt::Display for TargetFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Specific {
                identifier,
                version: (major, minor),
            } => write!(f, "{identifier}{major}.{minor}"),
        }
    }
}

fn canonical_identifier(name: &str) -> String {
    let name = name.trim().trim_start_matches('.');
    match name {
        "netframework" => "net".to_string(),
        other => other.to_string(),
    }
}

fn parse_framework_version(text: &str) -> (u64, u64) {
    if let Some((major, minor)) = text.split_once('.') {
        let major = major.parse().unwrap_or(0);
        let minor: u64 = minor
            .split('.')
            .next()
            .and_then(|m| m.parse().ok())
            .unwrap_or(0);
        return (major, minor);
    }
    // Legacy digit-run monikers: net45 is 4.5, net472 is 4.7.
    let mut digits = text.chars().filter_map(|c| c.to_digit(10));
    let major = digits.next().unwrap_or(0) as u64;
    let minor = digits.next().unwrap_or(0) as u64;
    (major, minor)
}

/// Pick the dependency group to apply for `target`: the compatible group
/// with the highest framework version wins, and the `Any` group is the
/// fallback. Returns the index into `groups`.
pub fn best_group_match<'a>(
    target: &TargetFramework,
    groups: impl Iterator<Item = &'a TargetFramework>,
) -> Option<usize> {
    let mut fallback = None;
    let mut best: Option<(usize, (u64, u64))> = None;
    for (idx, group) in groups.enumerate() {
        match group {
            TargetFramework::Any => {
                if fallback.is_none() {
                    fallback = Some(idx);
                }
            }
            TargetFramework::Specific { version, .. } => {
                if target.supports(group)
                    && best.map(|(_, seen)| *version > seen).unwrap_or(true)
                {
                    best = Some((idx, *version));
                }
            }
        }
    }
    best.map(|(idx, _)| idx).or(fallback)
}
