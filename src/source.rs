/// A configured package source. The resolver only uses these for
/// diagnostics; all network access goes through the fetch layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSource {
    pub name: String,
    pub url: String,
    pub enabled: bool,
}

impl PackageSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
        }
    }
}

/// Comma-joined names of the enabled sources, for error messages.
pub fn describe_sources(sources: &[PackageSource]) -> String {
    let names: Vec<&str> = sources
        .iter()
        .filter(|s| s.enabled)
        .map(|s| s.name.as_str())
        .collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
