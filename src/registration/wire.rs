use serde::Deserialize;
use serde_json::Value;

/// Registration index document: a list of pages, each either inlining
/// its leaves or linking to a page document of the same shape.
#[derive(Debug, Deserialize)]
pub struct RegistrationIndex {
    #[serde(default)]
    pub items: Vec<RegistrationItem>,
}

#[derive(Debug, Deserialize)]
pub struct RegistrationItem {
    #[serde(rename = "@id", default)]
    pub url: Option<String>,
    #[serde(rename = "@type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<RegistrationItem>>,
    /// Inline catalog entry object, or a URL string pointing at one.
    #[serde(rename = "catalogEntry", default)]
    pub catalog_entry: Option<Value>,
    #[serde(rename = "packageContent", default)]
    pub package_content: Option<String>,
}

impl RegistrationItem {
    pub fn is_page(&self) -> bool {
        self.items.is_some()
            || self
                .kind
                .as_deref()
                .is_some_and(|k| k.contains("CatalogPage"))
    }
}

#[derive(Debug, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub version: String,
    #[serde(default = "default_listed")]
    pub listed: bool,
    #[serde(rename = "packageContent", default)]
    pub package_content: Option<String>,
    #[serde(rename = "dependencyGroups", default)]
    pub dependency_groups: Vec<WireDependencyGroup>,
}

fn default_listed() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct WireDependencyGroup {
    #[serde(rename = "targetFramework", default)]
    pub target_framework: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<WireDependency>,
}

#[derive(Debug, Deserialize)]
pub struct WireDependency {
    pub id: String,
    #[serde(default)]
    pub range: Option<String>,
}
