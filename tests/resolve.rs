use nupac::cancel::CancellationToken;
use nupac::error::ResolverError;
use nupac::fetch::{FetchError, FetchJson};
use nupac::package::{DependencyBehavior, ResolverPackage};
use nupac::registration::{DependencyInfoClient, GatherContext, RequestCache};
use nupac::resolver::{PackageResolver, PackageResolverContext};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;

const BASE: &str = "https://registry.test/registration";

struct MapFetcher {
    docs: Mutex<HashMap<String, Value>>,
}

impl MapFetcher {
    fn new() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
        }
    }

    fn add_package(&self, id: &str, version: &str, deps: &[(&str, &str)]) {
        let dependencies: Vec<Value> = deps
            .iter()
            .map(|(dep, range)| json!({ "id": dep, "range": range }))
            .collect();
        let uri = format!("{BASE}/{}/index.json", id.to_ascii_lowercase());
        let leaf = json!({
            "@type": "Package",
            "catalogEntry": {
                "id": id,
                "version": version,
                "listed": true,
                "dependencyGroups": [
                    { "targetFramework": "any", "dependencies": dependencies }
                ]
            },
            "packageContent": format!("{BASE}/flat/{}/{version}.nupkg", id.to_ascii_lowercase()),
        });
        let mut docs = self.docs.lock();
        match docs.get_mut(&uri) {
            Some(doc) => {
                doc["items"][0]["items"]
                    .as_array_mut()
                    .expect("page items")
                    .push(leaf);
            }
            None => {
                docs.insert(
                    uri,
                    json!({ "items": [ { "@type": "catalog:CatalogPage", "items": [leaf] } ] }),
                );
            }
        }
    }
}

impl FetchJson for MapFetcher {
    fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        self.docs
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }
}

fn gather_and_resolve(
    fetcher: &MapFetcher,
    target: &str,
    behavior: DependencyBehavior,
) -> Result<Vec<nupac::package::PackageIdentity>, ResolverError> {
    let token = CancellationToken::new();
    let cache = RequestCache::new();
    let client = DependencyInfoClient::new(fetcher, Some(BASE.to_string()));
    let gather = GatherContext {
        target_ids: vec![target.to_string()],
        ..GatherContext::default()
    };
    let candidates = client.gather(&gather, &cache, &token).expect("gather");
    let available: Vec<ResolverPackage> = candidates
        .into_iter()
        .map(ResolverPackage::from_dependency_info)
        .collect();
    let context =
        PackageResolverContext::new(behavior, vec![target.to_string()], available);
    PackageResolver::new().resolve(&context, &token)
}

#[test]
fn thousand_package_chain_resolves_without_recursion() {
    let _ = env_logger::builder().is_test(true).try_init();
    let fetcher = MapFetcher::new();
    for index in 0..1000 {
        fetcher.add_package(
            &format!("pkg{index}"),
            "1.0.0",
            &[(&format!("pkg{}", index + 1), "1.0.0")],
        );
    }
    fetcher.add_package("pkg1000", "1.0.0", &[]);

    let solution =
        gather_and_resolve(&fetcher, "pkg0", DependencyBehavior::Lowest).expect("resolve");
    assert_eq!(solution.len(), 1001);
    assert!(solution
        .iter()
        .all(|identity| identity.version.to_string() == "1.0.0"));
    // Dependencies first: the tail of the chain leads the output.
    assert_eq!(solution.first().unwrap().id, "pkg1000");
    assert_eq!(solution.last().unwrap().id, "pkg0");
}

#[test]
fn end_to_end_diamond_picks_one_version_per_id() {
    let fetcher = MapFetcher::new();
    fetcher.add_package("app", "1.0.0", &[("left", "1.0"), ("right", "1.0")]);
    fetcher.add_package("left", "1.0.0", &[("shared", "1.0")]);
    fetcher.add_package("right", "1.0.0", &[("shared", "2.0")]);
    fetcher.add_package("shared", "1.0.0", &[]);
    fetcher.add_package("shared", "2.0.0", &[]);
    fetcher.add_package("shared", "3.0.0", &[]);

    let solution =
        gather_and_resolve(&fetcher, "app", DependencyBehavior::Lowest).expect("resolve");
    assert_eq!(solution.len(), 4);
    let shared = solution.iter().find(|p| p.id == "shared").unwrap();
    assert_eq!(shared.version.to_string(), "2.0.0");
}

#[test]
fn missing_root_surfaces_package_not_found() {
    let fetcher = MapFetcher::new();
    let token = CancellationToken::new();
    let cache = RequestCache::new();
    let client = DependencyInfoClient::new(&fetcher, Some(BASE.to_string()));
    let gather = GatherContext {
        target_ids: vec!["nothere".to_string()],
        ..GatherContext::default()
    };
    let err = client.gather(&gather, &cache, &token).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ResolverError>(),
        Some(ResolverError::PackageNotFound { .. })
    ));
}

#[test]
fn cancellation_propagates_through_the_pipeline() {
    let fetcher = MapFetcher::new();
    fetcher.add_package("app", "1.0.0", &[]);
    let token = CancellationToken::new();
    token.cancel();
    let cache = RequestCache::new();
    let client = DependencyInfoClient::new(&fetcher, Some(BASE.to_string()));
    let gather = GatherContext {
        target_ids: vec!["app".to_string()],
        ..GatherContext::default()
    };
    assert!(client.gather(&gather, &cache, &token).is_err());
}
