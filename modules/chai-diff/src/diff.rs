//! Pure diff: snapshot + cache in, `Delta` out. No I/O, no database — this
//! keeps the algorithm trivially unit-testable and deterministic, which
//! matters for the idempotence property (`diff(s, ingest(diff(s, c))) =
//! empty`).

use std::collections::{HashMap, HashSet};

use chai_common::dependency_type::highest_priority;
use chai_common::{
    Cache, Delta, DependencyType, NewDependency, NewPackage, NewPackageUrl, NewUrl, PackageChanges,
    RemovedDependency, UpdatedPackage,
};
use chai_common::normalized::NormalizedPackage;
use tracing::warn;

/// Produce the minimal delta to bring `cache` into alignment with
/// `snapshot`. `snapshot` order does not matter — output order is always
/// sorted by natural key (spec.md §4.4 step 5).
pub fn diff(snapshot: &[NormalizedPackage], cache: &Cache) -> Delta {
    let mut sorted: Vec<&NormalizedPackage> = snapshot.iter().collect();
    sorted.sort_by(|a, b| a.import_id.cmp(&b.import_id));

    let snapshot_import_ids: HashSet<&str> = sorted.iter().map(|p| p.import_id.as_str()).collect();
    let resolvable: HashSet<&str> = cache
        .package_map
        .keys()
        .map(|s| s.as_str())
        .chain(snapshot_import_ids.iter().copied())
        .collect();

    let mut new_packages = Vec::new();
    let mut updated_packages = Vec::new();
    let mut new_urls = Vec::new();
    let mut new_urls_seen: HashSet<(String, String)> = HashSet::new();
    let mut new_package_urls = Vec::new();
    let mut new_package_urls_seen: HashSet<(String, String, String)> = HashSet::new();
    let mut new_deps = Vec::new();
    let mut removed_deps = Vec::new();

    for pkg in &sorted {
        diff_package(
            pkg,
            cache,
            &resolvable,
            &mut new_packages,
            &mut updated_packages,
            &mut new_urls,
            &mut new_urls_seen,
            &mut new_package_urls,
            &mut new_package_urls_seen,
            &mut new_deps,
            &mut removed_deps,
        );
    }

    new_urls.sort_by(|a: &NewUrl, b: &NewUrl| (&a.url, &a.url_type).cmp(&(&b.url, &b.url_type)));
    new_package_urls.sort_by(|a: &NewPackageUrl, b: &NewPackageUrl| {
        (&a.package_import_id, &a.url_type, &a.url).cmp(&(&b.package_import_id, &b.url_type, &b.url))
    });
    new_deps.sort_by(|a: &NewDependency, b: &NewDependency| {
        (&a.package_import_id, &a.dependency_import_id).cmp(&(&b.package_import_id, &b.dependency_import_id))
    });
    removed_deps.sort_by(|a: &RemovedDependency, b: &RemovedDependency| {
        (&a.package_import_id, &a.dependency_import_id).cmp(&(&b.package_import_id, &b.dependency_import_id))
    });

    Delta {
        new_packages,
        updated_packages,
        new_urls,
        new_package_urls,
        removed_package_urls: Vec::new(),
        new_deps,
        removed_deps,
    }
}

#[allow(clippy::too_many_arguments)]
fn diff_package(
    pkg: &NormalizedPackage,
    cache: &Cache,
    resolvable: &HashSet<&str>,
    new_packages: &mut Vec<NewPackage>,
    updated_packages: &mut Vec<UpdatedPackage>,
    new_urls: &mut Vec<NewUrl>,
    new_urls_seen: &mut HashSet<(String, String)>,
    new_package_urls: &mut Vec<NewPackageUrl>,
    new_package_urls_seen: &mut HashSet<(String, String, String)>,
    new_deps: &mut Vec<NewDependency>,
    removed_deps: &mut Vec<RemovedDependency>,
) {
    let existing = cache.package(&pkg.import_id);

    match existing {
        None => new_packages.push(NewPackage {
            import_id: pkg.import_id.clone(),
            name: pkg.name.clone(),
            readme: pkg.readme.clone(),
        }),
        Some(entry) => {
            let mut changes = PackageChanges::default();
            if entry.name != pkg.name {
                changes.name = Some(pkg.name.clone());
            }
            if entry.readme != pkg.readme {
                changes.readme = Some(pkg.readme.clone());
            }
            if !changes.is_empty() {
                updated_packages.push(UpdatedPackage { import_id: pkg.import_id.clone(), changes });
            }
        }
    }

    let package_id = existing.map(|e| e.id);

    for (url_type, urls) in &pkg.urls {
        for raw_url in urls {
            let canonical = match chai_canon::canonical(raw_url) {
                Ok(url) => url,
                Err(e) => {
                    warn!(package = %pkg.import_id, url = raw_url, error = %e, "Dropping malformed URL");
                    continue;
                }
            };

            let url_key = (canonical.clone(), url_type.clone());
            let url_is_new = !cache.url_map.contains_key(&url_key);
            if url_is_new && new_urls_seen.insert(url_key.clone()) {
                new_urls.push(NewUrl { url: canonical.clone(), url_type: url_type.clone() });
            }

            let already_linked = match (package_id, cache.url(&canonical, url_type)) {
                (Some(pid), Some(url_entry)) => cache.has_package_url(pid, url_entry.id),
                _ => false,
            };

            let link_key = (pkg.import_id.clone(), url_type.clone(), canonical.clone());
            if !already_linked && new_package_urls_seen.insert(link_key) {
                new_package_urls.push(NewPackageUrl {
                    package_import_id: pkg.import_id.clone(),
                    url: canonical,
                    url_type: url_type.clone(),
                });
            }
        }
    }

    let mut by_dependency: HashMap<&str, Vec<DependencyType>> = HashMap::new();
    for dep in &pkg.dependencies {
        if !resolvable.contains(dep.dependency_import_id.as_str()) {
            warn!(
                package = %pkg.import_id,
                dependency = %dep.dependency_import_id,
                "Dropping dependency edge with unresolvable endpoint"
            );
            continue;
        }
        by_dependency.entry(dep.dependency_import_id.as_str()).or_default().push(dep.dependency_type);
    }

    let desired: HashMap<&str, DependencyType> = by_dependency
        .into_iter()
        .filter_map(|(dep_id, types)| highest_priority(types).map(|t| (dep_id, t)))
        .collect();

    let current = cache.dependencies.get(&pkg.import_id);

    for (dep_id, dep_type) in &desired {
        match current.and_then(|deps| deps.get(*dep_id)) {
            None => new_deps.push(NewDependency {
                package_import_id: pkg.import_id.clone(),
                dependency_import_id: dep_id.to_string(),
                dependency_type: dep_type.as_str().to_string(),
                semver_range: semver_for(pkg, dep_id, *dep_type),
            }),
            Some(existing_type) if existing_type == dep_type => {}
            Some(existing_type) => {
                removed_deps.push(RemovedDependency {
                    package_import_id: pkg.import_id.clone(),
                    dependency_import_id: dep_id.to_string(),
                    dependency_type: existing_type.as_str().to_string(),
                });
                new_deps.push(NewDependency {
                    package_import_id: pkg.import_id.clone(),
                    dependency_import_id: dep_id.to_string(),
                    dependency_type: dep_type.as_str().to_string(),
                    semver_range: semver_for(pkg, dep_id, *dep_type),
                });
            }
        }
    }

    if let Some(current) = current {
        for (dep_id, dep_type) in current {
            if !desired.contains_key(dep_id.as_str()) {
                removed_deps.push(RemovedDependency {
                    package_import_id: pkg.import_id.clone(),
                    dependency_import_id: dep_id.clone(),
                    dependency_type: dep_type.as_str().to_string(),
                });
            }
        }
    }
}

fn semver_for(pkg: &NormalizedPackage, dep_id: &str, dep_type: DependencyType) -> Option<String> {
    pkg.dependencies
        .iter()
        .find(|d| d.dependency_import_id == dep_id && d.dependency_type == dep_type)
        .and_then(|d| d.semver_range.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chai_common::{PackageCacheEntry, UrlCacheEntry};
    use uuid::Uuid;

    fn pkg(import_id: &str, name: &str) -> NormalizedPackage {
        NormalizedPackage::new(import_id, name)
    }

    #[test]
    fn new_package_is_staged() {
        let cache = Cache::new(Uuid::new_v4());
        let snapshot = vec![pkg("serde", "serde")];
        let delta = diff(&snapshot, &cache);
        assert_eq!(delta.new_packages.len(), 1);
        assert_eq!(delta.new_packages[0].import_id, "serde");
    }

    #[test]
    fn unchanged_package_produces_empty_delta() {
        let mut cache = Cache::new(Uuid::new_v4());
        cache.package_map.insert(
            "serde".to_string(),
            PackageCacheEntry { id: Uuid::new_v4(), name: "serde".to_string(), readme: None },
        );
        let snapshot = vec![pkg("serde", "serde")];
        let delta = diff(&snapshot, &cache);
        assert!(delta.is_empty());
    }

    #[test]
    fn changed_name_produces_update_with_only_that_field() {
        let mut cache = Cache::new(Uuid::new_v4());
        cache.package_map.insert(
            "serde".to_string(),
            PackageCacheEntry { id: Uuid::new_v4(), name: "old-name".to_string(), readme: Some("r".to_string()) },
        );
        let snapshot = vec![pkg("serde", "serde").with_readme("r")];
        let delta = diff(&snapshot, &cache);
        assert_eq!(delta.updated_packages.len(), 1);
        let changes = &delta.updated_packages[0].changes;
        assert_eq!(changes.name.as_deref(), Some("serde"));
        assert!(changes.readme.is_none());
    }

    #[test]
    fn malformed_url_is_dropped_not_fatal() {
        let cache = Cache::new(Uuid::new_v4());
        let snapshot = vec![pkg("x", "x").with_url("homepage", "ht!tp://broken")];
        let delta = diff(&snapshot, &cache);
        assert!(delta.new_urls.is_empty());
        assert!(delta.new_packages[0].import_id == "x");
    }

    #[test]
    fn new_url_and_link_staged_together() {
        let cache = Cache::new(Uuid::new_v4());
        let snapshot = vec![pkg("x", "x").with_url("homepage", "https://example.com")];
        let delta = diff(&snapshot, &cache);
        assert_eq!(delta.new_urls.len(), 1);
        assert_eq!(delta.new_urls[0].url, "https://example.com");
        assert_eq!(delta.new_package_urls.len(), 1);
        assert_eq!(delta.new_package_urls[0].package_import_id, "x");
    }

    #[test]
    fn existing_link_is_not_restaged() {
        let mut cache = Cache::new(Uuid::new_v4());
        let pid = Uuid::new_v4();
        let uid = Uuid::new_v4();
        cache.package_map.insert("x".to_string(), PackageCacheEntry { id: pid, name: "x".to_string(), readme: None });
        cache
            .url_map
            .insert(("https://example.com".to_string(), "homepage".to_string()), UrlCacheEntry { id: uid });
        cache.package_urls.entry(pid).or_default().insert(uid);

        let snapshot = vec![pkg("x", "x").with_url("homepage", "https://example.com")];
        let delta = diff(&snapshot, &cache);
        assert!(delta.new_urls.is_empty());
        assert!(delta.new_package_urls.is_empty());
    }

    #[test]
    fn stale_urls_are_never_removed() {
        let mut cache = Cache::new(Uuid::new_v4());
        let pid = Uuid::new_v4();
        let uid = Uuid::new_v4();
        cache.package_map.insert("x".to_string(), PackageCacheEntry { id: pid, name: "x".to_string(), readme: None });
        cache
            .url_map
            .insert(("https://old.example.com".to_string(), "homepage".to_string()), UrlCacheEntry { id: uid });
        cache.package_urls.entry(pid).or_default().insert(uid);

        let snapshot = vec![pkg("x", "x").with_url("homepage", "https://new.example.com")];
        let delta = diff(&snapshot, &cache);
        assert!(delta.removed_package_urls.is_empty());
        assert_eq!(delta.new_urls.len(), 1);
    }

    #[test]
    fn dependency_type_change_emits_remove_and_add() {
        let mut cache = Cache::new(Uuid::new_v4());
        cache.package_map.insert("a".to_string(), PackageCacheEntry { id: Uuid::new_v4(), name: "a".to_string(), readme: None });
        cache.package_map.insert("b".to_string(), PackageCacheEntry { id: Uuid::new_v4(), name: "b".to_string(), readme: None });
        cache.dependencies.entry("a".to_string()).or_default().insert("b".to_string(), DependencyType::Build);

        let snapshot = vec![pkg("a", "a").with_dependency("b", DependencyType::Runtime), pkg("b", "b")];
        let delta = diff(&snapshot, &cache);
        assert_eq!(delta.removed_deps.len(), 1);
        assert_eq!(delta.removed_deps[0].dependency_type, "build");
        assert_eq!(delta.new_deps.len(), 1);
        assert_eq!(delta.new_deps[0].dependency_type, "runtime");
    }

    #[test]
    fn dependency_with_multiple_types_keeps_highest_priority() {
        let cache = Cache::new(Uuid::new_v4());
        let mut a = pkg("a", "a");
        a.dependencies.push(chai_common::normalized::NormalizedDependency {
            dependency_import_id: "b".to_string(),
            dependency_type: DependencyType::Optional,
            semver_range: None,
        });
        a.dependencies.push(chai_common::normalized::NormalizedDependency {
            dependency_import_id: "b".to_string(),
            dependency_type: DependencyType::Runtime,
            semver_range: Some("^1".to_string()),
        });
        let snapshot = vec![a, pkg("b", "b")];
        let delta = diff(&snapshot, &cache);
        assert_eq!(delta.new_deps.len(), 1);
        assert_eq!(delta.new_deps[0].dependency_type, "runtime");
        assert_eq!(delta.new_deps[0].semver_range.as_deref(), Some("^1"));
    }

    #[test]
    fn unresolvable_dependency_endpoint_is_dropped() {
        let cache = Cache::new(Uuid::new_v4());
        let snapshot = vec![pkg("a", "a").with_dependency("missing", DependencyType::Runtime)];
        let delta = diff(&snapshot, &cache);
        assert!(delta.new_deps.is_empty());
    }

    #[test]
    fn removed_dependency_edge_not_in_snapshot() {
        let mut cache = Cache::new(Uuid::new_v4());
        cache.package_map.insert("a".to_string(), PackageCacheEntry { id: Uuid::new_v4(), name: "a".to_string(), readme: None });
        cache.package_map.insert("b".to_string(), PackageCacheEntry { id: Uuid::new_v4(), name: "b".to_string(), readme: None });
        cache.dependencies.entry("a".to_string()).or_default().insert("b".to_string(), DependencyType::Runtime);

        let snapshot = vec![pkg("a", "a"), pkg("b", "b")];
        let delta = diff(&snapshot, &cache);
        assert_eq!(delta.removed_deps.len(), 1);
        assert_eq!(delta.removed_deps[0].dependency_import_id, "b");
    }

    #[test]
    fn output_order_is_deterministic_regardless_of_input_order() {
        let cache = Cache::new(Uuid::new_v4());
        let forward = vec![pkg("a", "a"), pkg("b", "b"), pkg("c", "c")];
        let backward = vec![pkg("c", "c"), pkg("b", "b"), pkg("a", "a")];
        let d1 = diff(&forward, &cache);
        let d2 = diff(&backward, &cache);
        let ids1: Vec<_> = d1.new_packages.iter().map(|p| p.import_id.clone()).collect();
        let ids2: Vec<_> = d2.new_packages.iter().map(|p| p.import_id.clone()).collect();
        assert_eq!(ids1, ids2);
        assert_eq!(ids1, vec!["a", "b", "c"]);
    }

    #[test]
    fn diff_against_fully_ingested_cache_is_empty() {
        let mut cache = Cache::new(Uuid::new_v4());
        let pid = Uuid::new_v4();
        let uid = Uuid::new_v4();
        cache.package_map.insert("a".to_string(), PackageCacheEntry { id: pid, name: "a".to_string(), readme: Some("r".to_string()) });
        cache
            .url_map
            .insert(("https://a.example.com".to_string(), "homepage".to_string()), UrlCacheEntry { id: uid });
        cache.package_urls.entry(pid).or_default().insert(uid);

        let snapshot = vec![pkg("a", "a").with_readme("r").with_url("homepage", "https://a.example.com")];
        let delta = diff(&snapshot, &cache);
        assert!(delta.is_empty());
    }
}
