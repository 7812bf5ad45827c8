//! In-memory projection of the store's current graph, used as the diff
//! baseline for one pipeline run. Read-only during a diff — mutations only
//! ever live in the `Delta` the diff produces.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::dependency_type::DependencyType;

#[derive(Debug, Clone, PartialEq)]
pub struct PackageCacheEntry {
    pub id: Uuid,
    pub name: String,
    pub readme: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlCacheEntry {
    pub id: Uuid,
}

/// `(canonical_url, url_type_name)`.
pub type UrlKey = (String, String);

#[derive(Debug, Clone, Default)]
pub struct Cache {
    pub package_manager_id: Uuid,
    /// `import_id -> PackageCacheEntry`.
    pub package_map: HashMap<String, PackageCacheEntry>,
    /// Non-canonical URLs already in the store are omitted here by
    /// construction (they are loaded but filtered before insertion) — see
    /// `chai-store`'s `load_current_urls`.
    pub url_map: HashMap<UrlKey, UrlCacheEntry>,
    /// `package_id -> set of url_id`.
    pub package_urls: HashMap<Uuid, HashSet<Uuid>>,
    /// `import_id -> (dependency_import_id -> dependency_type)`. Both
    /// endpoints of every entry are guaranteed present in `package_map` by
    /// construction (chai-store only loads edges between packages of the
    /// same package manager partition).
    pub dependencies: HashMap<String, HashMap<String, DependencyType>>,
}

impl Cache {
    pub fn new(package_manager_id: Uuid) -> Self {
        Self {
            package_manager_id,
            ..Default::default()
        }
    }

    pub fn package(&self, import_id: &str) -> Option<&PackageCacheEntry> {
        self.package_map.get(import_id)
    }

    pub fn url(&self, url: &str, url_type: &str) -> Option<&UrlCacheEntry> {
        self.url_map.get(&(url.to_string(), url_type.to_string()))
    }

    pub fn has_package_url(&self, package_id: Uuid, url_id: Uuid) -> bool {
        self.package_urls
            .get(&package_id)
            .is_some_and(|urls| urls.contains(&url_id))
    }

    pub fn dependency_type(&self, import_id: &str, dependency_import_id: &str) -> Option<DependencyType> {
        self.dependencies
            .get(import_id)
            .and_then(|deps| deps.get(dependency_import_id))
            .copied()
    }

    /// All import_ids currently known for this package manager — the basis
    /// for deletion detection (`cache.import_ids \ snapshot.import_ids`).
    pub fn import_ids(&self) -> HashSet<&str> {
        self.package_map.keys().map(|s| s.as_str()).collect()
    }

    /// Debug-only invariant check: every dependency endpoint resolves
    /// within `package_map`. A violation here means `chai-store` loaded an
    /// edge that crosses package-manager partitions, which should never
    /// happen.
    #[cfg(debug_assertions)]
    pub fn validate(&self) -> Result<(), String> {
        for (package_import_id, deps) in &self.dependencies {
            if !self.package_map.contains_key(package_import_id) {
                return Err(format!("dependency source {package_import_id} missing from package_map"));
            }
            for dep_import_id in deps.keys() {
                if !self.package_map.contains_key(dep_import_id) {
                    return Err(format!("dependency target {dep_import_id} missing from package_map"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: Uuid) -> PackageCacheEntry {
        PackageCacheEntry { id, name: "pkg".to_string(), readme: None }
    }

    #[test]
    fn validate_passes_when_all_endpoints_resolve() {
        let mut cache = Cache::new(Uuid::new_v4());
        cache.package_map.insert("a".to_string(), entry(Uuid::new_v4()));
        cache.package_map.insert("b".to_string(), entry(Uuid::new_v4()));
        cache
            .dependencies
            .entry("a".to_string())
            .or_default()
            .insert("b".to_string(), DependencyType::Runtime);

        assert!(cache.validate().is_ok());
    }

    #[test]
    fn validate_fails_on_dangling_endpoint() {
        let mut cache = Cache::new(Uuid::new_v4());
        cache.package_map.insert("a".to_string(), entry(Uuid::new_v4()));
        cache
            .dependencies
            .entry("a".to_string())
            .or_default()
            .insert("missing".to_string(), DependencyType::Runtime);

        assert!(cache.validate().is_err());
    }

    #[test]
    fn import_ids_reflects_package_map() {
        let mut cache = Cache::new(Uuid::new_v4());
        cache.package_map.insert("a".to_string(), entry(Uuid::new_v4()));
        cache.package_map.insert("b".to_string(), entry(Uuid::new_v4()));
        let ids = cache.import_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("a"));
    }
}
