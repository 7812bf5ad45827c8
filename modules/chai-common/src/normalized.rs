//! The uniform record shape every per-adapter parser must produce. Upstream
//! records have wildly varying shapes (crates.io CSV rows, Homebrew JSON
//! formulae, Debian control-file stanzas); `NormalizedPackage` is the one
//! tagged shape the rest of the pipeline understands. Per-adapter parsers
//! are the only code that knows source-specific shapes — everything
//! downstream (Diff, Cache, Store) only ever sees this.

use std::collections::{HashMap, HashSet};

use crate::dependency_type::DependencyType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDependency {
    pub dependency_import_id: String,
    pub dependency_type: DependencyType,
    pub semver_range: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUser {
    pub username: String,
    pub source_id: String,
}

/// One package as read out of an upstream snapshot, before canonicalization
/// or comparison against the store's current state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedPackage {
    pub import_id: String,
    pub name: String,
    pub readme: Option<String>,
    /// Raw URLs by type name, as the adapter found them. Canonicalization
    /// and dedup across types happens in the Diff engine, not here.
    pub urls: HashMap<String, HashSet<String>>,
    pub dependencies: Vec<NormalizedDependency>,
    pub users: Vec<NormalizedUser>,
}

impl NormalizedPackage {
    pub fn new(import_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            import_id: import_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_readme(mut self, readme: impl Into<String>) -> Self {
        self.readme = Some(readme.into());
        self
    }

    pub fn with_url(mut self, url_type: impl Into<String>, url: impl Into<String>) -> Self {
        self.urls.entry(url_type.into()).or_default().insert(url.into());
        self
    }

    pub fn with_dependency(
        mut self,
        dependency_import_id: impl Into<String>,
        dependency_type: DependencyType,
    ) -> Self {
        self.dependencies.push(NormalizedDependency {
            dependency_import_id: dependency_import_id.into(),
            dependency_type,
            semver_range: None,
        });
        self
    }
}

/// Whether an adapter's upstream is a full dump (deletion-safe) or a
/// partial/merge feed (absence is not evidence of removal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authoritative {
    /// A full re-publish of the ecosystem each run; absence means deleted.
    Full,
    /// A partial or append-only feed; absence means "not seen this run",
    /// not "removed".
    Partial,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_urls_and_deps() {
        let pkg = NormalizedPackage::new("serde", "serde")
            .with_readme("a serialization framework")
            .with_url("homepage", "https://serde.rs/")
            .with_dependency("proc-macro2", DependencyType::Runtime);

        assert_eq!(pkg.import_id, "serde");
        assert_eq!(pkg.readme.as_deref(), Some("a serialization framework"));
        assert!(pkg.urls["homepage"].contains("https://serde.rs/"));
        assert_eq!(pkg.dependencies.len(), 1);
    }
}
