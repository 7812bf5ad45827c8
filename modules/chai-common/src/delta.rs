//! Output shape of the Diff engine: five disjoint sets of changes between a
//! parsed snapshot and the current `Cache`. Plain data — the diff engine
//! (`chai-diff`) builds it, the store (`chai-store`) consumes it inside one
//! transaction.

#[derive(Debug, Clone, PartialEq)]
pub struct NewPackage {
    pub import_id: String,
    pub name: String,
    pub readme: Option<String>,
}

/// Only the fields that changed are `Some`. `readme` is `Option<Option<String>>`
/// because clearing a readme (`Some(None)`) is a real, distinct update from
/// leaving it untouched (`None`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackageChanges {
    pub name: Option<String>,
    pub readme: Option<Option<String>>,
}

impl PackageChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.readme.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedPackage {
    pub import_id: String,
    pub changes: PackageChanges,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUrl {
    pub url: String,
    pub url_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPackageUrl {
    pub package_import_id: String,
    pub url: String,
    pub url_type: String,
}

/// Never populated by the current diff algorithm: package-URL links are
/// append-only (spec.md Open Question "does a homepage change remove the old
/// link" resolved as no, see DESIGN.md). Kept so the five-set shape is
/// explicit and a future policy change doesn't need a new type.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedPackageUrl {
    pub package_import_id: String,
    pub url: String,
    pub url_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDependency {
    pub package_import_id: String,
    pub dependency_import_id: String,
    pub dependency_type: String,
    pub semver_range: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemovedDependency {
    pub package_import_id: String,
    pub dependency_import_id: String,
    pub dependency_type: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    pub new_packages: Vec<NewPackage>,
    pub updated_packages: Vec<UpdatedPackage>,
    pub new_urls: Vec<NewUrl>,
    pub new_package_urls: Vec<NewPackageUrl>,
    pub removed_package_urls: Vec<RemovedPackageUrl>,
    pub new_deps: Vec<NewDependency>,
    pub removed_deps: Vec<RemovedDependency>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.new_packages.is_empty()
            && self.updated_packages.is_empty()
            && self.new_urls.is_empty()
            && self.new_package_urls.is_empty()
            && self.removed_package_urls.is_empty()
            && self.new_deps.is_empty()
            && self.removed_deps.is_empty()
    }

    /// One-line summary for the INGESTING log line (spec.md §10.1 style).
    pub fn summary(&self) -> String {
        format!(
            "new_packages={} updated_packages={} new_urls={} new_package_urls={} removed_package_urls={} new_deps={} removed_deps={}",
            self.new_packages.len(),
            self.updated_packages.len(),
            self.new_urls.len(),
            self.new_package_urls.len(),
            self.removed_package_urls.len(),
            self.new_deps.len(),
            self.removed_deps.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_delta_reports_empty() {
        assert!(Delta::default().is_empty());
    }

    #[test]
    fn non_empty_delta_reports_not_empty() {
        let delta = Delta {
            new_packages: vec![NewPackage {
                import_id: "a".to_string(),
                name: "a".to_string(),
                readme: None,
            }],
            ..Default::default()
        };
        assert!(!delta.is_empty());
    }

    #[test]
    fn package_changes_empty_when_no_fields_set() {
        assert!(PackageChanges::default().is_empty());
        assert!(!PackageChanges { name: Some("x".to_string()), ..Default::default() }.is_empty());
    }
}
