//! crates.io adapter: authoritative, full tarball dump. Reads the
//! db-dump's CSV-lite subset (spec.md §4.8): `crates.csv` for package
//! identity and homepage/repository/documentation links, `dependencies.csv`
//! for edges with Cargo's own `kind` column.

use std::path::Path;

use async_trait::async_trait;
use chai_common::normalized::NormalizedPackage;
use chai_common::{Authoritative, DependencyType};
use chai_fetch::FetchKind;
use serde::Deserialize;
use tracing::warn;

use crate::adapter::Adapter;
use crate::error::Result;

pub const SOURCE_URL: &str = "https://static.crates.io/db-dump.tar.gz";

pub struct CratesAdapter;

#[derive(Debug, Deserialize)]
struct CrateRow {
    id: String,
    name: String,
    description: Option<String>,
    homepage: Option<String>,
    repository: Option<String>,
    documentation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DependencyRow {
    crate_id: String,
    dependency_id: String,
    kind: String,
    req: Option<String>,
}

fn map_kind(kind: &str) -> Option<DependencyType> {
    match kind {
        "normal" => Some(DependencyType::Runtime),
        "build" => Some(DependencyType::Build),
        "dev" => Some(DependencyType::Test),
        other => {
            warn!(kind = other, "Unrecognized crates.io dependency kind, dropping edge");
            None
        }
    }
}

#[async_trait]
impl Adapter for CratesAdapter {
    fn name(&self) -> &str {
        "crates"
    }

    fn authoritative(&self) -> Authoritative {
        Authoritative::Full
    }

    fn fetch_kind(&self) -> FetchKind {
        FetchKind::Tarball
    }

    fn source_url(&self) -> &str {
        SOURCE_URL
    }

    async fn parse(&self, snapshot_dir: &Path) -> Result<Vec<NormalizedPackage>> {
        let snapshot_dir = snapshot_dir.to_path_buf();
        tokio::task::spawn_blocking(move || parse_sync(&snapshot_dir))
            .await
            .expect("blocking parse task panicked")
    }
}

fn parse_sync(snapshot_dir: &Path) -> Result<Vec<NormalizedPackage>> {
    let mut packages = Vec::new();

    let mut reader = csv::Reader::from_path(snapshot_dir.join("crates.csv"))?;
    for row in reader.deserialize() {
        let row: CrateRow = row?;
        let mut pkg = NormalizedPackage::new(row.id, row.name);
        if let Some(description) = row.description {
            pkg = pkg.with_readme(description);
        }
        if let Some(homepage) = row.homepage {
            pkg = pkg.with_url("homepage", homepage);
        }
        if let Some(repository) = row.repository {
            pkg = pkg.with_url("repository", repository);
        }
        if let Some(documentation) = row.documentation {
            pkg = pkg.with_url("documentation", documentation);
        }
        packages.push(pkg);
    }

    let deps_path = snapshot_dir.join("dependencies.csv");
    if deps_path.exists() {
        let by_id: std::collections::HashMap<String, usize> = packages
            .iter()
            .enumerate()
            .map(|(i, p)| (p.import_id.clone(), i))
            .collect();

        let mut reader = csv::Reader::from_path(deps_path)?;
        for row in reader.deserialize() {
            let row: DependencyRow = row?;
            let Some(dependency_type) = map_kind(&row.kind) else { continue };
            let Some(&idx) = by_id.get(&row.crate_id) else { continue };
            packages[idx].dependencies.push(chai_common::normalized::NormalizedDependency {
                dependency_import_id: row.dependency_id,
                dependency_type,
                semver_range: row.req,
            });
        }
    }

    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn parses_crates_and_maps_dependency_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let mut crates_csv = std::fs::File::create(dir.path().join("crates.csv")).unwrap();
        writeln!(crates_csv, "id,name,description,homepage,repository,documentation").unwrap();
        writeln!(crates_csv, "1,serde,a serialization framework,https://serde.rs,,").unwrap();
        writeln!(crates_csv, "2,proc-macro2,,,,").unwrap();
        drop(crates_csv);

        let mut deps_csv = std::fs::File::create(dir.path().join("dependencies.csv")).unwrap();
        writeln!(deps_csv, "crate_id,dependency_id,kind,req").unwrap();
        writeln!(deps_csv, "1,2,normal,^1").unwrap();
        drop(deps_csv);

        let adapter = CratesAdapter;
        let packages = adapter.parse(dir.path()).await.unwrap();
        assert_eq!(packages.len(), 2);

        let serde = packages.iter().find(|p| p.import_id == "1").unwrap();
        assert_eq!(serde.name, "serde");
        assert!(serde.urls["homepage"].contains("https://serde.rs"));
        assert_eq!(serde.dependencies.len(), 1);
        assert_eq!(serde.dependencies[0].dependency_type, DependencyType::Runtime);
        assert_eq!(serde.dependencies[0].semver_range.as_deref(), Some("^1"));
    }

    #[tokio::test]
    async fn unknown_dependency_kind_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut crates_csv = std::fs::File::create(dir.path().join("crates.csv")).unwrap();
        writeln!(crates_csv, "id,name,description,homepage,repository,documentation").unwrap();
        writeln!(crates_csv, "1,a,,,,").unwrap();
        writeln!(crates_csv, "2,b,,,,").unwrap();
        drop(crates_csv);

        let mut deps_csv = std::fs::File::create(dir.path().join("dependencies.csv")).unwrap();
        writeln!(deps_csv, "crate_id,dependency_id,kind,req").unwrap();
        writeln!(deps_csv, "1,2,weird,").unwrap();
        drop(deps_csv);

        let adapter = CratesAdapter;
        let packages = adapter.parse(dir.path()).await.unwrap();
        let a = packages.iter().find(|p| p.import_id == "1").unwrap();
        assert!(a.dependencies.is_empty());
    }
}
