//! Homebrew adapter: non-authoritative, gzip-fetched JSON formula feed.
//! Absence from a snapshot never deletes (spec.md §4.5) since the feed is
//! a merge source, not a full re-publish guarantee.

use std::path::Path;

use async_trait::async_trait;
use chai_common::normalized::{NormalizedDependency, NormalizedPackage};
use chai_common::{Authoritative, DependencyType};
use chai_fetch::FetchKind;
use serde::Deserialize;

use crate::adapter::Adapter;
use crate::error::{AdapterError, Result};

pub const SOURCE_URL: &str = "https://formulae.brew.sh/api/formula.json.gz";

pub struct HomebrewAdapter;

#[derive(Debug, Deserialize)]
struct Formula {
    name: String,
    desc: Option<String>,
    homepage: Option<String>,
    urls: Option<FormulaUrls>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    build_dependencies: Vec<String>,
    #[serde(default)]
    test_dependencies: Vec<String>,
    #[serde(default)]
    recommended_dependencies: Vec<String>,
    #[serde(default)]
    optional_dependencies: Vec<String>,
    #[serde(default)]
    uses_from_macos: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FormulaUrls {
    stable: Option<FormulaStableUrl>,
}

#[derive(Debug, Deserialize)]
struct FormulaStableUrl {
    url: Option<String>,
}

fn uses_from_macos_name(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(name) => Some(name.clone()),
        serde_json::Value::Object(map) => map.get("name").and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}

#[async_trait]
impl Adapter for HomebrewAdapter {
    fn name(&self) -> &str {
        "homebrew"
    }

    fn authoritative(&self) -> Authoritative {
        Authoritative::Partial
    }

    fn fetch_kind(&self) -> FetchKind {
        FetchKind::Gzip
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
    let path = snapshot_dir.join("formula.json");
    if !path.exists() {
        return Err(AdapterError::MissingFile(path.display().to_string()));
    }
    let raw = std::fs::read_to_string(path)?;
    let formulae: Vec<Formula> = serde_json::from_str(&raw)?;

    Ok(formulae.into_iter().map(normalize).collect())
}

fn normalize(formula: Formula) -> NormalizedPackage {
    let mut pkg = NormalizedPackage::new(formula.name.clone(), formula.name.clone());
    if let Some(desc) = formula.desc {
        pkg = pkg.with_readme(desc);
    }
    if let Some(homepage) = formula.homepage {
        pkg = pkg.with_url("homepage", homepage);
    }
    if let Some(url) = formula.urls.and_then(|u| u.stable).and_then(|s| s.url) {
        pkg = pkg.with_url("source", url);
    }

    for dep in &formula.dependencies {
        pkg = pkg.with_dependency(dep, DependencyType::Runtime);
    }
    for dep in &formula.build_dependencies {
        pkg = pkg.with_dependency(dep, DependencyType::Build);
    }
    for dep in &formula.test_dependencies {
        pkg = pkg.with_dependency(dep, DependencyType::Test);
    }
    for dep in &formula.recommended_dependencies {
        pkg = pkg.with_dependency(dep, DependencyType::Recommended);
    }
    for dep in &formula.optional_dependencies {
        pkg = pkg.with_dependency(dep, DependencyType::Optional);
    }
    for dep in formula.uses_from_macos.iter().filter_map(uses_from_macos_name) {
        pkg.dependencies.push(NormalizedDependency {
            dependency_import_id: dep,
            dependency_type: DependencyType::UsesFromMacos,
            semver_range: None,
        });
    }

    pkg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_formula_fields_and_dependency_buckets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("formula.json"),
            r#"[
                {
                    "name": "jq",
                    "desc": "command-line JSON processor",
                    "homepage": "https://jqlang.github.io/jq/",
                    "urls": {"stable": {"url": "https://github.com/jqlang/jq/releases/jq-1.7.tar.gz"}},
                    "dependencies": ["oniguruma"],
                    "build_dependencies": ["automake"],
                    "uses_from_macos": ["libedit", {"name": "zlib", "since": "catalina"}]
                }
            ]"#,
        )
        .unwrap();

        let adapter = HomebrewAdapter;
        let packages = adapter.parse(dir.path()).await.unwrap();
        assert_eq!(packages.len(), 1);
        let jq = &packages[0];
        assert_eq!(jq.import_id, "jq");
        assert!(jq.urls["homepage"].contains("https://jqlang.github.io/jq/"));
        assert!(jq.urls["source"].iter().next().unwrap().contains("jq-1.7.tar.gz"));
        assert_eq!(jq.dependencies.len(), 4);
        assert!(jq.dependencies.iter().any(|d| d.dependency_import_id == "zlib"
            && d.dependency_type == DependencyType::UsesFromMacos));
    }

    #[tokio::test]
    async fn missing_formula_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = HomebrewAdapter;
        assert!(adapter.parse(dir.path()).await.is_err());
    }
}
