use std::path::Path;

use async_trait::async_trait;
use chai_common::normalized::NormalizedPackage;
use chai_common::Authoritative;
use chai_fetch::FetchKind;

use crate::error::Result;

/// The Parser half of spec.md §6's Fetcher/Parser contract: a directory of
/// already-fetched files in, a stream of normalized packages out. Each
/// concrete adapter also names its own fetch mechanics so the Pipeline
/// never has to special-case an ecosystem.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Package manager name, also the `package_managers.name` row and the
    /// `<data_root>/<name>/` fetch directory.
    fn name(&self) -> &str;

    /// Whether absence from a snapshot is evidence of deletion (spec.md
    /// §4.5's deletion-detection gate).
    fn authoritative(&self) -> Authoritative;

    fn fetch_kind(&self) -> FetchKind;

    fn source_url(&self) -> &str;

    async fn parse(&self, snapshot_dir: &Path) -> Result<Vec<NormalizedPackage>>;
}
