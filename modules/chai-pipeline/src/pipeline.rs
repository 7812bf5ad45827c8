use std::sync::Arc;
use std::time::Instant;

use chai_adapters::Adapter;
use chai_common::Config;
use chai_fetch::Fetcher;
use chai_store::{IngestStats, Store};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Per-invocation state machine (spec.md §4.5). `Failed` carries no payload
/// beyond the propagated error — the caller already has it via the `Err`
/// returned from `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Fetching,
    Parsing,
    LoadingCache,
    Diffing,
    Ingesting,
    Deleting,
    Done,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub adapter: String,
    pub state: PipelineState,
    pub stats: IngestStats,
    pub deleted_packages: u64,
    pub reused_fetch: bool,
    pub elapsed_ms: u128,
}

pub struct Pipeline {
    adapter: Arc<dyn Adapter>,
    store: Store,
    fetcher: Fetcher,
    config: Config,
}

impl Pipeline {
    pub fn new(adapter: Arc<dyn Adapter>, store: Store, fetcher: Fetcher, config: Config) -> Self {
        Self { adapter, store, fetcher, config }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunReport> {
        let start = Instant::now();
        let name = self.adapter.name().to_string();
        let pm_id = self.store.ensure_package_manager(&name).await?;
        let history_id = self.store.start_load_history(pm_id).await?;

        let result = self.run_inner(pm_id, cancel).await;

        match &result {
            Ok(report) => {
                self.store
                    .finish_load_history(history_id, &report.stats, report.deleted_packages, None)
                    .await?;
                info!(
                    adapter = %name,
                    summary = %format_summary(report),
                    elapsed_ms = report.elapsed_ms,
                    "Pipeline run complete"
                );
            }
            Err(e) => {
                self.store
                    .finish_load_history(history_id, &IngestStats::default(), 0, Some(&e.to_string()))
                    .await?;
            }
        }

        result.map(|mut report| {
            report.elapsed_ms = start.elapsed().as_millis();
            report
        })
    }

    async fn run_inner(&self, pm_id: uuid::Uuid, cancel: &CancellationToken) -> Result<RunReport> {
        let check_cancelled = |state: PipelineState| {
            if cancel.is_cancelled() {
                debug!(adapter = self.adapter.name(), ?state, "Cancellation observed");
                Err(PipelineError::Cancelled)
            } else {
                Ok(())
            }
        };

        check_cancelled(PipelineState::Fetching)?;
        debug!(adapter = self.adapter.name(), "Fetching");
        let (snapshot_dir, reused) = self.obtain_snapshot_dir().await?;

        check_cancelled(PipelineState::Parsing)?;
        debug!(adapter = self.adapter.name(), "Parsing + loading cache");
        let (snapshot, cache) = tokio::try_join!(
            self.parse(&snapshot_dir),
            self.load_cache(pm_id),
        )?;

        check_cancelled(PipelineState::Diffing)?;
        debug!(adapter = self.adapter.name(), "Diffing");
        let delta = chai_diff::diff(&snapshot, &cache);

        let (url_type_ids, dependency_type_ids) =
            tokio::try_join!(self.store.url_type_ids(), self.store.dependency_type_ids())?;

        debug!(adapter = self.adapter.name(), summary = %delta.summary(), "Ingesting");
        let stats = self
            .store
            .ingest(pm_id, self.adapter.name(), &cache, &delta, &url_type_ids, &dependency_type_ids)
            .await?;

        let deleted_packages = if self.adapter.authoritative() == chai_common::Authoritative::Full {
            debug!(adapter = self.adapter.name(), "Deleting absent packages");
            let snapshot_ids: std::collections::HashSet<&str> =
                snapshot.iter().map(|p| p.import_id.as_str()).collect();
            let to_delete: Vec<String> = cache
                .import_ids()
                .into_iter()
                .filter(|id| !snapshot_ids.contains(id))
                .map(str::to_string)
                .collect();
            self.store.delete_packages_by_import_id(pm_id, &to_delete).await?
        } else {
            0
        };

        if self.config.no_cache && !reused {
            let _ = self.fetcher.cleanup(&snapshot_dir).await;
        }

        Ok(RunReport {
            adapter: self.adapter.name().to_string(),
            state: PipelineState::Done,
            stats,
            deleted_packages,
            reused_fetch: reused,
            elapsed_ms: 0,
        })
    }

    async fn obtain_snapshot_dir(&self) -> Result<(std::path::PathBuf, bool)> {
        if self.config.test {
            return Ok((self.config.data_root.join("fixtures").join(self.adapter.name()), true));
        }
        if !self.config.fetch {
            let outcome = self.fetcher.reuse_last(self.adapter.name()).await?;
            return Ok((outcome.dir, outcome.reused));
        }
        let outcome = self
            .fetcher
            .fetch(self.adapter.name(), self.adapter.source_url(), self.adapter.fetch_kind())
            .await?;
        Ok((outcome.dir, outcome.reused))
    }

    async fn parse(&self, dir: &std::path::Path) -> Result<Vec<chai_common::NormalizedPackage>> {
        Ok(self.adapter.parse(dir).await?)
    }

    async fn load_cache(&self, pm_id: uuid::Uuid) -> Result<chai_common::Cache> {
        Ok(self.store.load_cache(pm_id).await?)
    }
}

fn format_summary(report: &RunReport) -> String {
    format!(
        "new_packages={} updated_packages={} new_urls={} new_package_urls={} new_deps={} removed_deps={} deleted_packages={}",
        report.stats.new_packages,
        report.stats.updated_packages,
        report.stats.new_urls,
        report.stats.new_package_urls,
        report.stats.new_deps,
        report.stats.removed_deps,
        report.deleted_packages,
    )
}
