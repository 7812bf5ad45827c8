use std::collections::HashMap;

use chai_common::{model::derived_id, Cache, Delta, PackageCacheEntry, UrlCacheEntry};
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Counts written to `load_histories` and logged at the end of a pipeline
/// run. Mirrors the five delta sets plus the deletion count, which the
/// diff engine itself never computes (spec.md §4.5: deletion detection is a
/// pipeline-level step, gated on `Authoritative::Full`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestStats {
    pub new_packages: usize,
    pub updated_packages: usize,
    pub new_urls: usize,
    pub new_package_urls: usize,
    pub removed_package_urls: usize,
    pub new_deps: usize,
    pub removed_deps: usize,
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Resolve (and create if absent) the package manager row for `name`,
    /// returning its id.
    pub async fn ensure_package_manager(&self, name: &str) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO package_managers (name) VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn url_type_ids(&self) -> Result<HashMap<String, Uuid>> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as("SELECT id, name FROM url_types")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id, name)| (name, id)).collect())
    }

    pub async fn dependency_type_ids(&self) -> Result<HashMap<String, Uuid>> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as("SELECT id, name FROM dependency_types")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id, name)| (name, id)).collect())
    }

    /// Load the current graph for one package manager into an in-memory
    /// `Cache`. Packages, urls, and dependency edges are fetched
    /// concurrently; building the lookup indexes after all three land is
    /// the same shape as a bulk graph load elsewhere in this codebase.
    pub async fn load_cache(&self, package_manager_id: Uuid) -> Result<Cache> {
        let (packages, urls, deps) = tokio::try_join!(
            self.load_packages(package_manager_id),
            self.load_urls(package_manager_id),
            self.load_dependencies(package_manager_id),
        )?;

        let mut cache = Cache::new(package_manager_id);

        let mut id_to_import_id = HashMap::with_capacity(packages.len());
        for (import_id, id, name, readme) in packages {
            id_to_import_id.insert(id, import_id.clone());
            cache
                .package_map
                .insert(import_id, PackageCacheEntry { id, name, readme });
        }

        for (url, url_type, id, package_id) in urls {
            cache.url_map.insert((url, url_type), UrlCacheEntry { id });
            if let Some(package_id) = package_id {
                cache.package_urls.entry(package_id).or_default().insert(id);
            }
        }

        for (package_id, dependency_id, dep_type) in deps {
            let (Some(package_import_id), Some(dependency_import_id)) = (
                id_to_import_id.get(&package_id),
                id_to_import_id.get(&dependency_id),
            ) else {
                continue;
            };
            let dep_type = dep_type
                .parse()
                .map_err(|_| StoreError::UnknownDependencyType(dep_type.clone()))?;
            cache
                .dependencies
                .entry(package_import_id.clone())
                .or_default()
                .insert(dependency_import_id.clone(), dep_type);
        }

        info!(
            package_manager_id = %package_manager_id,
            packages = cache.package_map.len(),
            urls = cache.url_map.len(),
            "Loaded store cache"
        );

        Ok(cache)
    }

    async fn load_packages(
        &self,
        package_manager_id: Uuid,
    ) -> Result<Vec<(String, Uuid, String, Option<String>)>> {
        let rows: Vec<(String, Uuid, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT import_id, id, name, readme
            FROM packages
            WHERE package_manager_id = $1
            "#,
        )
        .bind(package_manager_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// URLs attached to at least one package of this package manager. A URL
    /// shared with another ecosystem (post-canon merge) is still returned
    /// once per distinct `(url, type)` — the per-package link is carried in
    /// `package_urls`, not duplicated url rows.
    async fn load_urls(
        &self,
        package_manager_id: Uuid,
    ) -> Result<Vec<(String, String, Uuid, Option<Uuid>)>> {
        let rows: Vec<(String, String, Uuid, Option<Uuid>)> = sqlx::query_as(
            r#"
            SELECT DISTINCT u.url, ut.name, u.id, pu.package_id
            FROM urls u
            JOIN url_types ut ON ut.id = u.url_type_id
            JOIN package_urls pu ON pu.url_id = u.id
            JOIN packages p ON p.id = pu.package_id
            WHERE p.package_manager_id = $1
            "#,
        )
        .bind(package_manager_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn load_dependencies(&self, package_manager_id: Uuid) -> Result<Vec<(Uuid, Uuid, String)>> {
        let rows: Vec<(Uuid, Uuid, String)> = sqlx::query_as(
            r#"
            SELECT d.package_id, d.dependency_id, dt.name
            FROM dependencies d
            JOIN dependency_types dt ON dt.id = d.dependency_type_id
            JOIN packages p ON p.id = d.package_id
            WHERE p.package_manager_id = $1
            "#,
        )
        .bind(package_manager_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Apply a `Delta` inside one transaction. `url_type_ids` /
    /// `dependency_type_ids` are the vocabularies loaded once per pipeline
    /// run (spec.md §10.1: name lookups, not re-queried per row).
    pub async fn ingest(
        &self,
        package_manager_id: Uuid,
        pm_name: &str,
        cache: &Cache,
        delta: &Delta,
        url_type_ids: &HashMap<String, Uuid>,
        dependency_type_ids: &HashMap<String, Uuid>,
    ) -> Result<IngestStats> {
        let mut tx = self.pool.begin().await?;

        let mut package_ids: HashMap<String, Uuid> = HashMap::new();

        for new_package in &delta.new_packages {
            let id = insert_package(&mut tx, package_manager_id, pm_name, new_package).await?;
            package_ids.insert(new_package.import_id.clone(), id);
        }

        for updated in &delta.updated_packages {
            update_package(&mut tx, package_manager_id, updated).await?;
        }

        let mut url_ids: HashMap<(String, String), Uuid> = HashMap::new();
        for new_url in &delta.new_urls {
            let url_type_id = url_type_ids
                .get(&new_url.url_type)
                .copied()
                .ok_or_else(|| StoreError::UnknownUrlType(new_url.url_type.clone()))?;
            let id = upsert_url(&mut tx, &new_url.url, url_type_id).await?;
            url_ids.insert((new_url.url.clone(), new_url.url_type.clone()), id);
        }

        let resolve_package_id = |import_id: &str, package_ids: &HashMap<String, Uuid>| -> Option<Uuid> {
            package_ids
                .get(import_id)
                .copied()
                .or_else(|| cache.package(import_id).map(|e| e.id))
        };

        for link in &delta.new_package_urls {
            let Some(package_id) = resolve_package_id(&link.package_import_id, &package_ids) else {
                continue;
            };
            let url_id = url_ids
                .get(&(link.url.clone(), link.url_type.clone()))
                .copied()
                .or_else(|| cache.url(&link.url, &link.url_type).map(|e| e.id));
            let Some(url_id) = url_id else { continue };
            insert_package_url(&mut tx, package_id, url_id).await?;
        }

        for removed in &delta.removed_package_urls {
            let Some(package_id) = resolve_package_id(&removed.package_import_id, &package_ids) else {
                continue;
            };
            let Some(url_id) = cache.url(&removed.url, &removed.url_type).map(|e| e.id) else {
                continue;
            };
            delete_package_url(&mut tx, package_id, url_id).await?;
        }

        for dep in &delta.new_deps {
            let Some(package_id) = resolve_package_id(&dep.package_import_id, &package_ids) else {
                continue;
            };
            let Some(dependency_id) = resolve_package_id(&dep.dependency_import_id, &package_ids) else {
                continue;
            };
            let dependency_type_id = dependency_type_ids
                .get(&dep.dependency_type)
                .copied()
                .ok_or_else(|| StoreError::UnknownDependencyType(dep.dependency_type.clone()))?;
            upsert_dependency(&mut tx, package_id, dependency_id, dependency_type_id, dep.semver_range.as_deref())
                .await?;
        }

        for removed in &delta.removed_deps {
            let (Some(package_id), Some(dependency_id)) = (
                resolve_package_id(&removed.package_import_id, &package_ids),
                resolve_package_id(&removed.dependency_import_id, &package_ids),
            ) else {
                continue;
            };
            delete_dependency(&mut tx, package_id, dependency_id).await?;
        }

        tx.commit().await?;

        Ok(IngestStats {
            new_packages: delta.new_packages.len(),
            updated_packages: delta.updated_packages.len(),
            new_urls: delta.new_urls.len(),
            new_package_urls: delta.new_package_urls.len(),
            removed_package_urls: delta.removed_package_urls.len(),
            new_deps: delta.new_deps.len(),
            removed_deps: delta.removed_deps.len(),
        })
    }

    /// Delete packages absent from an authoritative adapter's latest
    /// snapshot. Cascades to package_urls, dependencies, canon_packages,
    /// and user_packages via foreign keys.
    pub async fn delete_packages_by_import_id(
        &self,
        package_manager_id: Uuid,
        import_ids: &[String],
    ) -> Result<u64> {
        if import_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            r#"
            DELETE FROM packages
            WHERE package_manager_id = $1 AND import_id = ANY($2)
            "#,
        )
        .bind(package_manager_id)
        .bind(import_ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn start_load_history(&self, package_manager_id: Uuid) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO load_histories (package_manager_id, started_at)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(package_manager_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn finish_load_history(
        &self,
        id: Uuid,
        stats: &IngestStats,
        deleted_packages: u64,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE load_histories
            SET finished_at = $2,
                new_packages = $3,
                updated_packages = $4,
                new_urls = $5,
                new_package_urls = $6,
                removed_package_urls = $7,
                new_deps = $8,
                removed_deps = $9,
                deleted_packages = $10,
                error = $11
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .bind(stats.new_packages as i32)
        .bind(stats.updated_packages as i32)
        .bind(stats.new_urls as i32)
        .bind(stats.new_package_urls as i32)
        .bind(stats.removed_package_urls as i32)
        .bind(stats.new_deps as i32)
        .bind(stats.removed_deps as i32)
        .bind(deleted_packages as i32)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn insert_package(
    tx: &mut Transaction<'_, Postgres>,
    package_manager_id: Uuid,
    pm_name: &str,
    new_package: &chai_common::NewPackage,
) -> Result<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO packages (package_manager_id, import_id, derived_id, name, readme)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(package_manager_id)
    .bind(&new_package.import_id)
    .bind(derived_id(pm_name, &new_package.import_id))
    .bind(&new_package.name)
    .bind(&new_package.readme)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

async fn update_package(
    tx: &mut Transaction<'_, Postgres>,
    package_manager_id: Uuid,
    updated: &chai_common::UpdatedPackage,
) -> Result<()> {
    if let Some(name) = &updated.changes.name {
        sqlx::query(
            r#"
            UPDATE packages SET name = $3, updated_at = now()
            WHERE package_manager_id = $1 AND import_id = $2
            "#,
        )
        .bind(package_manager_id)
        .bind(&updated.import_id)
        .bind(name)
        .execute(&mut **tx)
        .await?;
    }
    if let Some(readme) = &updated.changes.readme {
        sqlx::query(
            r#"
            UPDATE packages SET readme = $3, updated_at = now()
            WHERE package_manager_id = $1 AND import_id = $2
            "#,
        )
        .bind(package_manager_id)
        .bind(&updated.import_id)
        .bind(readme)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn upsert_url(tx: &mut Transaction<'_, Postgres>, url: &str, url_type_id: Uuid) -> Result<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO urls (url, url_type_id, updated_at)
        VALUES ($1, $2, now())
        ON CONFLICT (url, url_type_id) DO UPDATE SET updated_at = now()
        RETURNING id
        "#,
    )
    .bind(url)
    .bind(url_type_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

async fn insert_package_url(tx: &mut Transaction<'_, Postgres>, package_id: Uuid, url_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO package_urls (package_id, url_id)
        VALUES ($1, $2)
        ON CONFLICT (package_id, url_id) DO NOTHING
        "#,
    )
    .bind(package_id)
    .bind(url_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn delete_package_url(tx: &mut Transaction<'_, Postgres>, package_id: Uuid, url_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM package_urls WHERE package_id = $1 AND url_id = $2")
        .bind(package_id)
        .bind(url_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn upsert_dependency(
    tx: &mut Transaction<'_, Postgres>,
    package_id: Uuid,
    dependency_id: Uuid,
    dependency_type_id: Uuid,
    semver_range: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO dependencies (package_id, dependency_id, dependency_type_id, semver_range)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (package_id, dependency_id)
        DO UPDATE SET dependency_type_id = EXCLUDED.dependency_type_id, semver_range = EXCLUDED.semver_range
        "#,
    )
    .bind(package_id)
    .bind(dependency_id)
    .bind(dependency_type_id)
    .bind(semver_range)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn delete_dependency(tx: &mut Transaction<'_, Postgres>, package_id: Uuid, dependency_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM dependencies WHERE package_id = $1 AND dependency_id = $2")
        .bind(package_id)
        .bind(dependency_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
