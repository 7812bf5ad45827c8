use std::collections::HashMap;

use chai_store::Store;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupeStats {
    pub new_canons: usize,
    pub reassigned_packages: usize,
    pub unchanged_packages: usize,
}

/// One package's latest homepage candidate, before canonicalization.
struct HomepageCandidate {
    package_id: Uuid,
    package_name: String,
    url: String,
}

pub struct Deduplicator {
    pool: PgPool,
}

impl Deduplicator {
    pub fn new(store: &Store) -> Self {
        Self { pool: store.pool().clone() }
    }

    /// Run one deduplication pass (spec.md §4.7). When `write` is false
    /// (`LOAD=false`), the delta is computed and logged but no row is
    /// written — a dry run.
    pub async fn run(&self, write: bool) -> Result<DedupeStats> {
        let mut canon_by_url = self.load_canons().await?;
        let candidates = self.load_latest_homepages().await?;

        let mut stats = DedupeStats::default();
        let mut desired: HashMap<Uuid, (Uuid, String)> = HashMap::new();

        for candidate in candidates {
            let canonical = match chai_canon::canonical(&candidate.url) {
                Ok(url) => url,
                Err(e) => {
                    warn!(package_id = %candidate.package_id, url = candidate.url, error = %e, "Dropping malformed homepage");
                    continue;
                }
            };

            let canon_id = match canon_by_url.get(&canonical) {
                Some(id) => *id,
                None => {
                    stats.new_canons += 1;
                    if write {
                        let id = self.insert_canon(&canonical, &candidate.package_name).await?;
                        canon_by_url.insert(canonical.clone(), id);
                        id
                    } else {
                        // Dry run: no id exists yet, so this package's
                        // reassignment can't be evaluated against `current`
                        // below. It's already counted in `new_canons`.
                        continue;
                    }
                }
            };

            desired.insert(candidate.package_id, (canon_id, canonical));
        }

        let current = self.load_current_canon_packages().await?;
        for (package_id, (canon_id, _)) in &desired {
            match current.get(package_id) {
                Some(existing) if existing == canon_id => stats.unchanged_packages += 1,
                _ => {
                    stats.reassigned_packages += 1;
                    if write {
                        self.upsert_canon_package(*package_id, *canon_id).await?;
                    }
                }
            }
        }

        info!(
            new_canons = stats.new_canons,
            reassigned_packages = stats.reassigned_packages,
            unchanged_packages = stats.unchanged_packages,
            write,
            "Deduplication pass complete"
        );

        Ok(stats)
    }

    async fn load_canons(&self) -> Result<HashMap<String, Uuid>> {
        let rows: Vec<(String, Uuid)> = sqlx::query_as("SELECT url, id FROM canons")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn load_latest_homepages(&self) -> Result<Vec<HomepageCandidate>> {
        let rows: Vec<(Uuid, String, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT ON (p.id) p.id, p.name, u.url
            FROM packages p
            JOIN package_urls pu ON pu.package_id = p.id
            JOIN urls u ON u.id = pu.url_id
            JOIN url_types ut ON ut.id = u.url_type_id
            WHERE ut.name = 'homepage'
            ORDER BY p.id, u.updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(package_id, package_name, url)| HomepageCandidate { package_id, package_name, url })
            .collect())
    }

    async fn load_current_canon_packages(&self) -> Result<HashMap<Uuid, Uuid>> {
        let rows: Vec<(Uuid, Uuid)> = sqlx::query_as("SELECT package_id, canon_id FROM canon_packages")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn insert_canon(&self, url: &str, name: &str) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO canons (url, name)
            VALUES ($1, $2)
            ON CONFLICT (url) DO UPDATE SET url = EXCLUDED.url
            RETURNING id
            "#,
        )
        .bind(url)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Only writes a row when `canon_id` actually changes — the basis for
    /// the "no writes after the first run" idempotence property.
    async fn upsert_canon_package(&self, package_id: Uuid, canon_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO canon_packages (package_id, canon_id)
            VALUES ($1, $2)
            ON CONFLICT (package_id)
            DO UPDATE SET canon_id = EXCLUDED.canon_id
            WHERE canon_packages.canon_id IS DISTINCT FROM EXCLUDED.canon_id
            "#,
        )
        .bind(package_id)
        .bind(canon_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
