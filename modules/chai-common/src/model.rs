//! Row types mirroring the schema in `chai-store/migrations`. These are the
//! shapes `sqlx::FromRow` hydrates directly; business logic in `chai-diff`
//! and `chai-dedupe` works against these, not against raw rows.

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PackageManagerRow {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PackageRow {
    pub id: Uuid,
    pub package_manager_id: Uuid,
    pub import_id: String,
    pub derived_id: String,
    pub name: String,
    pub readme: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UrlTypeRow {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UrlRow {
    pub id: Uuid,
    pub url: String,
    pub url_type_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PackageUrlRow {
    pub id: Uuid,
    pub package_id: Uuid,
    pub url_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DependencyTypeRow {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DependencyRow {
    pub id: Uuid,
    pub package_id: Uuid,
    pub dependency_id: Uuid,
    pub dependency_type_id: Uuid,
    pub semver_range: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UserPackageRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub package_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CanonRow {
    pub id: Uuid,
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CanonPackageRow {
    pub id: Uuid,
    pub canon_id: Uuid,
    pub package_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TeaRankRow {
    pub canon_id: Uuid,
    pub rank: f64,
    pub calculated_at: DateTime<Utc>,
}

/// `derived_id = pm_name/import_id`, the global identifier spelled out in
/// the glossary.
pub fn derived_id(pm_name: &str, import_id: &str) -> String {
    format!("{pm_name}/{import_id}")
}
