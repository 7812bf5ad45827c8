pub mod cache;
pub mod config;
pub mod delta;
pub mod dependency_type;
pub mod model;
pub mod normalized;

pub use cache::{Cache, PackageCacheEntry, UrlCacheEntry};
pub use config::Config;
pub use delta::{
    Delta, NewDependency, NewPackage, NewPackageUrl, NewUrl, PackageChanges, RemovedDependency,
    RemovedPackageUrl, UpdatedPackage,
};
pub use dependency_type::DependencyType;
pub use normalized::{Authoritative, NormalizedDependency, NormalizedPackage, NormalizedUser};
