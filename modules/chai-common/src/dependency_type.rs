use std::fmt;
use std::str::FromStr;

/// Dependency edge kind. Ordering matters: `priority()` implements the
/// store's "at most one edge per (package, dependency)" rule — the highest
/// priority kind from a parsed snapshot wins, lower-priority edges from the
/// same source record are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum DependencyType {
    Runtime,
    Build,
    Test,
    Recommended,
    Optional,
    UsesFromMacos,
}

impl DependencyType {
    /// Higher number wins when the same (package, dependency) pair appears
    /// more than once in a parsed snapshot with different kinds.
    pub fn priority(self) -> u8 {
        match self {
            DependencyType::Runtime => 6,
            DependencyType::Build => 5,
            DependencyType::Test => 4,
            DependencyType::Recommended => 3,
            DependencyType::Optional => 2,
            DependencyType::UsesFromMacos => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DependencyType::Runtime => "runtime",
            DependencyType::Build => "build",
            DependencyType::Test => "test",
            DependencyType::Recommended => "recommended",
            DependencyType::Optional => "optional",
            DependencyType::UsesFromMacos => "uses_from_macos",
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown dependency type: {0}")]
pub struct UnknownDependencyType(pub String);

impl FromStr for DependencyType {
    type Err = UnknownDependencyType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "runtime" => Ok(DependencyType::Runtime),
            "build" => Ok(DependencyType::Build),
            "test" => Ok(DependencyType::Test),
            "recommended" => Ok(DependencyType::Recommended),
            "optional" => Ok(DependencyType::Optional),
            "uses_from_macos" => Ok(DependencyType::UsesFromMacos),
            other => Err(UnknownDependencyType(other.to_string())),
        }
    }
}

/// Pick the single highest-priority type among candidates declared for the
/// same (package, dependency) pair in one parsed snapshot.
pub fn highest_priority(types: impl IntoIterator<Item = DependencyType>) -> Option<DependencyType> {
    types.into_iter().max_by_key(|t| t.priority())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_beats_build() {
        let chosen = highest_priority([DependencyType::Build, DependencyType::Runtime]).unwrap();
        assert_eq!(chosen, DependencyType::Runtime);
    }

    #[test]
    fn full_priority_order() {
        let order = [
            DependencyType::UsesFromMacos,
            DependencyType::Optional,
            DependencyType::Recommended,
            DependencyType::Test,
            DependencyType::Build,
            DependencyType::Runtime,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].priority() < pair[1].priority());
        }
    }

    #[test]
    fn round_trips_through_str() {
        for dt in [
            DependencyType::Runtime,
            DependencyType::Build,
            DependencyType::Test,
            DependencyType::Recommended,
            DependencyType::Optional,
            DependencyType::UsesFromMacos,
        ] {
            assert_eq!(dt.as_str().parse::<DependencyType>().unwrap(), dt);
        }
    }
}
