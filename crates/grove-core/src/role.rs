//! Role Filter
//!
//! Role-gated visibility for a shared store. Ordering is
//! `worker < al < pl < ceo`; every read filters `min_role <= caller_role`
//! via a parameterised predicate, never a string-concatenated one.

use serde::{Deserialize, Serialize};

/// Caller or entry clearance level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Default clearance; can read/write entries with `min_role = worker`.
    #[default]
    Worker,
    /// Team-lead clearance.
    Al,
    /// Program-lead clearance.
    Pl,
    /// Top clearance; sees everything.
    Ceo,
}

impl Role {
    /// Numeric rank used for the `min_role <= caller_role` comparison.
    pub fn rank(self) -> i64 {
        match self {
            Role::Worker => 0,
            Role::Al => 1,
            Role::Pl => 2,
            Role::Ceo => 3,
        }
    }

    /// Parse a role from its lowercase name, defaulting to [`Role::Worker`]
    /// on anything unrecognised.
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "al" => Role::Al,
            "pl" => Role::Pl,
            "ceo" => Role::Ceo,
            _ => Role::Worker,
        }
    }

    /// The lowercase wire name for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Worker => "worker",
            Role::Al => "al",
            Role::Pl => "pl",
            Role::Ceo => "ceo",
        }
    }

    /// Minimum role required to write a new shared entry.
    pub fn write_floor() -> Self {
        Role::Al
    }

    /// `true` if `self` may see or act on an entry gated at `min_role`.
    pub fn can_access(self, min_role: Role) -> bool {
        min_role.rank() <= self.rank()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_worker_al_pl_ceo() {
        assert!(Role::Worker < Role::Al);
        assert!(Role::Al < Role::Pl);
        assert!(Role::Pl < Role::Ceo);
    }

    #[test]
    fn can_access_respects_rank() {
        assert!(!Role::Worker.can_access(Role::Pl));
        assert!(Role::Pl.can_access(Role::Pl));
        assert!(Role::Ceo.can_access(Role::Worker));
    }

    #[test]
    fn parse_name_falls_back_to_worker() {
        assert_eq!(Role::parse_name("ceo"), Role::Ceo);
        assert_eq!(Role::parse_name("nonsense"), Role::Worker);
    }
}
