//! Obsolete Chain Resolver
//!
//! A root marked `obsolete` carries a `[✓ID]` correction marker in its
//! `level_1`. Resolution follows that marker, and the one on whatever it
//! points to, until a non-obsolete entry is reached or a cycle closes.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::StoreError;

fn correction_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[✓([A-Za-z0-9.]+)\]").expect("valid regex"))
}

/// Extract the first `[✓ID]` correction reference from `content`, if any.
pub fn extract_correction_ref(content: &str) -> Option<String> {
    correction_marker_re()
        .captures(content)
        .map(|c| c[1].to_string())
}

/// The outcome of following an obsolete chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObsoleteResolution {
    /// The terminal entry — non-obsolete, or the entry where a cycle closed.
    pub resolved_id: String,
    /// Full traversal order, starting with the ID that was resolved.
    pub chain: Vec<String>,
    /// `true` if the chain was truncated due to a cycle.
    pub cycle: bool,
}

/// Follow the obsolete chain starting at `start_id`.
///
/// `is_obsolete` returns `None` when an ID does not exist (treated as a
/// terminal), `correction_ref` returns the next ID in the chain (`None`
/// terminates it even if the entry is still marked obsolete — a broken
/// chain). In `lenient` mode a detected cycle degrades to a truncated
/// resolution instead of an error; callers on strict/write paths should
/// pass `lenient = false`.
pub fn resolve(
    start_id: &str,
    lenient: bool,
    mut is_obsolete: impl FnMut(&str) -> Option<bool>,
    mut correction_ref: impl FnMut(&str) -> Option<String>,
) -> Result<ObsoleteResolution, StoreError> {
    let mut visited = HashSet::new();
    let mut chain = vec![start_id.to_string()];
    let mut current = start_id.to_string();

    loop {
        let Some(obsolete) = is_obsolete(&current) else {
            break;
        };
        if !obsolete {
            break;
        }
        if !visited.insert(current.clone()) {
            if lenient {
                return Ok(ObsoleteResolution {
                    resolved_id: current,
                    chain,
                    cycle: true,
                });
            }
            return Err(StoreError::ObsoleteCycle(start_id.to_string()));
        }
        let Some(next) = correction_ref(&current) else {
            break;
        };
        current = next;
        chain.push(current.clone());
    }

    Ok(ObsoleteResolution {
        resolved_id: current,
        chain,
        cycle: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookups(
        entries: &HashMap<&str, (bool, Option<&str>)>,
    ) -> (impl FnMut(&str) -> Option<bool> + '_, impl FnMut(&str) -> Option<String> + '_) {
        let is_obsolete = move |id: &str| entries.get(id).map(|(o, _)| *o);
        let correction_ref =
            move |id: &str| entries.get(id).and_then(|(_, c)| c.map(|s| s.to_string()));
        (is_obsolete, correction_ref)
    }

    #[test]
    fn extracts_checkmark_marker() {
        assert_eq!(
            extract_correction_ref("superseded — see [\u{2713}E0002]"),
            Some("E0002".to_string())
        );
        assert_eq!(extract_correction_ref("no marker here"), None);
    }

    #[test]
    fn resolves_single_hop_chain() {
        let mut entries = HashMap::new();
        entries.insert("E0001", (true, Some("E0002")));
        entries.insert("E0002", (false, None));
        let (is_obs, corr) = lookups(&entries);
        let res = resolve("E0001", false, is_obs, corr).unwrap();
        assert_eq!(res.resolved_id, "E0002");
        assert_eq!(res.chain, vec!["E0001", "E0002"]);
        assert!(!res.cycle);
    }

    #[test]
    fn multi_hop_chain_follows_to_the_end() {
        let mut entries = HashMap::new();
        entries.insert("E0001", (true, Some("E0002")));
        entries.insert("E0002", (true, Some("E0003")));
        entries.insert("E0003", (false, None));
        let (is_obs, corr) = lookups(&entries);
        let res = resolve("E0001", false, is_obs, corr).unwrap();
        assert_eq!(res.resolved_id, "E0003");
        assert_eq!(res.chain, vec!["E0001", "E0002", "E0003"]);
    }

    #[test]
    fn cycle_is_error_in_strict_mode() {
        let mut entries = HashMap::new();
        entries.insert("E0001", (true, Some("E0002")));
        entries.insert("E0002", (true, Some("E0001")));
        let (is_obs, corr) = lookups(&entries);
        let err = resolve("E0001", false, is_obs, corr).unwrap_err();
        assert_eq!(err.kind(), "obsolete_cycle");
    }

    #[test]
    fn cycle_truncates_in_lenient_mode() {
        let mut entries = HashMap::new();
        entries.insert("E0001", (true, Some("E0002")));
        entries.insert("E0002", (true, Some("E0001")));
        let (is_obs, corr) = lookups(&entries);
        let res = resolve("E0001", true, is_obs, corr).unwrap();
        assert!(res.cycle);
    }

    #[test]
    fn broken_chain_stops_at_dangling_marker() {
        let mut entries = HashMap::new();
        entries.insert("E0001", (true, None));
        let (is_obs, corr) = lookups(&entries);
        let res = resolve("E0001", false, is_obs, corr).unwrap();
        assert_eq!(res.resolved_id, "E0001");
        assert_eq!(res.chain, vec!["E0001"]);
    }
}
