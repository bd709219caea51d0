//! Configuration
//!
//! A typed value consumed by the [`crate::storage::Store`]; parsing a
//! config file (if any) is the adapter's job, not the engine's. The engine
//! only ever sees a fully-built [`Config`].

use std::collections::BTreeMap;

/// Per-prefix bulk-read slot sizing (§4.5 of the design doc).
#[derive(Debug, Clone, Copy)]
pub struct BulkReadV2Config {
    /// Newest-slot size per prefix in `discover` mode.
    pub top_newest_count: usize,
    /// Access-slot size per prefix.
    pub top_access_count: usize,
    /// Obsolete-tail size (the "biggest mistakes" list).
    pub top_obsolete_count: usize,
}

impl Default for BulkReadV2Config {
    fn default() -> Self {
        Self {
            top_newest_count: 3,
            top_access_count: 2,
            top_obsolete_count: 3,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum body length at each depth, indexed from depth 1 (index 0).
    pub max_chars_per_level: Vec<usize>,
    /// Maximum legal `depth`; deeper lines flatten onto the last legal level.
    pub max_depth: usize,
    /// Default `limit` applied to bulk reads.
    pub default_read_limit: usize,
    /// Title auto-extraction budget, in characters.
    pub max_title_chars: usize,
    /// Number of organic "top-accessed" promotions considered across prefixes.
    pub access_count_top_n: usize,
    /// Declared prefixes and their human-readable category names.
    pub prefixes: BTreeMap<char, String>,
    /// Header-entry (`X0000`) body text per prefix.
    pub prefix_descriptions: BTreeMap<char, String>,
    /// Bulk-read selector slot sizing.
    pub bulk_read_v2: BulkReadV2Config,
}

impl Config {
    /// Build a config from the two-point shortcut (`maxL1Chars`, `maxLnChars`)
    /// with `max_depth` levels, linearly interpolated, plus the prefix table.
    pub fn with_interpolated_char_budget(
        max_l1_chars: usize,
        max_ln_chars: usize,
        max_depth: usize,
        prefixes: BTreeMap<char, String>,
        prefix_descriptions: BTreeMap<char, String>,
    ) -> Self {
        let max_chars_per_level = interpolate(max_l1_chars, max_ln_chars, max_depth);
        Self {
            max_chars_per_level,
            max_depth,
            default_read_limit: 50,
            max_title_chars: 80,
            access_count_top_n: 10,
            prefixes,
            prefix_descriptions,
            bulk_read_v2: BulkReadV2Config::default(),
        }
    }

    /// Character budget for a given depth (1-based). Depths beyond the
    /// configured table reuse the last configured value.
    pub fn max_chars_for_depth(&self, depth: usize) -> usize {
        let idx = depth.saturating_sub(1).min(self.max_chars_per_level.len().saturating_sub(1));
        self.max_chars_per_level.get(idx).copied().unwrap_or(2000)
    }

    /// Human-readable name for a prefix, or the prefix itself if undeclared.
    pub fn prefix_name(&self, prefix: char) -> String {
        self.prefixes
            .get(&prefix)
            .cloned()
            .unwrap_or_else(|| prefix.to_string())
    }

    /// `true` if `prefix` is declared in the configuration.
    pub fn has_prefix(&self, prefix: char) -> bool {
        self.prefixes.contains_key(&prefix)
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut prefixes = BTreeMap::new();
        prefixes.insert('E', "Engineering decisions".to_string());
        prefixes.insert('L', "Lessons learned".to_string());
        prefixes.insert('P', "Project notes".to_string());
        prefixes.insert('S', "Standing procedures".to_string());

        let mut prefix_descriptions = BTreeMap::new();
        prefix_descriptions.insert('E', "Engineering decisions and their rationale.".to_string());
        prefix_descriptions.insert('L', "Lessons learned from incidents and mistakes.".to_string());
        prefix_descriptions.insert('P', "Project-specific working notes.".to_string());
        prefix_descriptions.insert('S', "Standing operating procedures.".to_string());

        Self::with_interpolated_char_budget(4000, 8000, 5, prefixes, prefix_descriptions)
    }
}

/// Linearly interpolate a per-depth character budget between the L1 and
/// deepest-level values across `levels` entries (levels >= 1).
fn interpolate(first: usize, last: usize, levels: usize) -> Vec<usize> {
    if levels <= 1 {
        return vec![first];
    }
    (0..levels)
        .map(|i| {
            let t = i as f64 / (levels - 1) as f64;
            (first as f64 + t * (last as f64 - first as f64)).round() as usize
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolation_endpoints_match_inputs() {
        let budget = interpolate(100, 500, 5);
        assert_eq!(budget.first().copied(), Some(100));
        assert_eq!(budget.last().copied(), Some(500));
        assert_eq!(budget.len(), 5);
    }

    #[test]
    fn single_level_uses_first_only() {
        assert_eq!(interpolate(100, 500, 1), vec![100]);
    }

    #[test]
    fn default_config_declares_known_prefixes() {
        let config = Config::default();
        assert!(config.has_prefix('E'));
        assert!(!config.has_prefix('Z'));
        assert_eq!(config.max_chars_per_level.len(), 5);
    }

    #[test]
    fn max_chars_for_depth_clamps_beyond_table() {
        let config = Config::default();
        let last = *config.max_chars_per_level.last().unwrap();
        assert_eq!(config.max_chars_for_depth(99), last);
    }
}
