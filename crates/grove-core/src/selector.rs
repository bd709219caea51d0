//! Bulk-Read Selector (V2)
//!
//! Produces the default "snapshot" returned when `read` is called with no
//! `id`: groups candidates by prefix, allocates expansion slots, applies
//! session-cache suppression, and sets the obsolete tail aside. This module
//! is pure — it never touches storage. The caller hands it the already
//! role-filtered, non-irrelevant, non-header candidate set and gets back a
//! plan the storage layer executes (loading children/links for whichever
//! IDs ended up expanded).

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::entry::{Entry, Promotion};
use crate::scoring::time_weighted_score;
use crate::session_cache::{Mode, SessionCache};

/// One prefix's worth of the plan.
#[derive(Debug, Clone)]
pub struct PrefixGroup {
    pub prefix: char,
    pub header_id: String,
    /// IDs that earned an expansion slot, in display order, with why.
    pub expanded: Vec<(String, Promotion)>,
    /// IDs shown only as compact titles.
    pub compact: Vec<String>,
}

/// The full selector output for one bulk read.
#[derive(Debug, Clone)]
pub struct BulkReadPlan {
    pub mode: Mode,
    pub groups: Vec<PrefixGroup>,
    /// Top-N obsolete entries by score, across all prefixes.
    pub obsolete_tail: Vec<String>,
    /// Obsolete entries that exist but didn't make the tail.
    pub obsolete_hidden: usize,
    /// Every ID surfaced anywhere in this plan (expanded, compact, or tail).
    pub delivered_ids: HashSet<String>,
    /// The subset of `delivered_ids` that earned favorite/pinned/access status.
    pub promoted_ids: HashSet<String>,
}

/// Run the V2 selection pipeline over an already-filtered candidate set
/// (role-gated, non-irrelevant, `seq > 0`).
pub fn plan_bulk_read(
    candidates: &[Entry],
    session: &SessionCache,
    config: &Config,
    now: DateTime<Utc>,
) -> BulkReadPlan {
    let mode = session.mode();
    let mut by_prefix: BTreeMap<char, Vec<&Entry>> = BTreeMap::new();
    for entry in candidates {
        by_prefix.entry(entry.prefix).or_default().push(entry);
    }

    let mut groups = Vec::with_capacity(by_prefix.len());
    let mut delivered_ids = HashSet::new();
    let mut promoted_ids = HashSet::new();
    let mut obsolete_candidates: Vec<&Entry> = Vec::new();

    for (prefix, group) in &by_prefix {
        let has_active = group.iter().any(|e| e.active);
        let eligible: Vec<&Entry> = if has_active {
            group.iter().copied().filter(|e| e.active).collect()
        } else {
            group.clone()
        };

        obsolete_candidates.extend(group.iter().copied().filter(|e| e.obsolete));
        let non_obsolete: Vec<&Entry> = eligible.iter().copied().filter(|e| !e.obsolete).collect();

        let pinned: Vec<&Entry> = non_obsolete.iter().copied().filter(|e| e.pinned).collect();
        let favorite: Vec<&Entry> = non_obsolete
            .iter()
            .copied()
            .filter(|e| e.favorite && !e.pinned)
            .collect();

        let remaining: Vec<&Entry> = non_obsolete
            .iter()
            .copied()
            .filter(|e| !e.pinned && !e.favorite)
            .collect();

        let (newest_slots, access_slots) = match mode {
            Mode::Discover => (
                session.newest_slot_budget(&config.bulk_read_v2),
                session.access_slot_budget(&config.bulk_read_v2),
            ),
            Mode::Essentials => (
                session
                    .newest_slot_budget(&config.bulk_read_v2)
                    .saturating_sub(2)
                    .max(1),
                session.access_slot_budget(&config.bulk_read_v2) + 2,
            ),
        };

        let mut access_sorted: Vec<&Entry> = remaining
            .iter()
            .copied()
            .filter(|e| e.access_count > 0)
            .collect();
        access_sorted.sort_by(|a, b| {
            time_weighted_score(b.access_count, b.created_at, now)
                .partial_cmp(&time_weighted_score(a.access_count, a.created_at, now))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let access_chosen = suppress_and_backfill(&access_sorted, access_slots, session);

        let access_ids: HashSet<&str> = access_chosen.iter().map(|e| e.id.as_str()).collect();
        let mut newest_sorted: Vec<&Entry> = remaining
            .iter()
            .copied()
            .filter(|e| !access_ids.contains(e.id.as_str()))
            .collect();
        newest_sorted.sort_by(|a, b| b.effective_date.cmp(&a.effective_date));
        let newest_chosen = suppress_and_backfill(&newest_sorted, newest_slots, session);

        let mut expanded = Vec::new();
        for entry in &pinned {
            expanded.push((entry.id.clone(), Promotion::Pinned));
        }
        for entry in &favorite {
            expanded.push((entry.id.clone(), Promotion::Favorite));
        }
        for entry in &access_chosen {
            expanded.push((entry.id.clone(), Promotion::Access));
        }
        for entry in &newest_chosen {
            expanded.push((entry.id.clone(), Promotion::Unpromoted));
        }

        let expanded_ids: HashSet<&str> = expanded.iter().map(|(id, _)| id.as_str()).collect();
        let compact: Vec<String> = group
            .iter()
            .filter(|e| !e.obsolete && !expanded_ids.contains(e.id.as_str()))
            .map(|e| e.id.clone())
            .collect();

        for (id, promotion) in &expanded {
            delivered_ids.insert(id.clone());
            if *promotion != Promotion::Unpromoted {
                promoted_ids.insert(id.clone());
            }
        }
        for id in &compact {
            delivered_ids.insert(id.clone());
        }

        groups.push(PrefixGroup {
            prefix: *prefix,
            header_id: crate::entry::header_id(*prefix),
            expanded,
            compact,
        });
    }

    obsolete_candidates.sort_by(|a, b| {
        time_weighted_score(b.access_count, b.created_at, now)
            .partial_cmp(&time_weighted_score(a.access_count, a.created_at, now))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let tail_len = config.bulk_read_v2.top_obsolete_count.min(obsolete_candidates.len());
    let obsolete_tail: Vec<String> = obsolete_candidates[..tail_len]
        .iter()
        .map(|e| e.id.clone())
        .collect();
    let obsolete_hidden = obsolete_candidates.len() - tail_len;
    for id in &obsolete_tail {
        delivered_ids.insert(id.clone());
    }

    BulkReadPlan {
        mode,
        groups,
        obsolete_tail,
        obsolete_hidden,
        delivered_ids,
        promoted_ids,
    }
}

/// Walk a score-ordered candidate list, taking the first `slots` entries
/// that the session cache does not currently suppress — i.e. remove
/// suppressed IDs, then keep going down the list to backfill.
fn suppress_and_backfill<'a>(
    ordered: &[&'a Entry],
    slots: usize,
    session: &SessionCache,
) -> Vec<&'a Entry> {
    ordered
        .iter()
        .copied()
        .filter(|e| !session.is_suppressed(&e.id))
        .take(slots)
        .collect()
}
