//! Access Scorer
//!
//! Time-weighted ranking so that an entry's organic popularity decays
//! gracefully with age instead of letting old high-count entries bury
//! everything written since.

use chrono::{DateTime, Utc};

/// `access_count / log2(age_in_days + 2)`.
///
/// The `+ 2` floor keeps same-day entries from dividing by a number less
/// than 1 (which would inflate, rather than weight, a fresh entry's score).
pub fn time_weighted_score(access_count: i64, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - created_at).num_days().max(0) as f64;
    access_count as f64 / (age_days + 2.0).log2()
}

/// `max(created_at, max(child created_at))` — the default sort key for
/// bulk listings, so appending to an old root surfaces it without
/// changing its identity.
pub fn effective_date<'a>(
    created_at: DateTime<Utc>,
    child_created_ats: impl Iterator<Item = &'a DateTime<Utc>>,
) -> DateTime<Utc> {
    child_created_ats.copied().fold(created_at, |acc, ts| acc.max(ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn score_decays_with_age_at_fixed_access_count() {
        let now = Utc::now();
        let fresh = time_weighted_score(10, now, now);
        let old = time_weighted_score(10, now - Duration::days(365), now);
        assert!(fresh > old);
    }

    #[test]
    fn score_grows_with_access_count_at_fixed_age() {
        let now = Utc::now();
        let created = now - Duration::days(10);
        let low = time_weighted_score(1, created, now);
        let high = time_weighted_score(20, created, now);
        assert!(high > low);
    }

    #[test]
    fn zero_access_count_scores_zero() {
        let now = Utc::now();
        assert_eq!(time_weighted_score(0, now, now), 0.0);
    }

    #[test]
    fn effective_date_takes_the_max_of_root_and_children() {
        let root = Utc::now() - Duration::days(10);
        let newer_child = Utc::now() - Duration::days(1);
        let older_child = Utc::now() - Duration::days(20);
        let result = effective_date(root, [older_child, newer_child].iter());
        assert_eq!(result, newer_child);
    }

    #[test]
    fn effective_date_with_no_children_is_root_created_at() {
        let root = Utc::now() - Duration::days(5);
        let empty: Vec<DateTime<Utc>> = vec![];
        assert_eq!(effective_date(root, empty.iter()), root);
    }
}
