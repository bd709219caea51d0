//! Entry / Node Data Model
//!
//! Two primary entities: a root [`Entry`] identified by a prefix letter and
//! a zero-padded sequence number (`E0007`), and a [`Node`] identified by a
//! compound, dot-separated ID (`E0007.1.2`). [`EntryView`] is the tagged
//! variant the selector and adapter actually hand around — the stored row
//! plus whatever children/links were resolved for a particular response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::role::Role;

/// A root memory entry.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Root ID, e.g. `E0007`.
    pub id: String,
    /// Prefix letter (uppercase, one of the configured prefixes).
    pub prefix: char,
    /// Sequence number within the prefix. `0` marks a header entry.
    pub seq: u32,
    pub created_at: DateTime<Utc>,
    /// Short navigation label.
    pub title: String,
    /// Depth-1 body text.
    pub level_1: String,
    /// Ordered set of linked entry/node IDs.
    pub links: Vec<String>,
    /// Minimum caller role able to see this entry.
    pub min_role: Role,
    pub access_count: i64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub obsolete: bool,
    pub favorite: bool,
    pub pinned: bool,
    pub irrelevant: bool,
    pub active: bool,
    pub secret: bool,
    /// Lowercase hashtags, `#`-prefixed, at most 10.
    pub tags: Vec<String>,
    /// `max(created_at, max(descendant.created_at))`.
    pub effective_date: DateTime<Utc>,
}

impl Entry {
    /// `true` if this is a synthetic per-prefix header (`X0000`).
    pub fn is_header(&self) -> bool {
        self.seq == 0
    }
}

/// A sub-tree node, addressed by a compound ID.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Compound ID, e.g. `E0007.1.2`.
    pub id: String,
    pub parent_id: String,
    pub root_id: String,
    /// `1 + number of dots in id`; depth 1 is the root's `level_1`.
    pub depth: usize,
    /// Sibling position under `parent_id`, starting at 1.
    pub seq: u32,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub access_count: i64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub links: Vec<String>,
    pub obsolete: bool,
    pub favorite: bool,
    pub secret: bool,
}

/// Why an entry earned an expansion slot in a bulk read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Promotion {
    Favorite,
    Pinned,
    Access,
    #[default]
    Unpromoted,
}

/// An entry reached through another entry's `links`, resolved one hop
/// (possibly through its obsolete chain).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedEntry {
    pub id: String,
    pub title: String,
    pub obsolete: bool,
    pub irrelevant: bool,
}

/// A fully-resolved root, ready for adapter rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootView {
    #[serde(flatten)]
    pub entry: Entry,
    /// `true` if this root occupied an expansion slot.
    pub expanded: bool,
    pub promoted: Promotion,
    /// Direct children, only populated when `expanded`.
    pub children: Vec<Node>,
    /// Count of direct children not included in `children`.
    pub hidden_children: usize,
    /// Resolved `links`, only populated when `expanded`.
    pub linked: Vec<LinkedEntry>,
    /// Count of linked entries hidden because they are obsolete.
    pub hidden_obsolete_links: usize,
    /// Count of linked entries hidden because they are irrelevant.
    pub hidden_irrelevant_links: usize,
    /// IDs traversed resolving this entry's own obsolete chain, if any.
    pub obsolete_chain: Vec<String>,
}

/// A fully-resolved node, ready for adapter rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    #[serde(flatten)]
    pub node: Node,
    pub obsolete_chain: Vec<String>,
}

/// The tagged variant the selector and adapter actually operate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum EntryView {
    Root(RootView),
    Node(NodeView),
}

impl EntryView {
    /// The ID of the underlying entry or node.
    pub fn id(&self) -> &str {
        match self {
            EntryView::Root(r) => &r.entry.id,
            EntryView::Node(n) => &n.node.id,
        }
    }
}

// ============================================================================
// REQUEST DTOs
// ============================================================================

/// Input for `write`. Rejects unexpected fields (field-injection hardening).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WriteInput {
    pub prefix: String,
    pub content: String,
    #[serde(default)]
    pub links: Vec<String>,
    pub min_role: Option<Role>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub secret: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Input for `update_node`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateInput {
    pub id: String,
    pub content: Option<String>,
    pub links: Option<Vec<String>>,
    pub obsolete: Option<bool>,
    pub favorite: Option<bool>,
    pub irrelevant: Option<bool>,
    pub pinned: Option<bool>,
    pub active: Option<bool>,
    pub secret: Option<bool>,
    #[serde(default)]
    pub curator_bypass: bool,
}

/// Input for `read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReadOptions {
    pub id: Option<String>,
    pub query: Option<String>,
    pub prefix: Option<String>,
    pub limit: Option<usize>,
    #[serde(default = "default_true")]
    pub follow_obsolete: bool,
    #[serde(default)]
    pub show_obsolete_path: bool,
    #[serde(default)]
    pub show_obsolete: bool,
    #[serde(default = "default_link_depth")]
    pub link_depth: usize,
}

fn default_link_depth() -> usize {
    1
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            id: None,
            query: None,
            prefix: None,
            limit: None,
            follow_obsolete: true,
            show_obsolete_path: false,
            show_obsolete: false,
            link_depth: 1,
        }
    }
}

// ============================================================================
// ID HELPERS
// ============================================================================

/// Format a root ID from a prefix letter and sequence number.
pub fn format_root_id(prefix: char, seq: u32) -> String {
    format!("{}{:04}", prefix.to_ascii_uppercase(), seq)
}

/// Format the header-entry ID for a prefix.
pub fn header_id(prefix: char) -> String {
    format_root_id(prefix, 0)
}

/// `true` if `id` is a root ID (no dots).
pub fn is_root_id(id: &str) -> bool {
    !id.contains('.')
}

/// The root component of any ID (itself, if already a root).
pub fn root_id_of(id: &str) -> &str {
    id.split('.').next().unwrap_or(id)
}

/// Depth of an ID: 1 for roots, `1 + dot_count` for compound IDs.
pub fn depth_of(id: &str) -> usize {
    1 + id.matches('.').count()
}

/// The parent ID of a compound ID (`None` for a root).
pub fn parent_id_of(id: &str) -> Option<&str> {
    id.rfind('.').map(|i| &id[..i])
}

/// The trailing sequence component of a compound ID, or a root's own `seq`
/// encoded in its ID, whichever applies.
pub fn seq_of(id: &str) -> Option<u32> {
    id.rsplit('.').next()?.parse().ok().or_else(|| {
        parse_root_id(id).map(|(_, seq)| seq)
    })
}

/// Parse a root ID into `(prefix, seq)`. Returns `None` if malformed.
pub fn parse_root_id(id: &str) -> Option<(char, u32)> {
    let mut chars = id.chars();
    let prefix = chars.next()?;
    if !prefix.is_ascii_uppercase() {
        return None;
    }
    let rest: String = chars.collect();
    if rest.len() != 4 || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok().map(|seq| (prefix, seq))
}

/// Build a child compound ID from a parent ID and a sibling sequence number.
pub fn child_id(parent_id: &str, seq: u32) -> String {
    format!("{}.{}", parent_id, seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_id_formatting_zero_pads() {
        assert_eq!(format_root_id('E', 7), "E0007");
        assert_eq!(header_id('L'), "L0000");
    }

    #[test]
    fn depth_counts_dots() {
        assert_eq!(depth_of("E0007"), 1);
        assert_eq!(depth_of("E0007.1"), 2);
        assert_eq!(depth_of("E0007.1.2"), 3);
    }

    #[test]
    fn root_id_of_strips_compound_tail() {
        assert_eq!(root_id_of("E0007.1.2"), "E0007");
        assert_eq!(root_id_of("E0007"), "E0007");
    }

    #[test]
    fn parent_id_of_compound_drops_last_segment() {
        assert_eq!(parent_id_of("E0007.1.2"), Some("E0007.1"));
        assert_eq!(parent_id_of("E0007"), None);
    }

    #[test]
    fn parse_root_id_rejects_malformed() {
        assert_eq!(parse_root_id("E0007"), Some(('E', 7)));
        assert_eq!(parse_root_id("e0007"), None);
        assert_eq!(parse_root_id("E7"), None);
        assert_eq!(parse_root_id("E0007.1"), None);
    }

    #[test]
    fn child_id_appends_dotted_seq() {
        assert_eq!(child_id("E0007", 3), "E0007.3");
        assert_eq!(child_id("E0007.1", 2), "E0007.1.2");
    }

    #[test]
    fn write_input_rejects_unknown_fields() {
        let json = r#"{"prefix":"E","content":"hello"}"#;
        let parsed: Result<WriteInput, _> = serde_json::from_str(json);
        assert!(parsed.is_ok());

        let json_with_unknown = r#"{"prefix":"E","content":"hello","sneaky":true}"#;
        let parsed: Result<WriteInput, _> = serde_json::from_str(json_with_unknown);
        assert!(parsed.is_err());
    }
}
