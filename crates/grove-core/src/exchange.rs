//! Export / Import
//!
//! Markdown rendering is pure string assembly; import re-keying reuses the
//! tree parser's compound-ID assignment so a re-keyed subtree gets IDs the
//! same way a freshly written one would. The actual file and database I/O
//! (reading the source dump, writing re-keyed rows) lives in
//! [`crate::storage`]; this module only decides *what* to write.

use crate::tree::{self, AssignedNode, TreeLine};

/// An exportable root and its descendant content, already stripped of
/// secrets by the caller.
#[derive(Debug, Clone)]
pub struct ExportEntry {
    pub prefix: char,
    pub level_1: String,
    pub title: String,
    pub obsolete: bool,
    pub irrelevant: bool,
    pub tags: Vec<String>,
    pub children: Vec<ExportNode>,
}

/// An exportable node and its descendants.
#[derive(Debug, Clone)]
pub struct ExportNode {
    pub content: String,
    pub obsolete: bool,
    pub children: Vec<ExportNode>,
}

/// Render a deterministic Markdown document grouped by prefix.
pub fn render_markdown(groups: &[(char, String, Vec<ExportEntry>)]) -> String {
    let mut out = String::new();
    for (prefix, category_name, entries) in groups {
        out.push_str(&format!("# {} ({})\n\n", category_name, prefix));
        for entry in entries {
            let mut marks = Vec::new();
            if entry.obsolete {
                marks.push("OBSOLETE");
            }
            if entry.irrelevant {
                marks.push("IRRELEVANT");
            }
            let mark_suffix = if marks.is_empty() {
                String::new()
            } else {
                format!(" [{}]", marks.join(", "))
            };
            out.push_str(&format!("## {}{}\n\n", entry.title, mark_suffix));
            out.push_str(&entry.level_1);
            out.push_str("\n\n");
            if !entry.tags.is_empty() {
                out.push_str(&entry.tags.join(" "));
                out.push_str("\n\n");
            }
            render_children_markdown(&entry.children, 0, &mut out);
        }
    }
    out
}

fn render_children_markdown(children: &[ExportNode], depth: usize, out: &mut String) {
    for child in children {
        let indent = "  ".repeat(depth);
        let mark = if child.obsolete { " [OBSOLETE]" } else { "" };
        out.push_str(&format!("{}- {}{}\n", indent, child.content, mark));
        render_children_markdown(&child.children, depth + 1, out);
    }
}

/// Whether an incoming root should merge into an existing one or be
/// freshly allocated in the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDecision {
    /// Attach the incoming root's descendants onto this existing root.
    MergeInto(String),
    /// Allocate a fresh `(prefix, seq)` for the incoming root.
    Allocate,
}

/// An existing destination root, as seen by the merge-or-allocate check.
#[derive(Debug, Clone)]
pub struct ExistingRoot {
    pub id: String,
    pub prefix: char,
    pub level_1: String,
}

/// Case- and whitespace-insensitive comparison of two `level_1` bodies.
fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Decide whether `incoming` merges into an existing destination root.
pub fn decide_import(existing: &[ExistingRoot], incoming: &ExportEntry) -> ImportDecision {
    let incoming_norm = normalize(&incoming.level_1);
    existing
        .iter()
        .find(|root| root.prefix == incoming.prefix && normalize(&root.level_1) == incoming_norm)
        .map(|root| ImportDecision::MergeInto(root.id.clone()))
        .unwrap_or(ImportDecision::Allocate)
}

/// One line of the remap report returned to the caller after import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapEntry {
    pub old_hint: String,
    pub new_id: String,
}

/// Flatten a nested export-node tree into the depth-tagged line list the
/// tree parser's ID assignment expects (depth 2 = direct children of the
/// destination root/parent).
pub fn flatten_export_nodes(nodes: &[ExportNode]) -> Vec<TreeLine> {
    let mut out = Vec::new();
    flatten_inner(nodes, 2, &mut out);
    out
}

fn flatten_inner(nodes: &[ExportNode], depth: usize, out: &mut Vec<TreeLine>) {
    for node in nodes {
        out.push(TreeLine {
            depth,
            text: node.content.clone(),
        });
        flatten_inner(&node.children, depth + 1, out);
    }
}

/// Re-key an incoming subtree under `new_parent_id`, producing assigned
/// nodes the same way a fresh `write`/`append_children` call would.
pub fn rekey_subtree(
    new_parent_id: &str,
    parent_depth: usize,
    nodes: &[ExportNode],
    max_depth: usize,
    max_title_chars: usize,
) -> Vec<AssignedNode> {
    let lines = flatten_export_nodes(nodes);
    tree::assign_ids(new_parent_id, parent_depth, &lines, max_depth, max_title_chars)
}

/// Same as [`rekey_subtree`], but seeded with the destination parent's
/// existing child count — used by the import merge path so re-keyed
/// siblings continue the destination's sequence instead of restarting at
/// 1 and colliding with its existing children.
pub fn rekey_subtree_continuing(
    new_parent_id: &str,
    parent_depth: usize,
    nodes: &[ExportNode],
    max_depth: usize,
    max_title_chars: usize,
    existing_count: u32,
) -> Vec<AssignedNode> {
    let lines = flatten_export_nodes(nodes);
    let mut seed = std::collections::HashMap::new();
    seed.insert(new_parent_id.to_string(), existing_count);
    tree::assign_ids_continuing(new_parent_id, parent_depth, &lines, max_depth, max_title_chars, seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(prefix: char, level_1: &str) -> ExportEntry {
        ExportEntry {
            prefix,
            level_1: level_1.to_string(),
            title: level_1.to_string(),
            obsolete: false,
            irrelevant: false,
            tags: vec![],
            children: vec![],
        }
    }

    #[test]
    fn markdown_includes_category_and_title() {
        let groups = vec![('E', "Engineering".to_string(), vec![entry('E', "Always restart")])];
        let md = render_markdown(&groups);
        assert!(md.contains("# Engineering (E)"));
        assert!(md.contains("## Always restart"));
    }

    #[test]
    fn obsolete_entries_are_marked() {
        let mut e = entry('E', "Stale fix");
        e.obsolete = true;
        let groups = vec![('E', "Engineering".to_string(), vec![e])];
        let md = render_markdown(&groups);
        assert!(md.contains("[OBSOLETE]"));
    }

    #[test]
    fn identical_level_1_merges_case_and_whitespace_insensitively() {
        let existing = vec![ExistingRoot {
            id: "P0001".to_string(),
            prefix: 'P',
            level_1: "  Foo   Bar  ".to_string(),
        }];
        let incoming = entry('P', "foo bar");
        assert_eq!(
            decide_import(&existing, &incoming),
            ImportDecision::MergeInto("P0001".to_string())
        );
    }

    #[test]
    fn different_prefix_never_merges() {
        let existing = vec![ExistingRoot {
            id: "P0001".to_string(),
            prefix: 'P',
            level_1: "foo bar".to_string(),
        }];
        let incoming = entry('Q', "foo bar");
        assert_eq!(decide_import(&existing, &incoming), ImportDecision::Allocate);
    }

    #[test]
    fn rekey_subtree_assigns_sequential_children() {
        let nodes = vec![
            ExportNode { content: "one".into(), obsolete: false, children: vec![] },
            ExportNode { content: "two".into(), obsolete: false, children: vec![] },
        ];
        let assigned = rekey_subtree("P0002", 1, &nodes, 5, 80);
        assert_eq!(assigned[0].id, "P0002.1");
        assert_eq!(assigned[1].id, "P0002.2");
    }
}
