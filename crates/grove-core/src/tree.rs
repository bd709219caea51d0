//! Tree Parser
//!
//! Converts the tab-indented text passed to `write`/`append_children` into a
//! root title/body plus a flat, depth-tagged line list, then assigns
//! compound IDs to that list relative to a parent.

/// One indented content line, with its absolute depth (root is depth 1;
/// depth-2 lines are direct children of the root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLine {
    pub depth: usize,
    pub text: String,
}

/// The parsed shape of a `write` payload: extracted title/body for the
/// root, plus the indented tail as a depth-tagged line list.
#[derive(Debug, Clone)]
pub struct ParsedContent {
    pub title: String,
    pub level_1: String,
    pub lines: Vec<TreeLine>,
}

/// A node after compound-ID assignment.
#[derive(Debug, Clone)]
pub struct AssignedNode {
    pub id: String,
    pub parent_id: String,
    pub depth: usize,
    pub seq: u32,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy)]
enum Unit {
    Tab,
    Spaces(usize),
}

/// Parse raw `write` content into a root title/body and the indented tail.
pub fn parse_content(raw: &str, max_title_chars: usize) -> ParsedContent {
    let lines: Vec<&str> = raw.lines().collect();

    let mut top: Vec<&str> = Vec::new();
    let mut rest_start = lines.len();
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if is_indented(line) {
            rest_start = i;
            break;
        }
        top.push(line);
        rest_start = i + 1;
    }

    let (title, level_1) = if top.len() >= 2 {
        (top[0].trim().to_string(), top[1..].join("\n").trim().to_string())
    } else {
        let body = top.first().map(|s| s.trim().to_string()).unwrap_or_default();
        (auto_extract_title(&body, max_title_chars), body)
    };

    let tail = &lines[rest_start.min(lines.len())..];
    let tree_lines = parse_tree_lines(tail);

    ParsedContent {
        title,
        level_1,
        lines: tree_lines,
    }
}

/// Parse the indented tail of `append_children` content, treating the
/// parent as an implicit depth-1 root (relative depth 0 = direct child).
pub fn parse_append_lines(raw: &str) -> Vec<TreeLine> {
    let lines: Vec<&str> = raw.lines().collect();
    parse_tree_lines(&lines)
}

fn parse_tree_lines(lines: &[&str]) -> Vec<TreeLine> {
    let non_blank: Vec<&str> = lines.iter().copied().filter(|l| !l.trim().is_empty()).collect();
    let Some(unit) = detect_unit(&non_blank) else {
        return Vec::new();
    };

    non_blank
        .into_iter()
        .map(|line| {
            let indent = leading_ws_count(line);
            let levels = (indent / unit_width(unit)).max(1);
            TreeLine {
                depth: 1 + levels,
                text: line.trim().to_string(),
            }
        })
        .collect()
}

/// Assign compound IDs to a flat, depth-tagged line list relative to
/// `parent_id` at `parent_depth`. Lines deeper than `max_depth` flatten
/// onto the deepest legal sibling group.
pub fn assign_ids(
    parent_id: &str,
    parent_depth: usize,
    lines: &[TreeLine],
    max_depth: usize,
    max_title_chars: usize,
) -> Vec<AssignedNode> {
    assign_ids_continuing(
        parent_id,
        parent_depth,
        lines,
        max_depth,
        max_title_chars,
        std::collections::HashMap::new(),
    )
}

/// Same as [`assign_ids`], but seeded with the existing sibling count for
/// one or more parents — used by `append_children` so new siblings
/// continue the sequence instead of restarting at 1.
pub fn assign_ids_continuing(
    parent_id: &str,
    parent_depth: usize,
    lines: &[TreeLine],
    max_depth: usize,
    max_title_chars: usize,
    initial_counts: std::collections::HashMap<String, u32>,
) -> Vec<AssignedNode> {
    let mut stack: Vec<(usize, String)> = vec![(parent_depth, parent_id.to_string())];
    let mut sibling_counters: std::collections::HashMap<String, u32> = initial_counts;
    let mut out = Vec::with_capacity(lines.len());

    for line in lines {
        let depth = line.depth.min(max_depth);
        while stack.len() > 1 && stack.last().unwrap().0 >= depth {
            stack.pop();
        }
        let (_, parent) = stack.last().unwrap().clone();
        let seq = {
            let counter = sibling_counters.entry(parent.clone()).or_insert(0);
            *counter += 1;
            *counter
        };
        let id = crate::entry::child_id(&parent, seq);
        let title = auto_extract_title(&line.text, max_title_chars);

        out.push(AssignedNode {
            id: id.clone(),
            parent_id: parent,
            depth,
            seq,
            title,
            content: line.text.clone(),
        });
        stack.push((depth, id));
    }

    out
}

/// Title auto-extraction: text before an em-dash separator, else
/// word-boundary truncation at `max_chars`, else a hard cut.
pub fn auto_extract_title(text: &str, max_chars: usize) -> String {
    if let Some(idx) = text.find(" — ") {
        return text[..idx].trim().to_string();
    }
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    match truncated.rfind(' ') {
        Some(last_space) if last_space > 0 => truncated[..last_space].to_string(),
        _ => truncated,
    }
}

fn is_indented(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('\t')
}

fn leading_ws_count(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

fn detect_unit(lines: &[&str]) -> Option<Unit> {
    let first_indented = lines.iter().find(|l| is_indented(l))?;
    if first_indented.starts_with('\t') {
        return Some(Unit::Tab);
    }
    let count = leading_ws_count(first_indented);
    Some(if count >= 4 && count % 4 == 0 {
        Unit::Spaces(4)
    } else if count >= 2 && count % 2 == 0 {
        Unit::Spaces(2)
    } else {
        Unit::Spaces(count.max(1))
    })
}

fn unit_width(unit: Unit) -> usize {
    match unit {
        Unit::Tab => 1,
        Unit::Spaces(n) => n,
    }
}
