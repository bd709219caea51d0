//! SQLite Storage Implementation
//!
//! Owns the on-disk file, runs migrations, and implements every `Store`
//! operation in §4.1 of the design doc: write, read (ID/search/bulk),
//! update_node, append_children, bump, update, delete, stats, close.
//!
//! Uses separate reader/writer connections for interior mutability. All
//! methods take `&self` (not `&mut self`), making `Store` `Send + Sync` so
//! the MCP layer can use `Arc<Store>` instead of `Arc<Mutex<Store>>`.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::config::Config;
use crate::entry::{
    self, Entry, LinkedEntry, Node, NodeView, Promotion, ReadOptions, RootView, UpdateInput,
    WriteInput,
};
use crate::error::{Result, StoreError};
use crate::exchange::{self, ExistingRoot, ExportEntry, ExportNode, ImportDecision, RemapEntry};
use crate::obsolete;
use crate::role::Role;
use crate::scoring::time_weighted_score;
use crate::selector::{self, BulkReadPlan};
use crate::session_cache::SessionCache;
use crate::tree;

/// Summary of a completed bulk read, ready for adapter rendering.
#[derive(Debug, Clone)]
pub struct BulkReadResult {
    pub groups: Vec<BulkReadGroup>,
    pub obsolete_tail: Vec<RootView>,
    pub obsolete_hidden: usize,
    pub hot_nodes: Vec<HotNode>,
}

/// One prefix's worth of a bulk read, ready for adapter rendering.
#[derive(Debug, Clone)]
pub struct BulkReadGroup {
    pub prefix: char,
    pub header_title: String,
    pub expanded: Vec<RootView>,
    pub compact: Vec<CompactRoot>,
}

/// A root entry shown only as a title, with a peek at its latest child.
#[derive(Debug, Clone)]
pub struct CompactRoot {
    pub entry: Entry,
    pub latest_child: Option<Node>,
    pub hidden_children: usize,
}

/// A frequently-accessed sub-node, surfaced as a side-channel from bulk reads.
#[derive(Debug, Clone)]
pub struct HotNode {
    pub id: String,
    pub breadcrumb: String,
    pub score: f64,
}

/// Result of `read` with an `id` set.
#[derive(Debug, Clone)]
pub enum IdReadResult {
    Root(RootView),
    Node(NodeView),
}

/// Store-wide counts.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub total: i64,
    pub by_prefix: BTreeMap<char, i64>,
}

/// Report returned from a successful import.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub merged_roots: Vec<String>,
    pub remapped: Vec<RemapEntry>,
}

/// One row of the curator audit queue: an agent and when it was last
/// reviewed (`None` if it has never been audited).
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub agent: String,
    pub last_audit: Option<DateTime<Utc>>,
}

/// The memory store. Holds a writer and a reader connection onto the same
/// file plus the engine configuration.
pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    config: Config,
    corrupted: AtomicBool,
}

impl Store {
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (creating if necessary) the store at `db_path`, or the
    /// platform default data directory when `None`.
    pub fn open(db_path: Option<PathBuf>, config: Config) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("dev", "grove", "grove").ok_or_else(|| {
                    StoreError::Init("could not determine project data directory".to_string())
                })?;
                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(0o700);
                    let _ = std::fs::set_permissions(data_dir, perms);
                }
                data_dir.join("grove.db")
            }
        };

        let writer_conn = Connection::open(&path)?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        let store = Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            config,
            corrupted: AtomicBool::new(false),
        };

        store.ensure_header_entries()?;
        store.run_integrity_check(&path);

        Ok(store)
    }

    /// Insert any per-prefix header entries (`X0000`) the configuration
    /// declares but the store doesn't have yet.
    fn ensure_header_entries(&self) -> Result<()> {
        let writer = self.lock_writer()?;
        let now = Utc::now().to_rfc3339();
        for (prefix, name) in &self.config.prefixes {
            let id = entry::header_id(*prefix);
            let description = self
                .config
                .prefix_descriptions
                .get(prefix)
                .cloned()
                .unwrap_or_else(|| name.clone());
            writer.execute(
                "INSERT OR IGNORE INTO memories
                 (id, prefix, seq, created_at, title, level_1, links, min_role,
                  access_count, last_accessed, obsolete, favorite, pinned, irrelevant,
                  active, secret, tags, effective_date)
                 VALUES (?1, ?2, 0, ?3, ?4, ?5, '[]', 'worker', 0, NULL, 0, 0, 0, 0, 1, 0, '[]', ?3)",
                params![id, prefix.to_string(), now, name, description],
            )?;
        }
        Ok(())
    }

    fn run_integrity_check(&self, path: &std::path::Path) {
        let ok = self
            .reader
            .lock()
            .ok()
            .and_then(|conn| {
                conn.query_row("PRAGMA integrity_check", [], |row| row.get::<_, String>(0))
                    .ok()
            })
            .map(|result| result == "ok")
            .unwrap_or(false);

        if !ok {
            tracing::warn!(path = %path.display(), "integrity check failed, store marked read-only");
            self.corrupted.store(true, Ordering::SeqCst);
            let backup = path.with_extension("db.corrupt-backup");
            if let Err(e) = std::fs::copy(path, &backup) {
                tracing::warn!(error = %e, "failed to write corruption backup");
            }
        }
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        if self.corrupted.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupted(
                "integrity check failed; writes are disabled".to_string(),
            ));
        }
        Ok(self.writer.lock().expect("writer lock poisoned"))
    }

    fn lock_reader(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.reader.lock().expect("reader lock poisoned")
    }

    // ========================================================================
    // WRITE
    // ========================================================================

    /// Create a new root entry (and any indented sub-nodes its content
    /// carries) under `input.prefix`.
    pub fn write(&self, input: WriteInput, caller_role: Role) -> Result<(String, DateTime<Utc>)> {
        if caller_role < Role::write_floor() {
            return Err(StoreError::RoleDenied(format!(
                "role {} may not write to the shared store",
                caller_role
            )));
        }
        if input.content.trim().is_empty() {
            return Err(StoreError::ContentEmpty);
        }
        let prefix = parse_prefix(&input.prefix)?;
        if !self.config.has_prefix(prefix) {
            return Err(StoreError::InvalidPrefix(input.prefix.clone()));
        }

        let parsed = tree::parse_content(&input.content, self.config.max_title_chars);
        let max_l1 = self.config.max_chars_for_depth(1);
        if parsed.level_1.len() > max_l1 {
            return Err(StoreError::ContentTooLong {
                depth: 1,
                len: parsed.level_1.len(),
                max: max_l1,
            });
        }

        let tags = normalize_tags(&input.tags);
        let now = Utc::now();
        let min_role = input.min_role.unwrap_or_default();

        let mut writer = self.lock_writer()?;
        let tx = writer.transaction()?;

        let seq: u32 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM memories WHERE prefix = ?1 AND seq > 0",
            params![prefix.to_string()],
            |row| row.get(0),
        )?;
        let root_id = entry::format_root_id(prefix, seq);

        tx.execute(
            "INSERT INTO memories
             (id, prefix, seq, created_at, title, level_1, links, min_role, access_count,
              last_accessed, obsolete, favorite, pinned, irrelevant, active, secret, tags,
              effective_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL, 0, ?9, ?10, 0, ?11, ?12, ?13, ?4)",
            params![
                root_id,
                prefix.to_string(),
                seq,
                now.to_rfc3339(),
                parsed.title,
                parsed.level_1,
                json_list(&input.links),
                min_role.as_str(),
                input.favorite,
                input.pinned,
                input.active,
                input.secret,
                json_list(&tags),
            ],
        )?;

        let assigned = tree::assign_ids(&root_id, 1, &parsed.lines, self.config.max_depth, self.config.max_title_chars);
        for node in &assigned {
            let max_chars = self.config.max_chars_for_depth(node.depth);
            if node.content.len() > max_chars {
                return Err(StoreError::ContentTooLong {
                    depth: node.depth,
                    len: node.content.len(),
                    max: max_chars,
                });
            }
            tx.execute(
                "INSERT INTO memory_nodes
                 (id, parent_id, root_id, depth, seq, title, content, created_at,
                  access_count, last_accessed, links, obsolete, favorite, secret)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL, '[]', 0, 0, 0)",
                params![
                    node.id,
                    node.parent_id,
                    root_id,
                    node.depth as i64,
                    node.seq,
                    node.title,
                    node.content,
                    now.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        Ok((root_id, now))
    }

    // ========================================================================
    // READ
    // ========================================================================

    /// Dispatch a read: ID mode when `opts.id` is set, search mode when
    /// `opts.query` is set, bulk mode otherwise.
    pub fn read_id(&self, id: &str, opts: &ReadOptions, caller_role: Role) -> Result<IdReadResult> {
        if entry::is_root_id(id) {
            let view = self.read_root(id, opts, caller_role)?;
            self.bump(id, 1)?;
            Ok(IdReadResult::Root(view))
        } else {
            let view = self.read_node(id, opts, caller_role)?;
            self.bump(id, 1)?;
            self.bump_root_half(entry::root_id_of(id))?;
            Ok(IdReadResult::Node(view))
        }
    }

    fn read_root(&self, id: &str, opts: &ReadOptions, caller_role: Role) -> Result<RootView> {
        let reader = self.lock_reader();
        let entry = fetch_root(&reader, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if !caller_role.can_access(entry.min_role) {
            return Err(StoreError::RoleDenied(format!(
                "entry {} requires role >= {}",
                id, entry.min_role
            )));
        }

        let (resolved_id, chain) = if entry.obsolete && opts.follow_obsolete {
            let resolution = obsolete::resolve(
                id,
                true,
                |candidate| is_obsolete_lookup(&reader, candidate),
                |candidate| correction_ref_lookup(&reader, candidate),
            )?;
            (resolution.resolved_id, resolution.chain)
        } else {
            (id.to_string(), vec![])
        };

        let final_entry = if resolved_id == id {
            entry
        } else {
            fetch_root(&reader, &resolved_id)?.ok_or_else(|| StoreError::NotFound(resolved_id.clone()))?
        };

        let children = fetch_children(&reader, &final_entry.id)?;
        let linked = self.resolve_links(&reader, &final_entry.links, opts.link_depth);

        Ok(RootView {
            entry: final_entry,
            expanded: true,
            promoted: Promotion::Unpromoted,
            children,
            hidden_children: 0,
            linked: linked.0,
            hidden_obsolete_links: linked.1,
            hidden_irrelevant_links: linked.2,
            obsolete_chain: if opts.show_obsolete_path { chain } else if chain.len() > 1 { vec![chain[0].clone(), resolved_id] } else { vec![] },
        })
    }

    fn read_node(&self, id: &str, opts: &ReadOptions, caller_role: Role) -> Result<NodeView> {
        let reader = self.lock_reader();
        let node = fetch_node(&reader, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let root = fetch_root(&reader, &node.root_id)?.ok_or_else(|| StoreError::NotFound(node.root_id.clone()))?;
        if !caller_role.can_access(root.min_role) {
            return Err(StoreError::RoleDenied(format!(
                "node {} requires role >= {}",
                id, root.min_role
            )));
        }

        let chain = if node.obsolete && opts.follow_obsolete {
            obsolete::resolve(
                id,
                true,
                |candidate| is_obsolete_lookup_node(&reader, candidate),
                |candidate| correction_ref_lookup_node(&reader, candidate),
            )?
            .chain
        } else {
            vec![]
        };

        Ok(NodeView {
            node,
            obsolete_chain: chain,
        })
    }

    /// Simple substring search over titles/bodies, case-insensitive.
    pub fn search(&self, query: &str, opts: &ReadOptions, caller_role: Role) -> Result<Vec<RootView>> {
        let reader = self.lock_reader();
        let limit = opts.limit.unwrap_or(self.config.default_read_limit) as i64;
        let like = format!("%{}%", query.to_lowercase());

        let mut stmt = reader.prepare(
            "SELECT * FROM memories
             WHERE seq > 0 AND irrelevant = 0
               AND (LOWER(title) LIKE ?1 OR LOWER(level_1) LIKE ?1)
             ORDER BY effective_date DESC
             LIMIT ?2",
        )?;
        let rows: Vec<Entry> = stmt
            .query_map(params![like, limit], |row| row_to_entry(row))?
            .filter_map(|r| r.ok())
            .filter(|e: &Entry| caller_role.can_access(e.min_role))
            .collect();

        rows.into_iter()
            .map(|entry| {
                let children = fetch_children(&reader, &entry.id)?;
                let linked = self.resolve_links(&reader, &entry.links, opts.link_depth);
                Ok(RootView {
                    entry,
                    expanded: true,
                    promoted: Promotion::Unpromoted,
                    children,
                    hidden_children: 0,
                    linked: linked.0,
                    hidden_obsolete_links: linked.1,
                    hidden_irrelevant_links: linked.2,
                    obsolete_chain: vec![],
                })
            })
            .collect()
    }

    /// Run the bulk-read selector and assemble a full response.
    pub fn read_bulk(
        &self,
        opts: &ReadOptions,
        caller_role: Role,
        session: &mut SessionCache,
    ) -> Result<BulkReadResult> {
        let reader = self.lock_reader();
        let now = Utc::now();

        let prefix_filter = opts.prefix.as_deref().map(parse_prefix).transpose()?;
        let candidates: Vec<Entry> = match prefix_filter {
            Some(prefix) => {
                let mut stmt = reader.prepare(
                    "SELECT * FROM memories WHERE seq > 0 AND irrelevant = 0 AND prefix = ?1",
                )?;
                stmt.query_map(params![prefix.to_string()], |row| row_to_entry(row))?
                    .filter_map(|r| r.ok())
                    .filter(|e| caller_role.can_access(e.min_role))
                    .collect()
            }
            None => {
                let mut stmt = reader.prepare(
                    "SELECT * FROM memories WHERE seq > 0 AND irrelevant = 0",
                )?;
                stmt.query_map([], |row| row_to_entry(row))?
                    .filter_map(|r| r.ok())
                    .filter(|e| caller_role.can_access(e.min_role))
                    .collect()
            }
        };

        let plan: BulkReadPlan = selector::plan_bulk_read(&candidates, session, &self.config, now);
        let by_id: HashMap<&str, &Entry> = candidates.iter().map(|e| (e.id.as_str(), e)).collect();

        let mut groups = Vec::with_capacity(plan.groups.len());
        for group in &plan.groups {
            let mut expanded = Vec::with_capacity(group.expanded.len());
            for (id, promotion) in &group.expanded {
                let Some(entry) = by_id.get(id.as_str()) else { continue };
                let children = fetch_children(&reader, id)?;
                let linked = self.resolve_links(&reader, &entry.links, opts.link_depth);
                expanded.push(RootView {
                    entry: (*entry).clone(),
                    expanded: true,
                    promoted: *promotion,
                    children,
                    hidden_children: 0,
                    linked: linked.0,
                    hidden_obsolete_links: linked.1,
                    hidden_irrelevant_links: linked.2,
                    obsolete_chain: vec![],
                });
            }

            let mut compact = Vec::with_capacity(group.compact.len());
            for id in &group.compact {
                let Some(entry) = by_id.get(id.as_str()) else { continue };
                let latest_child = fetch_latest_child(&reader, id)?;
                let total_children = count_children(&reader, id)?;
                compact.push(CompactRoot {
                    entry: (*entry).clone(),
                    hidden_children: total_children.saturating_sub(if latest_child.is_some() { 1 } else { 0 }),
                    latest_child,
                });
            }

            groups.push(BulkReadGroup {
                prefix: group.prefix,
                header_title: self.config.prefix_name(group.prefix),
                expanded,
                compact,
            });
        }

        let mut obsolete_tail = Vec::with_capacity(plan.obsolete_tail.len());
        for id in &plan.obsolete_tail {
            let Some(entry) = by_id.get(id.as_str()) else { continue };
            let chain = obsolete::resolve(
                id,
                true,
                |candidate| is_obsolete_lookup(&reader, candidate),
                |candidate| correction_ref_lookup(&reader, candidate),
            )?
            .chain;
            let total_children = count_children(&reader, id)?;
            obsolete_tail.push(RootView {
                entry: (*entry).clone(),
                expanded: false,
                promoted: Promotion::Unpromoted,
                children: vec![],
                hidden_children: total_children,
                linked: vec![],
                hidden_obsolete_links: 0,
                hidden_irrelevant_links: 0,
                obsolete_chain: chain,
            });
        }

        let hot_nodes = self.fetch_hot_nodes(&reader, now)?;

        session.record_generation(plan.delivered_ids, plan.promoted_ids);

        Ok(BulkReadResult {
            groups,
            obsolete_tail,
            obsolete_hidden: plan.obsolete_hidden,
            hot_nodes,
        })
    }

    fn fetch_hot_nodes(&self, reader: &Connection, now: DateTime<Utc>) -> Result<Vec<HotNode>> {
        let mut stmt = reader.prepare(
            "SELECT id, root_id, parent_id, access_count, created_at FROM memory_nodes
             WHERE access_count > 0 ORDER BY access_count DESC LIMIT 200",
        )?;
        let mut candidates: Vec<(String, i64, DateTime<Utc>)> = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let access_count: i64 = row.get(3)?;
                let created_at: String = row.get(4)?;
                Ok((id, access_count, parse_rfc3339(&created_at)))
            })?
            .filter_map(|r| r.ok())
            .collect();

        let mut candidates: Vec<(String, String, f64)> = candidates
            .drain(..)
            .map(|(id, access_count, created_at)| {
                let breadcrumb = breadcrumb_for(reader, &id);
                let score = time_weighted_score(access_count, created_at, now);
                (id, breadcrumb, score)
            })
            .collect();

        candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(10);
        Ok(candidates
            .into_iter()
            .map(|(id, breadcrumb, score)| HotNode { id, breadcrumb, score })
            .collect())
    }

    fn resolve_links(
        &self,
        reader: &Connection,
        links: &[String],
        _link_depth: usize,
    ) -> (Vec<LinkedEntry>, usize, usize) {
        let mut visible = Vec::new();
        let mut hidden_obsolete = 0;
        let mut hidden_irrelevant = 0;

        for link_id in links {
            let root_id = entry::root_id_of(link_id);
            let Ok(Some(target)) = fetch_root(reader, root_id) else { continue };
            if target.irrelevant {
                hidden_irrelevant += 1;
                continue;
            }
            let resolved = obsolete::resolve(
                &target.id,
                true,
                |candidate| is_obsolete_lookup(reader, candidate),
                |candidate| correction_ref_lookup(reader, candidate),
            )
            .ok();
            let final_entry = match resolved {
                Some(r) if r.resolved_id != target.id => {
                    if target.obsolete {
                        hidden_obsolete += 1;
                    }
                    match fetch_root(reader, &r.resolved_id) {
                        Ok(Some(e)) => e,
                        _ => target,
                    }
                }
                _ => target,
            };
            visible.push(LinkedEntry {
                id: final_entry.id.clone(),
                title: final_entry.title.clone(),
                obsolete: final_entry.obsolete,
                irrelevant: final_entry.irrelevant,
            });
        }

        (visible, hidden_obsolete, hidden_irrelevant)
    }

    // ========================================================================
    // MUTATION
    // ========================================================================

    /// Update a root's flags/body, or a node's content/flags. Setting
    /// `obsolete = true` on a root requires a `[✓ID]` marker unless
    /// `curator_bypass` is set.
    pub fn update_node(&self, input: UpdateInput, caller_role: Role) -> Result<bool> {
        if caller_role < Role::write_floor() {
            return Err(StoreError::RoleDenied(format!(
                "{} cannot write to the shared store",
                caller_role
            )));
        }
        let writer = self.lock_writer()?;
        if entry::is_root_id(&input.id) {
            self.update_root(&writer, &input, caller_role)
        } else {
            self.update_node_row(&writer, &input, caller_role)
        }
    }

    fn update_root(&self, writer: &Connection, input: &UpdateInput, caller_role: Role) -> Result<bool> {
        let current = fetch_root(writer, &input.id)?.ok_or_else(|| StoreError::NotFound(input.id.clone()))?;
        if !caller_role.can_access(current.min_role) {
            return Err(StoreError::RoleDenied(format!("entry {} requires higher role", input.id)));
        }

        let going_obsolete = input.obsolete == Some(true) && !current.obsolete;
        let mut correction_id = None;
        if going_obsolete && !input.curator_bypass {
            let candidate_text = input.content.as_deref().unwrap_or(&current.level_1);
            let marker = obsolete::extract_correction_ref(candidate_text)
                .ok_or_else(|| StoreError::MissingCorrectionRef(input.id.clone()))?;
            if fetch_root(writer, &marker)?.is_none() {
                return Err(StoreError::MissingCorrectionRef(input.id.clone()));
            }
            correction_id = Some(marker);
        }

        if let Some(content) = &input.content {
            let max_l1 = self.config.max_chars_for_depth(1);
            if content.len() > max_l1 {
                return Err(StoreError::ContentTooLong { depth: 1, len: content.len(), max: max_l1 });
            }
            writer.execute(
                "UPDATE memories SET level_1 = ?1 WHERE id = ?2",
                params![content, input.id],
            )?;
        }
        if let Some(links) = &input.links {
            writer.execute(
                "UPDATE memories SET links = ?1 WHERE id = ?2",
                params![json_list(links), input.id],
            )?;
        }
        set_optional_flag(writer, "memories", &input.id, "favorite", input.favorite)?;
        set_optional_flag(writer, "memories", &input.id, "irrelevant", input.irrelevant)?;
        set_optional_flag(writer, "memories", &input.id, "pinned", input.pinned)?;
        set_optional_flag(writer, "memories", &input.id, "active", input.active)?;
        set_optional_flag(writer, "memories", &input.id, "secret", input.secret)?;

        if let Some(obsolete) = input.obsolete {
            writer.execute(
                "UPDATE memories SET obsolete = ?1 WHERE id = ?2",
                params![obsolete, input.id],
            )?;
        }

        if let Some(correction_id) = correction_id {
            self.transfer_on_obsolete(writer, &input.id, &correction_id)?;
        }

        Ok(true)
    }

    /// Zero out the superseded entry's access count, add it to the
    /// correction entry's, and link the two bidirectionally.
    fn transfer_on_obsolete(&self, writer: &Connection, old_id: &str, new_id: &str) -> Result<()> {
        let old_count: i64 = writer.query_row(
            "SELECT access_count FROM memories WHERE id = ?1",
            params![old_id],
            |row| row.get(0),
        )?;
        writer.execute("UPDATE memories SET access_count = 0 WHERE id = ?1", params![old_id])?;
        writer.execute(
            "UPDATE memories SET access_count = access_count + ?1 WHERE id = ?2",
            params![old_count, new_id],
        )?;
        self.add_link(writer, old_id, new_id)?;
        self.add_link(writer, new_id, old_id)?;
        Ok(())
    }

    fn add_link(&self, writer: &Connection, id: &str, link: &str) -> Result<()> {
        let current: String = writer.query_row(
            "SELECT links FROM memories WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        let mut links: Vec<String> = serde_json::from_str(&current).unwrap_or_default();
        if !links.iter().any(|l| l == link) {
            links.push(link.to_string());
            writer.execute(
                "UPDATE memories SET links = ?1 WHERE id = ?2",
                params![json_list(&links), id],
            )?;
        }
        Ok(())
    }

    fn update_node_row(&self, writer: &Connection, input: &UpdateInput, caller_role: Role) -> Result<bool> {
        let node = fetch_node(writer, &input.id)?.ok_or_else(|| StoreError::NotFound(input.id.clone()))?;
        let root = fetch_root(writer, &node.root_id)?.ok_or_else(|| StoreError::NotFound(node.root_id.clone()))?;
        if !caller_role.can_access(root.min_role) {
            return Err(StoreError::RoleDenied(format!("node {} requires higher role", input.id)));
        }
        if let Some(content) = &input.content {
            let max_chars = self.config.max_chars_for_depth(node.depth);
            if content.len() > max_chars {
                return Err(StoreError::ContentTooLong { depth: node.depth, len: content.len(), max: max_chars });
            }
            writer.execute(
                "UPDATE memory_nodes SET content = ?1 WHERE id = ?2",
                params![content, input.id],
            )?;
        }
        if let Some(links) = &input.links {
            writer.execute(
                "UPDATE memory_nodes SET links = ?1 WHERE id = ?2",
                params![json_list(links), input.id],
            )?;
        }
        set_optional_flag(writer, "memory_nodes", &input.id, "favorite", input.favorite)?;
        set_optional_flag(writer, "memory_nodes", &input.id, "obsolete", input.obsolete)?;
        set_optional_flag(writer, "memory_nodes", &input.id, "secret", input.secret)?;
        Ok(true)
    }

    /// Append indented content as new children under `parent_id`,
    /// continuing its existing sibling sequence. Bumps the parent node
    /// (if compound) and the root by 1 each.
    pub fn append_children(
        &self,
        parent_id: &str,
        content: &str,
        caller_role: Role,
    ) -> Result<(usize, Vec<String>)> {
        if caller_role < Role::write_floor() {
            return Err(StoreError::RoleDenied(format!(
                "{} cannot write to the shared store",
                caller_role
            )));
        }
        let writer = self.lock_writer()?;
        let (root_id, parent_depth, existing_count) = if entry::is_root_id(parent_id) {
            if fetch_root(&writer, parent_id)?.is_none() {
                return Err(StoreError::NotFound(parent_id.to_string()));
            }
            let count: u32 = writer.query_row(
                "SELECT COUNT(*) FROM memory_nodes WHERE parent_id = ?1",
                params![parent_id],
                |row| row.get(0),
            )?;
            (parent_id.to_string(), 1usize, count)
        } else {
            let node = fetch_node(&writer, parent_id)?.ok_or_else(|| StoreError::NotFound(parent_id.to_string()))?;
            let count: u32 = writer.query_row(
                "SELECT COUNT(*) FROM memory_nodes WHERE parent_id = ?1",
                params![parent_id],
                |row| row.get(0),
            )?;
            (node.root_id, node.depth, count)
        };

        let lines = tree::parse_append_lines(content);
        let mut seed = HashMap::new();
        seed.insert(parent_id.to_string(), existing_count);
        let assigned = tree::assign_ids_continuing(
            parent_id,
            parent_depth,
            &lines,
            self.config.max_depth,
            self.config.max_title_chars,
            seed,
        );

        let now = Utc::now().to_rfc3339();
        let mut ids = Vec::with_capacity(assigned.len());
        for node in &assigned {
            let max_chars = self.config.max_chars_for_depth(node.depth);
            if node.content.len() > max_chars {
                return Err(StoreError::ContentTooLong { depth: node.depth, len: node.content.len(), max: max_chars });
            }
            writer.execute(
                "INSERT INTO memory_nodes
                 (id, parent_id, root_id, depth, seq, title, content, created_at,
                  access_count, last_accessed, links, obsolete, favorite, secret)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL, '[]', 0, 0, 0)",
                params![node.id, node.parent_id, root_id, node.depth as i64, node.seq, node.title, node.content, now],
            )?;
            ids.push(node.id.clone());
        }

        if !entry::is_root_id(parent_id) {
            writer.execute(
                "UPDATE memory_nodes SET access_count = access_count + 1 WHERE id = ?1",
                params![parent_id],
            )?;
        }
        writer.execute(
            "UPDATE memories SET access_count = access_count + 1, effective_date = ?1 WHERE id = ?2",
            params![now, root_id],
        )?;

        Ok((ids.len(), ids))
    }

    /// Bump an entry or node's access count by `delta` and stamp
    /// `last_accessed`.
    pub fn bump(&self, id: &str, delta: i64) -> Result<bool> {
        let writer = self.lock_writer()?;
        let now = Utc::now().to_rfc3339();
        let table = if entry::is_root_id(id) { "memories" } else { "memory_nodes" };
        let affected = writer.execute(
            &format!(
                "UPDATE {} SET access_count = access_count + ?1, last_accessed = ?2 WHERE id = ?3",
                table
            ),
            params![delta, now, id],
        )?;
        Ok(affected > 0)
    }

    /// Half-weight bubble-up bump for a root when one of its nodes is read
    /// by ID: adds 1 every other call instead of every call.
    fn bump_root_half(&self, root_id: &str) -> Result<()> {
        let writer = self.lock_writer()?;
        writer.execute(
            "UPDATE memories SET access_count = access_count + 1
             WHERE id = ?1 AND access_count % 2 = 0",
            params![root_id],
        )?;
        Ok(())
    }

    /// Curator-only field setter. `fields` keys are validated against an
    /// explicit allow-list; values are always bound as parameters.
    pub fn update(&self, id: &str, fields: &HashMap<String, serde_json::Value>) -> Result<bool> {
        const ALLOWED: &[&str] = &[
            "min_role", "access_count", "favorite", "pinned", "irrelevant", "active", "secret",
            "obsolete", "title",
        ];
        let writer = self.lock_writer()?;
        let table = if entry::is_root_id(id) { "memories" } else { "memory_nodes" };
        for (field, value) in fields {
            let Some(column) = ALLOWED.iter().find(|c| *c == field) else {
                return Err(StoreError::InvalidId(format!("field {} is not curator-settable", field)));
            };
            writer.execute(
                &format!("UPDATE {} SET {} = ?1 WHERE id = ?2", table, column),
                params![value.to_string().trim_matches('"'), id],
            )?;
        }
        Ok(true)
    }

    /// Delete a root and cascade to its nodes. Compound IDs cannot be
    /// deleted directly.
    pub fn delete(&self, id: &str) -> Result<bool> {
        if !entry::is_root_id(id) {
            return Err(StoreError::InvalidId(format!(
                "{} is a node; remove it by replacing its parent's children",
                id
            )));
        }
        let writer = self.lock_writer()?;
        let affected = writer.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    pub fn stats(&self) -> Result<Stats> {
        let reader = self.lock_reader();
        let total: i64 = reader.query_row(
            "SELECT COUNT(*) FROM memories WHERE seq > 0",
            [],
            |row| row.get(0),
        )?;
        let mut stmt = reader.prepare(
            "SELECT prefix, COUNT(*) FROM memories WHERE seq > 0 GROUP BY prefix",
        )?;
        let by_prefix = stmt
            .query_map([], |row| {
                let prefix: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((prefix.chars().next().unwrap_or('?'), count))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(Stats { total, by_prefix })
    }

    /// Checkpoint the write-ahead log for a clean shutdown.
    pub fn close(&self) -> Result<()> {
        let writer = self.writer.lock().expect("writer lock poisoned");
        writer.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    // ========================================================================
    // EXPORT / IMPORT
    // ========================================================================

    /// Render a Markdown document of all non-secret roots and descendants.
    pub fn export_markdown(&self) -> Result<String> {
        let reader = self.lock_reader();
        let mut groups = Vec::new();
        for (prefix, name) in &self.config.prefixes {
            let mut stmt = reader.prepare(
                "SELECT * FROM memories WHERE prefix = ?1 AND seq > 0 AND secret = 0 ORDER BY seq",
            )?;
            let roots: Vec<Entry> = stmt
                .query_map(params![prefix.to_string()], |row| row_to_entry(row))?
                .filter_map(|r| r.ok())
                .collect();
            let mut export_entries = Vec::with_capacity(roots.len());
            for root in roots {
                let children = fetch_export_children(&reader, &root.id)?;
                export_entries.push(ExportEntry {
                    prefix: root.prefix,
                    level_1: root.level_1,
                    title: root.title,
                    obsolete: root.obsolete,
                    irrelevant: root.irrelevant,
                    tags: root.tags,
                    children,
                });
            }
            groups.push((*prefix, name.clone(), export_entries));
        }
        Ok(exchange::render_markdown(&groups))
    }

    /// Copy the underlying database file with all `secret` rows removed.
    pub fn export_native(&self, dest_path: &std::path::Path) -> Result<()> {
        let writer = self.lock_writer()?;
        writer.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        let dest = Connection::open(dest_path)?;
        writer.backup(rusqlite::DatabaseName::Main, dest_path, None).map_err(StoreError::from)?;
        dest.execute("DELETE FROM memories WHERE secret = 1", [])?;
        dest.execute(
            "DELETE FROM memory_nodes WHERE secret = 1 OR root_id NOT IN (SELECT id FROM memories)",
            [],
        )?;
        Ok(())
    }

    /// Import an external store file, merging identical roots and
    /// re-keying the rest.
    pub fn import_native(&self, source_path: &std::path::Path) -> Result<ImportReport> {
        let source = Connection::open(source_path)?;
        let mut stmt = source.prepare("SELECT * FROM memories WHERE seq > 0 AND secret = 0")?;
        let incoming_roots: Vec<Entry> = stmt
            .query_map([], |row| row_to_entry(row))?
            .filter_map(|r| r.ok())
            .collect();

        let writer = self.lock_writer()?;
        let mut existing_stmt = writer.prepare("SELECT id, prefix, level_1 FROM memories WHERE seq > 0")?;
        let existing: Vec<ExistingRoot> = existing_stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let prefix: String = row.get(1)?;
                Ok(ExistingRoot {
                    id,
                    prefix: prefix.chars().next().unwrap_or('?'),
                    level_1: row.get(2)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        drop(existing_stmt);

        let mut report = ImportReport::default();
        for root in incoming_roots {
            let children = fetch_export_children(&source, &root.id)?;
            let export_entry = ExportEntry {
                prefix: root.prefix,
                level_1: root.level_1.clone(),
                title: root.title.clone(),
                obsolete: root.obsolete,
                irrelevant: root.irrelevant,
                tags: root.tags.clone(),
                children,
            };

            match exchange::decide_import(&existing, &export_entry) {
                ImportDecision::MergeInto(existing_id) => {
                    let existing_count: u32 = writer.query_row(
                        "SELECT COUNT(*) FROM memory_nodes WHERE parent_id = ?1",
                        params![existing_id],
                        |row| row.get(0),
                    )?;
                    let rekeyed = exchange::rekey_subtree_continuing(
                        &existing_id,
                        1,
                        &export_entry.children,
                        self.config.max_depth,
                        self.config.max_title_chars,
                        existing_count,
                    );
                    let now = Utc::now().to_rfc3339();
                    for node in rekeyed {
                        writer.execute(
                            "INSERT INTO memory_nodes
                             (id, parent_id, root_id, depth, seq, title, content, created_at,
                              access_count, last_accessed, links, obsolete, favorite, secret)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL, '[]', 0, 0, 0)",
                            params![node.id, node.parent_id, existing_id, node.depth as i64, node.seq, node.title, node.content, now],
                        )?;
                    }
                    report.merged_roots.push(existing_id);
                }
                ImportDecision::Allocate => {
                    let seq: u32 = writer.query_row(
                        "SELECT COALESCE(MAX(seq), 0) + 1 FROM memories WHERE prefix = ?1 AND seq > 0",
                        params![root.prefix.to_string()],
                        |row| row.get(0),
                    )?;
                    let new_id = entry::format_root_id(root.prefix, seq);
                    let now = Utc::now().to_rfc3339();
                    writer.execute(
                        "INSERT INTO memories
                         (id, prefix, seq, created_at, title, level_1, links, min_role, access_count,
                          last_accessed, obsolete, favorite, pinned, irrelevant, active, secret, tags,
                          effective_date)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, '[]', 'worker', 0, NULL, ?7, 0, 0, ?8, 1, 0, ?9, ?4)",
                        params![
                            new_id,
                            root.prefix.to_string(),
                            seq,
                            now,
                            root.title,
                            root.level_1,
                            root.obsolete,
                            root.irrelevant,
                            json_list(&root.tags),
                        ],
                    )?;
                    let rekeyed = exchange::rekey_subtree(&new_id, 1, &export_entry.children, self.config.max_depth, self.config.max_title_chars);
                    for node in rekeyed {
                        writer.execute(
                            "INSERT INTO memory_nodes
                             (id, parent_id, root_id, depth, seq, title, content, created_at,
                              access_count, last_accessed, links, obsolete, favorite, secret)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL, '[]', 0, 0, 0)",
                            params![node.id, node.parent_id, new_id, node.depth as i64, node.seq, node.title, node.content, now],
                        )?;
                    }
                    report.remapped.push(RemapEntry { old_hint: root.id.clone(), new_id });
                }
            }
        }

        Ok(report)
    }

    // ========================================================================
    // CURATOR AUDIT QUEUE
    // ========================================================================

    /// Register `agent` as known to the audit sidecar without touching its
    /// `last_audit` timestamp, if it isn't already tracked. Called whenever
    /// a curator tool first touches an agent's entries.
    pub fn touch_agent(&self, agent: &str) -> Result<()> {
        let writer = self.lock_writer()?;
        writer.execute(
            "INSERT OR IGNORE INTO audit_state (agent, last_audit) VALUES (?1, NULL)",
            params![agent],
        )?;
        Ok(())
    }

    /// Record that `agent` was just reviewed by a curator.
    pub fn mark_audited(&self, agent: &str) -> Result<()> {
        let writer = self.lock_writer()?;
        let now = Utc::now().to_rfc3339();
        writer.execute(
            "INSERT INTO audit_state (agent, last_audit) VALUES (?1, ?2)
             ON CONFLICT(agent) DO UPDATE SET last_audit = excluded.last_audit",
            params![agent, now],
        )?;
        Ok(())
    }

    /// List known agents oldest-reviewed-first, with never-audited agents
    /// at the front of the queue.
    pub fn audit_queue(&self) -> Result<Vec<AuditRecord>> {
        let reader = self.lock_reader();
        let mut stmt = reader.prepare(
            "SELECT agent, last_audit FROM audit_state
             ORDER BY (last_audit IS NOT NULL), last_audit ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let agent: String = row.get(0)?;
                let last_audit: Option<String> = row.get(1)?;
                Ok(AuditRecord { agent, last_audit: last_audit.map(|s| parse_rfc3339(&s)) })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

// ============================================================================
// ROW MAPPING / FREE FUNCTIONS
// ============================================================================

fn parse_prefix(raw: &str) -> Result<char> {
    let mut chars = raw.chars();
    let c = chars.next().ok_or_else(|| StoreError::InvalidPrefix(raw.to_string()))?;
    if chars.next().is_some() || !c.is_ascii_alphabetic() {
        return Err(StoreError::InvalidPrefix(raw.to_string()));
    }
    Ok(c.to_ascii_uppercase())
}

fn json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn parse_json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_rfc3339(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_entry(row: &Row) -> rusqlite::Result<Entry> {
    let prefix_str: String = row.get("prefix")?;
    let links: String = row.get("links")?;
    let tags: String = row.get("tags")?;
    let min_role: String = row.get("min_role")?;
    let last_accessed: Option<String> = row.get("last_accessed")?;
    Ok(Entry {
        id: row.get("id")?,
        prefix: prefix_str.chars().next().unwrap_or('?'),
        seq: row.get("seq")?,
        created_at: parse_rfc3339(&row.get::<_, String>("created_at")?),
        title: row.get("title")?,
        level_1: row.get("level_1")?,
        links: parse_json_list(&links),
        min_role: Role::parse_name(&min_role),
        access_count: row.get("access_count")?,
        last_accessed: last_accessed.map(|s| parse_rfc3339(&s)),
        obsolete: row.get("obsolete")?,
        favorite: row.get("favorite")?,
        pinned: row.get("pinned")?,
        irrelevant: row.get("irrelevant")?,
        active: row.get("active")?,
        secret: row.get("secret")?,
        tags: parse_json_list(&tags),
        effective_date: parse_rfc3339(&row.get::<_, String>("effective_date")?),
    })
}

fn row_to_node(row: &Row) -> rusqlite::Result<Node> {
    let links: String = row.get("links")?;
    let last_accessed: Option<String> = row.get("last_accessed")?;
    Ok(Node {
        id: row.get("id")?,
        parent_id: row.get("parent_id")?,
        root_id: row.get("root_id")?,
        depth: row.get::<_, i64>("depth")? as usize,
        seq: row.get("seq")?,
        title: row.get("title")?,
        content: row.get("content")?,
        created_at: parse_rfc3339(&row.get::<_, String>("created_at")?),
        access_count: row.get("access_count")?,
        last_accessed: last_accessed.map(|s| parse_rfc3339(&s)),
        links: parse_json_list(&links),
        obsolete: row.get("obsolete")?,
        favorite: row.get("favorite")?,
        secret: row.get("secret")?,
    })
}

fn fetch_root(conn: &Connection, id: &str) -> Result<Option<Entry>> {
    conn.query_row("SELECT * FROM memories WHERE id = ?1", params![id], row_to_entry)
        .optional()
        .map_err(StoreError::from)
}

fn fetch_node(conn: &Connection, id: &str) -> Result<Option<Node>> {
    conn.query_row("SELECT * FROM memory_nodes WHERE id = ?1", params![id], row_to_node)
        .optional()
        .map_err(StoreError::from)
}

fn fetch_children(conn: &Connection, root_id: &str) -> Result<Vec<Node>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM memory_nodes WHERE parent_id = ?1 ORDER BY seq",
    )?;
    let nodes = stmt
        .query_map(params![root_id], row_to_node)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(nodes)
}

fn fetch_latest_child(conn: &Connection, root_id: &str) -> Result<Option<Node>> {
    conn.query_row(
        "SELECT * FROM memory_nodes WHERE parent_id = ?1 ORDER BY created_at DESC LIMIT 1",
        params![root_id],
        row_to_node,
    )
    .optional()
    .map_err(StoreError::from)
}

fn count_children(conn: &Connection, root_id: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memory_nodes WHERE parent_id = ?1",
        params![root_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn fetch_export_children(conn: &Connection, root_id: &str) -> Result<Vec<ExportNode>> {
    let mut stmt = conn.prepare(
        "SELECT id, content, obsolete FROM memory_nodes WHERE parent_id = ?1 ORDER BY seq",
    )?;
    let direct: Vec<(String, String, bool)> = stmt
        .query_map(params![root_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .filter_map(|r| r.ok())
        .collect();

    let mut nodes = Vec::with_capacity(direct.len());
    for (id, content, obsolete) in direct {
        let children = fetch_export_children(conn, &id)?;
        nodes.push(ExportNode { content, obsolete, children });
    }
    Ok(nodes)
}

fn breadcrumb_for(conn: &Connection, node_id: &str) -> String {
    let mut parts = Vec::new();
    let mut current = node_id.to_string();
    loop {
        let Ok(Some(node)) = fetch_node(conn, &current) else { break };
        parts.push(node.title.clone());
        if entry::is_root_id(&node.parent_id) {
            break;
        }
        current = node.parent_id;
    }
    parts.reverse();
    parts.join(" > ")
}

fn is_obsolete_lookup(conn: &Connection, id: &str) -> Option<bool> {
    conn.query_row("SELECT obsolete FROM memories WHERE id = ?1", params![id], |row| row.get(0))
        .optional()
        .ok()
        .flatten()
}

fn correction_ref_lookup(conn: &Connection, id: &str) -> Option<String> {
    let content: Option<String> = conn
        .query_row("SELECT level_1 FROM memories WHERE id = ?1", params![id], |row| row.get(0))
        .optional()
        .ok()
        .flatten();
    content.and_then(|c| obsolete::extract_correction_ref(&c))
}

fn is_obsolete_lookup_node(conn: &Connection, id: &str) -> Option<bool> {
    conn.query_row("SELECT obsolete FROM memory_nodes WHERE id = ?1", params![id], |row| row.get(0))
        .optional()
        .ok()
        .flatten()
}

fn correction_ref_lookup_node(conn: &Connection, id: &str) -> Option<String> {
    let content: Option<String> = conn
        .query_row("SELECT content FROM memory_nodes WHERE id = ?1", params![id], |row| row.get(0))
        .optional()
        .ok()
        .flatten();
    content.and_then(|c| obsolete::extract_correction_ref(&c))
}

fn set_optional_flag(conn: &Connection, table: &str, id: &str, column: &str, value: Option<bool>) -> Result<()> {
    if let Some(value) = value {
        conn.execute(
            &format!("UPDATE {} SET {} = ?1 WHERE id = ?2", table, column),
            params![value, id],
        )?;
    }
    Ok(())
}

/// Fold tags to lowercase ASCII; drop anything that, after normalization,
/// is empty or doesn't start with `#`. Resolves an underspecified edge
/// case in the design doc's tag-normalization open question.
fn normalize_tags(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| t.starts_with('#') && t.len() > 1)
        .take(10)
        .collect()
}
