//! SQLite Storage Implementation
//!
//! Durable storage for memories, relationships, sessions, domains, and
//! categories, with an FTS5 shadow index for keyword search.
//!
//! Uses separate reader/writer connections for interior mutability. All
//! methods take `&self`, making the store `Send + Sync` so the surfaces can
//! share it as `Arc<Store>` without an outer lock.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::error::{EngineError, Result};
use crate::memory::{
    AccessScope, AgentType, Category, Domain, Memory, MemoryListFilter, Relationship,
    RelationshipType, Session, SessionFilterMode,
};

/// Per-domain aggregate returned by domain stats lookups
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainStats {
    pub name: String,
    pub memory_count: u64,
    pub avg_importance: f64,
}

/// Aggregate row counts used for stats reporting
#[derive(Debug, Clone, Copy)]
pub struct StoreCounts {
    pub memories: u64,
    pub sessions: u64,
    pub domains: u64,
    pub categories: u64,
}

const MEMORY_COLUMNS: &str = "m.id, m.content, m.importance, m.tags, m.domain, m.source, \
     m.session_id, m.agent_type, m.agent_context, m.access_scope, \
     m.parent_memory_id, m.chunk_level, m.chunk_index, m.slug, \
     m.created_at, m.updated_at, m.embedding IS NOT NULL";

/// Durable store over an embedded SQLite database
pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl Store {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (and optionally migrate) the database at `path`.
    pub fn open(path: &PathBuf, auto_migrate: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer = Connection::open(path)?;
        Self::configure_connection(&writer)?;

        if auto_migrate {
            super::migrations::apply_migrations(&writer)?;
        }

        let reader = Connection::open(path)?;
        Self::configure_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| EngineError::Internal("writer lock poisoned".to_string()))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| EngineError::Internal("reader lock poisoned".to_string()))
    }

    /// Cheap liveness probe used by health reporting.
    pub fn ping(&self) -> bool {
        self.reader()
            .and_then(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map_err(EngineError::from)
            })
            .is_ok()
    }

    // ========================================================================
    // MEMORIES
    // ========================================================================

    /// Insert a single memory row.
    pub fn insert_memory(&self, memory: &Memory) -> Result<()> {
        let writer = self.writer()?;
        insert_memory_row(&writer, memory)?;
        Ok(())
    }

    /// Insert a root memory and its chunk children in one transaction.
    pub fn insert_memory_tree(&self, root: &Memory, chunks: &[Memory]) -> Result<()> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        insert_memory_row(&tx, root)?;
        for chunk in chunks {
            insert_memory_row(&tx, chunk)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Fetch a memory by identifier. Missing rows are `Ok(None)`.
    pub fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        let reader = self.reader()?;
        let sql = format!("SELECT {} FROM memories m WHERE m.id = ?1", MEMORY_COLUMNS);
        let memory = reader
            .query_row(&sql, params![id], memory_from_row)
            .optional()?;
        Ok(memory)
    }

    /// Fetch a memory by slug.
    pub fn get_memory_by_slug(&self, slug: &str) -> Result<Option<Memory>> {
        let reader = self.reader()?;
        let sql = format!("SELECT {} FROM memories m WHERE m.slug = ?1", MEMORY_COLUMNS);
        let memory = reader
            .query_row(&sql, params![slug], memory_from_row)
            .optional()?;
        Ok(memory)
    }

    /// True when the identifier names an existing memory.
    pub fn memory_exists(&self, id: &str) -> Result<bool> {
        let reader = self.reader()?;
        let found: Option<i64> = reader
            .query_row("SELECT 1 FROM memories WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    /// Persist all mutable fields of a memory.
    pub fn update_memory(&self, memory: &Memory) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE memories SET
                content = ?2, importance = ?3, tags = ?4, domain = ?5,
                source = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                memory.id,
                memory.content,
                memory.importance,
                serde_json::to_string(&memory.tags)?,
                memory.domain,
                memory.source,
                memory.updated_at.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(EngineError::NotFound(format!("memory {}", memory.id)));
        }
        Ok(())
    }

    /// Record the embedding blob pushed to the vector index.
    pub fn set_embedding(&self, id: &str, embedding: &[f32]) -> Result<()> {
        let bytes: Vec<u8> = embedding.iter().flat_map(|v| v.to_le_bytes()).collect();
        let writer = self.writer()?;
        writer.execute(
            "UPDATE memories SET embedding = ?2 WHERE id = ?1",
            params![id, bytes],
        )?;
        Ok(())
    }

    /// Delete a memory. Relationships and chunk children cascade through
    /// foreign keys. Returns whether a row was removed.
    pub fn delete_memory(&self, id: &str) -> Result<bool> {
        let writer = self.writer()?;
        let changed = writer.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Filtered listing.
    ///
    /// With `parent_id` set, returns the chunk children of that root in
    /// `chunk_index` order; otherwise returns root memories newest-first.
    pub fn list_memories(&self, filter: &MemoryListFilter) -> Result<Vec<Memory>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        build_filter(filter, &mut clauses, &mut values);

        let order = if filter.parent_id.is_some() {
            "m.chunk_index ASC"
        } else {
            "m.created_at DESC, m.id ASC"
        };

        let sql = format!(
            "SELECT {} FROM memories m WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
            MEMORY_COLUMNS,
            join_clauses(&clauses),
            order,
            filter.limit.unwrap_or(100),
            filter.offset.unwrap_or(0),
        );

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter().map(|v| v.as_ref())), memory_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Keyword search over the FTS index.
    ///
    /// Returns `(memory, relevance)` pairs where relevance is the negated
    /// bm25 rank (higher is better). An empty query skips FTS entirely and
    /// returns the plain filtered listing ordered by importance.
    pub fn keyword_search(
        &self,
        query: &str,
        filter: &MemoryListFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<(Memory, f64)>> {
        if query.trim().is_empty() {
            return self.importance_listing(filter, limit, offset);
        }

        match self.fts_query(query, filter, limit, offset) {
            Ok(results) => Ok(results),
            Err(EngineError::Internal(message))
                if message.contains("fts5") || message.contains("syntax error") =>
            {
                // The FTS parser rejected the query (unbalanced quotes,
                // stray operators). Retry with each token quoted.
                let fallback = fallback_fts_query(query);
                if fallback.is_empty() {
                    return self.importance_listing(filter, limit, offset);
                }
                tracing::debug!(query, fallback = %fallback, "FTS query rejected; retrying tokenized");
                self.fts_query(&fallback, filter, limit, offset)
            }
            Err(other) => Err(other),
        }
    }

    fn fts_query(
        &self,
        query: &str,
        filter: &MemoryListFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<(Memory, f64)>> {
        let mut clauses: Vec<String> = vec!["memories_fts MATCH ?".to_string()];
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(query.to_string())];
        build_filter(filter, &mut clauses, &mut values);

        let sql = format!(
            "SELECT {}, bm25(memories_fts) AS rank
             FROM memories_fts
             JOIN memories m ON m.rowid = memories_fts.rowid
             WHERE {}
             ORDER BY rank ASC, m.importance DESC, m.created_at DESC, m.id ASC
             LIMIT {} OFFSET {}",
            MEMORY_COLUMNS,
            clauses.join(" AND "),
            limit,
            offset,
        );

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter().map(|v| v.as_ref())), |row| {
            let memory = memory_from_row(row)?;
            let rank: f64 = row.get(17)?;
            Ok((memory, -rank))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn importance_listing(
        &self,
        filter: &MemoryListFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<(Memory, f64)>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        build_filter(filter, &mut clauses, &mut values);

        let sql = format!(
            "SELECT {} FROM memories m WHERE {}
             ORDER BY m.importance DESC, m.created_at DESC, m.id ASC
             LIMIT {} OFFSET {}",
            MEMORY_COLUMNS,
            join_clauses(&clauses),
            limit,
            offset,
        );

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter().map(|v| v.as_ref())), |row| {
            Ok((memory_from_row(row)?, 0.0))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ========================================================================
    // SESSIONS
    // ========================================================================

    /// Ensure a session row exists, updating its last-accessed time.
    pub fn touch_session(&self, id: &str, agent_type: AgentType) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO sessions (id, agent_type, created_at, last_accessed)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(id) DO UPDATE SET last_accessed = excluded.last_accessed",
            params![id, agent_type.as_str(), now],
        )?;
        Ok(())
    }

    /// All known sessions, most recently touched first.
    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, agent_type, created_at, last_accessed
             FROM sessions ORDER BY last_accessed DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Session {
                id: row.get(0)?,
                agent_type: AgentType::parse_name(&row.get::<_, String>(1)?),
                created_at: row.get(2)?,
                last_accessed: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ========================================================================
    // DOMAINS & CATEGORIES
    // ========================================================================

    /// Create the domain row if it does not exist. Name is stored lowercase.
    pub fn ensure_domain(&self, name: &str) -> Result<()> {
        let normalized = name.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(EngineError::BadRequest("domain name is empty".to_string()));
        }
        let writer = self.writer()?;
        writer.execute(
            "INSERT OR IGNORE INTO domains (id, name, description, created_at)
             VALUES (?1, ?2, NULL, ?3)",
            params![
                uuid::Uuid::new_v4().to_string(),
                normalized,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn get_domain(&self, name: &str) -> Result<Option<Domain>> {
        let reader = self.reader()?;
        let domain = reader
            .query_row(
                "SELECT id, name, description, created_at FROM domains WHERE name = ?1",
                params![name.trim().to_lowercase()],
                domain_from_row,
            )
            .optional()?;
        Ok(domain)
    }

    pub fn list_domains(&self) -> Result<Vec<Domain>> {
        let reader = self.reader()?;
        let mut stmt = reader
            .prepare("SELECT id, name, description, created_at FROM domains ORDER BY name ASC")?;
        let rows = stmt.query_map([], domain_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Memory count and average importance for one domain.
    pub fn domain_stats(&self, name: &str) -> Result<Option<DomainStats>> {
        let normalized = name.trim().to_lowercase();
        if self.get_domain(&normalized)?.is_none() {
            return Ok(None);
        }
        let reader = self.reader()?;
        let (count, avg): (i64, f64) = reader.query_row(
            "SELECT COUNT(*), COALESCE(AVG(importance), 0.0)
             FROM memories WHERE domain = ?1 AND chunk_level = 0",
            params![normalized],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let count = count as u64;
        Ok(Some(DomainStats {
            name: normalized,
            memory_count: count,
            avg_importance: avg,
        }))
    }

    /// Create an explicit category. Duplicate names are a conflict.
    pub fn create_category(&self, name: &str, description: Option<&str>) -> Result<Category> {
        let normalized = name.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(EngineError::BadRequest("category name is empty".to_string()));
        }
        let category = Category {
            id: uuid::Uuid::new_v4().to_string(),
            name: normalized,
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO categories (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                category.id,
                category.name,
                category.description,
                category.created_at.to_rfc3339()
            ],
        )?;
        Ok(category)
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, name, description, created_at FROM categories ORDER BY name ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ========================================================================
    // RELATIONSHIPS
    // ========================================================================

    /// Insert an edge. A duplicate (source, target, type) triple surfaces as
    /// a conflict through the unique constraint.
    pub fn insert_relationship(&self, relationship: &Relationship) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO relationships
                (id, source_id, target_id, relationship_type, strength, context, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                relationship.id,
                relationship.source_id,
                relationship.target_id,
                relationship.relationship_type.as_str(),
                relationship.strength,
                relationship.context,
                relationship.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Edges where the memory is source or target, strongest first.
    pub fn relationships_for(
        &self,
        memory_id: &str,
        type_filter: Option<RelationshipType>,
        limit: usize,
    ) -> Result<Vec<Relationship>> {
        let reader = self.reader()?;
        let mut sql = String::from(
            "SELECT id, source_id, target_id, relationship_type, strength, context, created_at
             FROM relationships WHERE (source_id = ?1 OR target_id = ?1)",
        );
        if type_filter.is_some() {
            sql.push_str(" AND relationship_type = ?2");
        }
        sql.push_str(&format!(
            " ORDER BY strength DESC, created_at DESC LIMIT {}",
            limit.min(1_000_000)
        ));

        let mut stmt = reader.prepare(&sql)?;
        let rows = match type_filter {
            Some(ty) => stmt.query_map(params![memory_id, ty.as_str()], relationship_from_row)?,
            None => stmt.query_map(params![memory_id], relationship_from_row)?,
        }
        .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Total edge count, for stats reporting.
    pub fn count_relationships(&self) -> Result<u64> {
        let reader = self.reader()?;
        let count: i64 = reader.query_row("SELECT COUNT(*) FROM relationships", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ========================================================================
    // STATS
    // ========================================================================

    /// Aggregate counts across all tables. Memory count covers root
    /// memories only; chunks are an indexing detail.
    pub fn counts(&self) -> Result<StoreCounts> {
        let reader = self.reader()?;
        let memories: i64 = reader.query_row(
            "SELECT COUNT(*) FROM memories WHERE chunk_level = 0",
            [],
            |row| row.get(0),
        )?;
        let sessions: i64 =
            reader.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        let domains: i64 = reader.query_row("SELECT COUNT(*) FROM domains", [], |row| row.get(0))?;
        let categories: i64 =
            reader.query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;
        Ok(StoreCounts {
            memories: memories as u64,
            sessions: sessions as u64,
            domains: domains as u64,
            categories: categories as u64,
        })
    }
}

// ============================================================================
// ROW MAPPING & FILTER BUILDING
// ============================================================================

fn insert_memory_row(conn: &Connection, memory: &Memory) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO memories (
            id, content, importance, tags, domain, source,
            session_id, agent_type, agent_context, access_scope,
            parent_memory_id, chunk_level, chunk_index, slug,
            created_at, updated_at, embedding
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14,
            ?15, ?16, NULL
        )",
        params![
            memory.id,
            memory.content,
            memory.importance,
            serde_json::to_string(&memory.tags).unwrap_or_else(|_| "[]".to_string()),
            memory.domain,
            memory.source,
            memory.session_id,
            memory.agent_type.as_str(),
            memory.agent_context,
            memory.access_scope.as_str(),
            memory.parent_memory_id,
            memory.chunk_level,
            memory.chunk_index,
            memory.slug,
            memory.created_at.to_rfc3339(),
            memory.updated_at.to_rfc3339(),
        ],
    )
}

fn memory_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let tags_json: String = row.get(3)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    Ok(Memory {
        id: row.get(0)?,
        content: row.get(1)?,
        importance: row.get(2)?,
        tags,
        domain: row.get(4)?,
        source: row.get(5)?,
        session_id: row.get(6)?,
        agent_type: AgentType::parse_name(&row.get::<_, String>(7)?),
        agent_context: row.get(8)?,
        access_scope: AccessScope::parse_name(&row.get::<_, String>(9)?),
        parent_memory_id: row.get(10)?,
        chunk_level: row.get(11)?,
        chunk_index: row.get(12)?,
        slug: row.get(13)?,
        created_at: row.get::<_, DateTime<Utc>>(14)?,
        updated_at: row.get::<_, DateTime<Utc>>(15)?,
        has_embedding: row.get::<_, i64>(16)? != 0,
    })
}

fn domain_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Domain> {
    Ok(Domain {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn relationship_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Relationship> {
    let type_name: String = row.get(3)?;
    Ok(Relationship {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        relationship_type: RelationshipType::parse_name(&type_name)
            .unwrap_or(RelationshipType::References),
        strength: row.get(4)?,
        context: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Append WHERE clauses and parameters derived from a listing filter.
fn build_filter(
    filter: &MemoryListFilter,
    clauses: &mut Vec<String>,
    values: &mut Vec<Box<dyn ToSql>>,
) {
    match &filter.parent_id {
        Some(parent) => {
            clauses.push("m.parent_memory_id = ?".to_string());
            values.push(Box::new(parent.clone()));
        }
        None => clauses.push("m.chunk_level = 0".to_string()),
    }

    if let Some(domain) = &filter.domain {
        clauses.push("m.domain = ?".to_string());
        values.push(Box::new(domain.trim().to_lowercase()));
    }

    if let Some(session_id) = &filter.session_id {
        match filter.session_mode {
            SessionFilterMode::All => {}
            SessionFilterMode::SessionOnly => {
                clauses.push("m.session_id = ?".to_string());
                values.push(Box::new(session_id.clone()));
            }
            SessionFilterMode::SessionAndShared => {
                clauses
                    .push("(m.session_id = ? OR m.access_scope IN ('shared','global'))".to_string());
                values.push(Box::new(session_id.clone()));
            }
        }
    }

    for tag in &filter.tags {
        clauses.push(
            "EXISTS (SELECT 1 FROM json_each(m.tags) WHERE json_each.value = ?)".to_string(),
        );
        values.push(Box::new(tag.trim().to_lowercase()));
    }

    if let Some(min) = filter.min_importance {
        clauses.push("m.importance >= ?".to_string());
        values.push(Box::new(min));
    }
    if let Some(max) = filter.max_importance {
        clauses.push("m.importance <= ?".to_string());
        values.push(Box::new(max));
    }
    if let Some(since) = filter.since {
        clauses.push("m.created_at >= ?".to_string());
        values.push(Box::new(since.to_rfc3339()));
    }
    if let Some(until) = filter.until {
        clauses.push("m.created_at <= ?".to_string());
        values.push(Box::new(until.to_rfc3339()));
    }
}

fn join_clauses(clauses: &[String]) -> String {
    if clauses.is_empty() {
        "1=1".to_string()
    } else {
        clauses.join(" AND ")
    }
}

/// Quote each whitespace token so FTS5 treats it literally, OR-joined.
fn fallback_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "")))
        .filter(|t| t.len() > 2)
        .collect::<Vec<_>>()
        .join(" OR ")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{clamp_importance, normalize_tags};

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engram-test.db");
        let store = Store::open(&path, true).unwrap();
        (dir, store)
    }

    fn sample_memory(id: &str, content: &str) -> Memory {
        let now = Utc::now();
        Memory {
            id: id.to_string(),
            content: content.to_string(),
            importance: 5,
            tags: vec![],
            domain: None,
            source: None,
            session_id: "daemon-test".to_string(),
            agent_type: AgentType::Unknown,
            agent_context: None,
            access_scope: AccessScope::Session,
            parent_memory_id: None,
            chunk_level: 0,
            chunk_index: None,
            slug: None,
            created_at: now,
            updated_at: now,
            has_embedding: false,
        }
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let (_dir, store) = open_store();
        let mut memory = sample_memory("m-1", "  The quick brown fox  ");
        memory.content = memory.content.trim().to_string();
        memory.tags = normalize_tags(["Rust", "rust", " db "]);
        memory.importance = clamp_importance(Some(15));
        store.insert_memory(&memory).unwrap();

        let fetched = store.get_memory("m-1").unwrap().unwrap();
        assert_eq!(fetched.content, "The quick brown fox");
        assert_eq!(fetched.tags, vec!["rust", "db"]);
        assert_eq!(fetched.importance, 10);
        assert!(!fetched.has_embedding);
    }

    #[test]
    fn test_missing_memory_is_none_not_error() {
        let (_dir, store) = open_store();
        assert!(store.get_memory("nope").unwrap().is_none());
        assert!(!store.delete_memory("nope").unwrap());
    }

    #[test]
    fn test_keyword_search_finds_inserted_content() {
        let (_dir, store) = open_store();
        store
            .insert_memory(&sample_memory("m-1", "Hello world from the memory engine"))
            .unwrap();
        store
            .insert_memory(&sample_memory("m-2", "Unrelated gardening notes"))
            .unwrap();

        let results = store
            .keyword_search("hello", &MemoryListFilter::default(), 10, 0)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.id, "m-1");
        assert!(results[0].1 > 0.0);
    }

    #[test]
    fn test_fts_stays_in_sync_after_update_and_delete() {
        let (_dir, store) = open_store();
        let mut memory = sample_memory("m-1", "original searchable phrase");
        store.insert_memory(&memory).unwrap();

        memory.content = "replacement wording entirely".to_string();
        memory.updated_at = Utc::now();
        store.update_memory(&memory).unwrap();

        let old = store
            .keyword_search("searchable", &MemoryListFilter::default(), 10, 0)
            .unwrap();
        assert!(old.is_empty());
        let new = store
            .keyword_search("replacement", &MemoryListFilter::default(), 10, 0)
            .unwrap();
        assert_eq!(new.len(), 1);

        store.delete_memory("m-1").unwrap();
        let gone = store
            .keyword_search("replacement", &MemoryListFilter::default(), 10, 0)
            .unwrap();
        assert!(gone.is_empty());
    }

    #[test]
    fn test_malformed_fts_query_falls_back() {
        let (_dir, store) = open_store();
        store
            .insert_memory(&sample_memory("m-1", "payments service design"))
            .unwrap();
        // Unbalanced quote would be an FTS5 syntax error without the fallback.
        let results = store
            .keyword_search("\"payments service", &MemoryListFilter::default(), 10, 0)
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_cascade_delete_children_and_edges() {
        let (_dir, store) = open_store();
        let root = sample_memory("root", "a long parent document");
        let mut chunk = sample_memory("chunk-0", "a long parent");
        chunk.parent_memory_id = Some("root".to_string());
        chunk.chunk_level = 1;
        chunk.chunk_index = Some(0);
        store.insert_memory_tree(&root, &[chunk]).unwrap();
        store.insert_memory(&sample_memory("other", "peer")).unwrap();

        store
            .insert_relationship(&Relationship {
                id: "r-1".to_string(),
                source_id: "root".to_string(),
                target_id: "other".to_string(),
                relationship_type: RelationshipType::References,
                strength: 0.5,
                context: None,
                created_at: Utc::now(),
            })
            .unwrap();

        assert!(store.delete_memory("root").unwrap());
        assert!(store.get_memory("chunk-0").unwrap().is_none());
        assert!(store.relationships_for("other", None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_relationship_type_conflicts() {
        let (_dir, store) = open_store();
        store.insert_memory(&sample_memory("a", "alpha")).unwrap();
        store.insert_memory(&sample_memory("b", "beta")).unwrap();

        let edge = |id: &str, ty: RelationshipType| Relationship {
            id: id.to_string(),
            source_id: "a".to_string(),
            target_id: "b".to_string(),
            relationship_type: ty,
            strength: 0.5,
            context: None,
            created_at: Utc::now(),
        };

        store.insert_relationship(&edge("r-1", RelationshipType::Similar)).unwrap();
        // Same pair, same type: conflict
        let dup = store.insert_relationship(&edge("r-2", RelationshipType::Similar));
        assert!(matches!(dup, Err(EngineError::Conflict(_))));
        // Same pair, different type: fine
        store.insert_relationship(&edge("r-3", RelationshipType::Expands)).unwrap();
    }

    #[test]
    fn test_conjunctive_tag_filter() {
        let (_dir, store) = open_store();
        let mut both = sample_memory("both", "has both tags");
        both.tags = vec!["rust".to_string(), "db".to_string()];
        let mut one = sample_memory("one", "has one tag");
        one.tags = vec!["rust".to_string()];
        store.insert_memory(&both).unwrap();
        store.insert_memory(&one).unwrap();

        let filter = MemoryListFilter {
            tags: vec!["rust".to_string(), "db".to_string()],
            ..Default::default()
        };
        let results = store.list_memories(&filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "both");
    }

    #[test]
    fn test_session_scope_filter() {
        let (_dir, store) = open_store();
        let mut mine = sample_memory("mine", "session local");
        mine.session_id = "daemon-a".to_string();
        let mut shared = sample_memory("shared", "visible shared");
        shared.session_id = "daemon-b".to_string();
        shared.access_scope = AccessScope::Shared;
        let mut foreign = sample_memory("foreign", "invisible");
        foreign.session_id = "daemon-b".to_string();
        store.insert_memory(&mine).unwrap();
        store.insert_memory(&shared).unwrap();
        store.insert_memory(&foreign).unwrap();

        let filter = MemoryListFilter {
            session_id: Some("daemon-a".to_string()),
            session_mode: SessionFilterMode::SessionAndShared,
            ..Default::default()
        };
        let mut ids: Vec<String> = store
            .list_memories(&filter)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["mine", "shared"]);
    }

    #[test]
    fn test_touch_session_upserts() {
        let (_dir, store) = open_store();
        store.touch_session("daemon-x", AgentType::Api).unwrap();
        store.touch_session("daemon-x", AgentType::Api).unwrap();
        let sessions = store.list_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].last_accessed >= sessions[0].created_at);
    }

    #[test]
    fn test_domain_auto_create_and_stats() {
        let (_dir, store) = open_store();
        store.ensure_domain("Engineering").unwrap();
        store.ensure_domain("engineering").unwrap();
        assert_eq!(store.list_domains().unwrap().len(), 1);

        let mut memory = sample_memory("m-1", "domain scoped");
        memory.domain = Some("engineering".to_string());
        memory.importance = 8;
        store.insert_memory(&memory).unwrap();

        let stats = store.domain_stats("ENGINEERING").unwrap().unwrap();
        assert_eq!(stats.memory_count, 1);
        assert!((stats.avg_importance - 8.0).abs() < f64::EPSILON);
        assert!(store.domain_stats("missing").unwrap().is_none());
    }

    #[test]
    fn test_counts_exclude_chunks() {
        let (_dir, store) = open_store();
        let root = sample_memory("root", "parent");
        let mut chunk = sample_memory("c0", "child");
        chunk.parent_memory_id = Some("root".to_string());
        chunk.chunk_level = 1;
        chunk.chunk_index = Some(0);
        store.insert_memory_tree(&root, &[chunk]).unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts.memories, 1);
    }
}
