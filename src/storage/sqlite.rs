//! SQLite-backed [`GraphStore`] (spec §4.4).
//!
//! Schema, migrations and FTS synchronization are grounded in the
//! teacher's `storage::sqlite` connection-management style (single
//! `rusqlite::Connection` behind a mutex, WAL mode, `PRAGMA user_version`)
//! and in the numbered-migration + FTS5-trigger pattern from
//! `zeroaltitude-vestige`'s `storage::migrations` (virtual table with
//! `content=`/`content_rowid=` plus `ai`/`ad`/`au` sync triggers).

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::graph::{Domain, Edge, Node, NodeId, NodeType};
use crate::vector::{encode, score_bytes};

use super::traits::{
    GraphStore, OpenStore, StorageError, StorageResult, StoreStats, TextHit, VectorHit,
};

const CURRENT_VERSION: i64 = 3;

struct Migration {
    version: i64,
    description: &'static str,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "base nodes/edges tables",
        up: "
            CREATE TABLE IF NOT EXISTS nodes (
                id       TEXT PRIMARY KEY,
                type     TEXT NOT NULL,
                title    TEXT,
                content  TEXT,
                domain   TEXT NOT NULL,
                layer    TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS edges (
                source TEXT NOT NULL,
                target TEXT NOT NULL,
                type   TEXT NOT NULL,
                PRIMARY KEY (source, target, type)
            );
            CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source);
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);
        ",
    },
    Migration {
        version: 2,
        description: "add content hash and embedding blob columns",
        up: "
            ALTER TABLE nodes ADD COLUMN hash TEXT NOT NULL DEFAULT '';
            ALTER TABLE nodes ADD COLUMN embedding BLOB;
        ",
    },
    Migration {
        version: 3,
        description: "add meta JSON column and FTS5 index with sync triggers",
        up: "
            ALTER TABLE nodes ADD COLUMN meta TEXT NOT NULL DEFAULT '{}';

            CREATE VIRTUAL TABLE IF NOT EXISTS nodes_fts USING fts5(
                id UNINDEXED,
                title,
                content,
                meta,
                tokenize = 'porter ascii'
            );

            CREATE TRIGGER IF NOT EXISTS nodes_ai AFTER INSERT ON nodes BEGIN
                INSERT INTO nodes_fts(rowid, id, title, content, meta)
                VALUES (new.rowid, new.id, new.title, new.content, new.meta);
            END;

            CREATE TRIGGER IF NOT EXISTS nodes_ad AFTER DELETE ON nodes BEGIN
                INSERT INTO nodes_fts(nodes_fts, rowid, id, title, content, meta)
                VALUES ('delete', old.rowid, old.id, old.title, old.content, old.meta);
            END;

            CREATE TRIGGER IF NOT EXISTS nodes_au AFTER UPDATE ON nodes BEGIN
                INSERT INTO nodes_fts(nodes_fts, rowid, id, title, content, meta)
                VALUES ('delete', old.rowid, old.id, old.title, old.content, old.meta);
                INSERT INTO nodes_fts(rowid, id, title, content, meta)
                VALUES (new.rowid, new.id, new.title, new.content, new.meta);
            END;
        ",
    },
];

/// A single-writer SQLite store implementing the full node/edge/FTS/vector
/// schema (spec.md §4.4).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init(conn: Connection) -> StorageResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let mut version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        // Pre-migration-numbering databases have user_version == 0 but
        // already hold a `nodes` table; detect how far along they are by
        // column presence before applying the remaining migrations.
        if version == 0 && Self::table_exists(&conn, "nodes")? {
            version = if Self::column_exists(&conn, "nodes", "meta")? {
                3
            } else if Self::column_exists(&conn, "nodes", "hash")? {
                2
            } else {
                1
            };
        }

        for migration in MIGRATIONS {
            if migration.version <= version {
                continue;
            }
            conn.execute_batch(migration.up).map_err(|e| {
                StorageError::MigrationFailed {
                    version: migration.version,
                    reason: format!("{} ({}): {e}", migration.description, migration.version),
                }
            })?;
            conn.pragma_update(None, "user_version", migration.version)?;
            version = migration.version;
        }

        debug_assert_eq!(version, CURRENT_VERSION);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn table_exists(conn: &Connection, name: &str) -> StorageResult<bool> {
        conn.query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1",
            params![name],
            |_| Ok(()),
        )
        .optional()
        .map(|r| r.is_some())
        .map_err(StorageError::from)
    }

    fn column_exists(conn: &Connection, table: &str, column: &str) -> StorageResult<bool> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let found = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .filter_map(|r| r.ok())
            .any(|name| name == column);
        Ok(found)
    }

    fn row_to_node(row: &Row<'_>) -> rusqlite::Result<Node> {
        let id: String = row.get("id")?;
        let node_type: String = row.get("type")?;
        let title: Option<String> = row.get("title")?;
        let content: Option<String> = row.get("content")?;
        let domain: String = row.get("domain")?;
        let layer: String = row.get("layer")?;
        let hash: String = row.get("hash")?;
        let embedding: Option<Vec<u8>> = row.get("embedding")?;
        let meta_raw: String = row.get("meta")?;

        let meta: Value = serde_json::from_str(&meta_raw).unwrap_or(Value::Object(Default::default()));
        let meta_obj = meta.as_object().cloned().unwrap_or_default();

        let mut node = Node::new(
            NodeId::from_string(id),
            node_type.parse().unwrap_or(NodeType::Note),
            domain.parse().unwrap_or(Domain::Experience),
            layer.parse().unwrap_or(crate::graph::Layer::Note),
        )
        .with_hash(hash);
        node.title = title;
        node.content = content;
        node.meta = meta_obj;
        if let Some(bytes) = embedding {
            node.embedding = Some(crate::vector::decode(&bytes));
        }
        Ok(node)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }
}

impl GraphStore for SqliteStore {
    fn insert_node(&self, node: &Node) -> StorageResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let meta = serde_json::to_string(&node.meta)?;
        let embedding_bytes = node.embedding.as_deref().map(encode);
        conn.execute(
            "INSERT INTO nodes (id, type, title, content, domain, layer, hash, embedding, meta)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                type = excluded.type,
                title = excluded.title,
                content = excluded.content,
                domain = excluded.domain,
                layer = excluded.layer,
                hash = excluded.hash,
                embedding = excluded.embedding,
                meta = excluded.meta",
            params![
                node.id.as_str(),
                node.node_type.to_string(),
                node.title,
                node.content,
                node.domain.to_string(),
                node.layer.to_string(),
                node.hash,
                embedding_bytes,
                meta,
            ],
        )?;
        Ok(())
    }

    fn insert_edge(&self, edge: &Edge) -> StorageResult<bool> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let changed = conn.execute(
            "INSERT OR IGNORE INTO edges (source, target, type) VALUES (?1, ?2, ?3)",
            params![edge.source.as_str(), edge.target.as_str(), edge.edge_type],
        )?;
        Ok(changed == 1)
    }

    fn get_node(&self, id: &NodeId) -> StorageResult<Option<Node>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            "SELECT id, type, title, content, domain, layer, hash, embedding, meta
             FROM nodes WHERE id = ?1",
            params![id.as_str()],
            Self::row_to_node,
        )
        .optional()
        .map_err(StorageError::from)
    }

    fn get_nodes_by_type(&self, node_type: NodeType) -> StorageResult<Vec<Node>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, type, title, content, domain, layer, hash, embedding, meta
             FROM nodes WHERE type = ?1",
        )?;
        let rows = stmt
            .query_map(params![node_type.to_string()], Self::row_to_node)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_node_hash(&self, id: &NodeId) -> StorageResult<Option<String>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            "SELECT hash FROM nodes WHERE id = ?1",
            params![id.as_str()],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(StorageError::from)
    }

    fn get_lexicon(&self) -> StorageResult<Vec<Node>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, type, title, content, domain, layer, hash, embedding, meta
             FROM nodes WHERE type = 'concept' AND domain = 'persona'",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_node)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn search_text(&self, query: &str, limit: usize) -> StorageResult<Vec<TextHit>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT f.id, n.title, snippet(nodes_fts, 2, '[', ']', '...', 12) AS snip, bm25(nodes_fts) AS rank
             FROM nodes_fts f
             JOIN nodes n ON n.id = f.id
             WHERE nodes_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![query, limit as i64], |row| {
                Ok(TextHit {
                    id: NodeId::from_string(row.get::<_, String>(0)?),
                    title: row.get(1)?,
                    snippet: row.get(2)?,
                    bm25_rank: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find_similar(
        &self,
        vector: &[f32],
        limit: usize,
        domain: Option<Domain>,
    ) -> StorageResult<Vec<VectorHit>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let (sql, domain_filter) = match domain {
            Some(d) => (
                "SELECT id, embedding FROM nodes WHERE embedding IS NOT NULL AND domain = ?1",
                Some(d.to_string()),
            ),
            None => (
                "SELECT id, embedding FROM nodes WHERE embedding IS NOT NULL",
                None,
            ),
        };
        let mut stmt = conn.prepare(sql)?;
        let mut hits: Vec<VectorHit> = if let Some(d) = domain_filter {
            stmt.query_map(params![d], |row| {
                let id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((id, blob))
            })?
            .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((id, blob))
            })?
            .collect::<Result<Vec<_>, _>>()?
        }
        .into_iter()
        .map(|(id, blob)| VectorHit {
            id: NodeId::from_string(id),
            score: score_bytes(vector, &blob),
        })
        .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    fn get_edges_from(&self, id: &NodeId) -> StorageResult<Vec<Edge>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare("SELECT source, target, type FROM edges WHERE source = ?1")?;
        let rows = stmt
            .query_map(params![id.as_str()], |row| {
                Ok(Edge::new(
                    NodeId::from_string(row.get::<_, String>(0)?),
                    NodeId::from_string(row.get::<_, String>(1)?),
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_edges_to(&self, id: &NodeId) -> StorageResult<Vec<Edge>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare("SELECT source, target, type FROM edges WHERE target = ?1")?;
        let rows = stmt
            .query_map(params![id.as_str()], |row| {
                Ok(Edge::new(
                    NodeId::from_string(row.get::<_, String>(0)?),
                    NodeId::from_string(row.get::<_, String>(1)?),
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn nodes_with_embedding(&self) -> StorageResult<Vec<Node>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, type, title, content, domain, layer, hash, embedding, meta
             FROM nodes WHERE embedding IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_node)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn edge_degree(&self, id: &NodeId) -> StorageResult<usize> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE source = ?1 OR target = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn shares_neighbor(&self, a: &NodeId, b: &NodeId) -> StorageResult<bool> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM edges ea
             JOIN edges eb ON (
                (ea.source = ?1 AND ea.target = eb.source AND eb.target = ?2) OR
                (ea.target = ?1 AND ea.source = eb.target AND eb.source = ?2) OR
                (ea.source = ?1 AND ea.target = eb.target AND eb.source = ?2) OR
                (ea.target = ?1 AND ea.source = eb.source AND eb.target = ?2)
             )
             LIMIT 1",
            params![a.as_str(), b.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn node_count(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn edge_count(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn vector_count(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE embedding IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn orphan_edge_count(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM edges e
             WHERE NOT EXISTS (SELECT 1 FROM nodes n WHERE n.id = e.source)
                OR NOT EXISTS (SELECT 1 FROM nodes n WHERE n.id = e.target)",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn count_nodes_by_domain(&self, domain: Domain) -> StorageResult<usize> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE domain = ?1",
            params![domain.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn get_stats(&self) -> StorageResult<StoreStats> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let nodes: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        let edges: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        let vectors: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE embedding IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        let page_count: i64 = conn.pragma_query_value(None, "page_count", |row| row.get(0))?;
        let page_size: i64 = conn.pragma_query_value(None, "page_size", |row| row.get(0))?;
        Ok(StoreStats {
            nodes: nodes as usize,
            edges: edges as usize,
            vectors: vectors as usize,
            db_size_bytes: (page_count * page_size).max(0) as u64,
        })
    }

    fn data_version(&self) -> StorageResult<i64> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.pragma_query_value(None, "data_version", |row| row.get(0))
            .map_err(StorageError::from)
    }

    fn checkpoint(&self) -> StorageResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Layer;

    fn sample_node(id: &str) -> Node {
        Node::new(
            NodeId::from_string(id),
            NodeType::Note,
            Domain::Experience,
            Layer::Note,
        )
        .with_title("Sample")
        .with_content("quick brown fox")
        .with_hash(crate::locus::LocusLedger::hash("quick brown fox"))
    }

    #[test]
    fn migrations_bring_a_fresh_store_to_current_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.conn.lock().unwrap();
        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn insert_node_then_get_node_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let node = sample_node("n1");
        store.insert_node(&node).unwrap();
        let fetched = store.get_node(&NodeId::from_string("n1")).unwrap().unwrap();
        assert_eq!(fetched.title.as_deref(), Some("Sample"));
        assert_eq!(fetched.content.as_deref(), Some("quick brown fox"));
    }

    #[test]
    fn insert_edge_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_node(&sample_node("a")).unwrap();
        store.insert_node(&sample_node("b")).unwrap();
        let edge = Edge::new(NodeId::from_string("a"), NodeId::from_string("b"), "CITES");
        assert!(store.insert_edge(&edge).unwrap());
        assert!(!store.insert_edge(&edge).unwrap());
        assert_eq!(store.edge_count().unwrap(), 1);
    }

    #[test]
    fn fts_and_nodes_stay_in_bijection_across_insert_update_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut node = sample_node("n1");
        store.insert_node(&node).unwrap();
        node.content = Some("updated content here".to_string());
        store.insert_node(&node).unwrap();

        let conn = store.conn.lock().unwrap();
        let nodes_count: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0)).unwrap();
        let fts_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM nodes_fts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(nodes_count, fts_count);
    }

    #[test]
    fn search_text_finds_inserted_content() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_node(&sample_node("n1")).unwrap();
        let hits = store.search_text("fox", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "n1");
    }

    #[test]
    fn find_similar_scores_by_dot_product_descending() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut a = sample_node("a");
        a.embedding = Some(vec![1.0, 0.0, 0.0]);
        let mut b = sample_node("b");
        b.embedding = Some(vec![0.0, 1.0, 0.0]);
        store.insert_node(&a).unwrap();
        store.insert_node(&b).unwrap();

        let hits = store.find_similar(&[1.0, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(hits[0].id.as_str(), "a");
    }

    #[test]
    fn orphan_edge_count_detects_dangling_targets() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_node(&sample_node("a")).unwrap();
        let edge = Edge::new(NodeId::from_string("a"), NodeId::from_string("ghost"), "CITES");
        store.insert_edge(&edge).unwrap();
        assert_eq!(store.orphan_edge_count().unwrap(), 1);
    }
}
