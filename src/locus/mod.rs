//! LocusLedger (C1): idempotent mapping from content hash to stable locus id.
//!
//! Grounded in the teacher's `storage::sqlite` connection-management style
//! (a single `rusqlite::Connection` guarded by a mutex, WAL-enabled) but
//! scoped down to the one table spec.md §3/§4.1 describes. Kept as a side
//! file database, independent of the main graph store, per spec.md §6
//! ("side-file locus-ledger database").

use md5::{Digest, Md5};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LocusError {
    #[error("locus ledger database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("locus ledger mutex poisoned")]
    Poisoned,
}

pub type LocusResult<T> = Result<T, LocusError>;

/// Content-addressed id ledger. One row per distinct trimmed-content hash.
pub struct LocusLedger {
    conn: Mutex<Connection>,
}

impl LocusLedger {
    pub fn open(path: impl AsRef<Path>) -> LocusResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> LocusResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> LocusResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS locus_map (
                canon_hash TEXT PRIMARY KEY,
                locus_id   TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// MD5 hex digest of `text` after trimming leading/trailing whitespace.
    /// Otherwise untransformed (spec.md §4.1).
    pub fn hash(text: &str) -> String {
        let trimmed = text.trim();
        let digest = Md5::new_with_prefix(trimmed.as_bytes()).finalize();
        format!("{:x}", digest)
    }

    /// Return the locus id for `content_hash`, minting a fresh UUIDv4 on
    /// first observation. Idempotent: repeated calls with the same hash
    /// return the same id (invariant I1, property P1). On a unique-key
    /// race, re-reads and returns the winner rather than erroring.
    pub fn get_or_mint(&self, content_hash: &str) -> LocusResult<String> {
        let conn = self.conn.lock().map_err(|_| LocusError::Poisoned)?;

        if let Some(existing) = conn
            .query_row(
                "SELECT locus_id FROM locus_map WHERE canon_hash = ?1",
                params![content_hash],
                |row| row.get::<_, String>(0),
            )
            .optional()?
        {
            return Ok(existing);
        }

        let minted = Uuid::new_v4().to_string();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO locus_map (canon_hash, locus_id) VALUES (?1, ?2)",
            params![content_hash, minted],
        )?;

        if inserted == 1 {
            return Ok(minted);
        }

        // Lost a concurrent-insert race; the winner's row is now present.
        conn.query_row(
            "SELECT locus_id FROM locus_map WHERE canon_hash = ?1",
            params![content_hash],
            |row| row.get::<_, String>(0),
        )
        .map_err(LocusError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_mint_is_idempotent() {
        let ledger = LocusLedger::open_in_memory().unwrap();
        let hash = LocusLedger::hash("  some box content  ");
        let a = ledger.get_or_mint(&hash).unwrap();
        let b = ledger.get_or_mint(&hash).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_hashes_mint_distinct_ids() {
        let ledger = LocusLedger::open_in_memory().unwrap();
        let a = ledger.get_or_mint(&LocusLedger::hash("alpha")).unwrap();
        let b = ledger.get_or_mint(&LocusLedger::hash("beta")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn hash_trims_but_does_not_otherwise_transform() {
        assert_eq!(LocusLedger::hash("  foo  "), LocusLedger::hash("foo"));
        assert_ne!(LocusLedger::hash("Foo"), LocusLedger::hash("foo"));
    }
}
