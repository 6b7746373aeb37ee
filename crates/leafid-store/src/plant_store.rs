//! Plant metadata lookup

use leafid_core::{Error, PlantLookup, PlantRecord, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db_error;

/// Read-only access to plant metadata keyed by classifier label
pub trait PlantStore: Send + Sync {
    /// Fetch the record for `label`, failing with
    /// [`Error::RecordNotFound`] when no row exists
    fn lookup(&self, label: &str) -> Result<PlantRecord>;

    /// All labels that have a record, sorted
    fn labels(&self) -> Result<Vec<String>>;

    /// Lookup that treats a missing row as [`PlantLookup::Unavailable`]
    fn resolve(&self, label: &str) -> Result<PlantLookup> {
        match self.lookup(label) {
            Ok(record) => Ok(PlantLookup::Found(record)),
            Err(Error::RecordNotFound(_)) => Ok(PlantLookup::Unavailable),
            Err(e) => Err(e),
        }
    }
}

/// SQLite-backed store opened read-only
pub struct SqlitePlantStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqlitePlantStore {
    /// Open an existing metadata database.
    ///
    /// A missing file or a database without the `plants` table is a
    /// configuration error; the server refuses to start on either.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::config(format!(
                "plant database {} does not exist (create it with `leafid init-db`)",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(db_error("open plant database"))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(db_error("set busy timeout"))?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM plants", [], |row| row.get(0))
            .map_err(|e| {
                Error::config(format!(
                    "{} is not a plant database ({}); run `leafid init-db`",
                    path.display(),
                    e
                ))
            })?;
        tracing::info!("Opened plant database {} with {} records", path.display(), count);

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PlantStore for SqlitePlantStore {
    fn lookup(&self, label: &str) -> Result<PlantRecord> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT label, scientific_name, uses, precautions FROM plants WHERE label = ?1",
            [label],
            |row| {
                Ok(PlantRecord {
                    label: row.get(0)?,
                    scientific_name: row.get(1)?,
                    uses: row.get(2)?,
                    precautions: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(db_error("lookup plant"))?
        .ok_or_else(|| Error::not_found(label))
    }

    fn labels(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT label FROM plants ORDER BY label")
            .map_err(db_error("prepare label query"))?;
        let labels = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_error("list labels"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_error("read label"))?;
        Ok(labels)
    }
}

/// In-memory store for tests and demos
#[derive(Debug, Clone, Default)]
pub struct MemoryPlantStore {
    records: HashMap<String, PlantRecord>,
}

impl MemoryPlantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = PlantRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Store holding the sample records written by `init-db`
    pub fn with_defaults() -> Self {
        Self::from_records(crate::admin::default_records())
    }

    pub fn with_record(mut self, record: PlantRecord) -> Self {
        self.insert(record);
        self
    }

    /// Insert or replace the record for its label
    pub fn insert(&mut self, record: PlantRecord) {
        self.records.insert(record.label.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PlantStore for MemoryPlantStore {
    fn lookup(&self, label: &str) -> Result<PlantRecord> {
        self.records
            .get(label)
            .cloned()
            .ok_or_else(|| Error::not_found(label))
    }

    fn labels(&self) -> Result<Vec<String>> {
        let mut labels: Vec<String> = self.records.keys().cloned().collect();
        labels.sort();
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::{initialize_database, seed_defaults};

    #[test]
    fn test_memory_lookup() {
        let store = MemoryPlantStore::with_defaults();
        let neem = store.lookup("Neem").unwrap();
        assert_eq!(neem.scientific_name, "Azadirachta indica");
        assert!(matches!(store.lookup("Mint"), Err(Error::RecordNotFound(_))));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let store = MemoryPlantStore::with_defaults();
        assert!(store.lookup("neem").is_err());
    }

    #[test]
    fn test_resolve_degrades_missing() {
        let store = MemoryPlantStore::with_defaults();
        assert!(matches!(store.resolve("Tulsi").unwrap(), PlantLookup::Found(_)));
        assert_eq!(store.resolve("Mint").unwrap(), PlantLookup::Unavailable);
    }

    #[test]
    fn test_sqlite_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf_info.db");
        initialize_database(&path).unwrap();
        seed_defaults(&path).unwrap();

        let store = SqlitePlantStore::open(&path).unwrap();
        let aloe = store.lookup("AloeVera").unwrap();
        assert_eq!(aloe.scientific_name, "Aloe vera");
        assert_eq!(aloe.precautions.as_deref(), Some("External use recommended."));
        assert_eq!(store.labels().unwrap(), vec!["AloeVera", "Neem", "Tulsi"]);
        assert!(matches!(store.lookup("Mint"), Err(Error::RecordNotFound(_))));
    }

    #[test]
    fn test_sqlite_lookup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf_info.db");
        initialize_database(&path).unwrap();
        seed_defaults(&path).unwrap();

        let store = SqlitePlantStore::open(&path).unwrap();
        assert_eq!(store.lookup("Neem").unwrap(), store.lookup("Neem").unwrap());
    }

    #[test]
    fn test_open_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let result = SqlitePlantStore::open(dir.path().join("absent.db"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_open_without_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE other (x INTEGER)")
            .unwrap();

        assert!(matches!(SqlitePlantStore::open(&path), Err(Error::Config(_))));
    }
}
