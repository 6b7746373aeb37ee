//! Offline database administration
//!
//! Nothing here runs on the serving path. The `leafid init-db`, `leafid
//! import` and `leafid check-labels` commands call into this module.

use leafid_core::{Error, PlantRecord, Result};
use rusqlite::{params, Connection};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::db_error;
use crate::plant_store::PlantStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS plants (
    label TEXT PRIMARY KEY,
    scientific_name TEXT NOT NULL,
    uses TEXT NOT NULL,
    precautions TEXT
)";

const INSERT_IGNORE: &str = "
INSERT OR IGNORE INTO plants (label, scientific_name, uses, precautions)
VALUES (?1, ?2, ?3, ?4)";

const UPSERT: &str = "
INSERT INTO plants (label, scientific_name, uses, precautions)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(label) DO UPDATE SET
    scientific_name = excluded.scientific_name,
    uses = excluded.uses,
    precautions = excluded.precautions";

/// Sample records shipped with a fresh database
pub fn default_records() -> Vec<PlantRecord> {
    vec![
        PlantRecord::new(
            "Neem",
            "Azadirachta indica",
            "Antibacterial, skin healing, anti-inflammatory",
        )
        .with_precautions("Avoid ingestion in large amounts."),
        PlantRecord::new(
            "Tulsi",
            "Ocimum tenuiflorum",
            "Immunity booster, respiratory support",
        )
        .with_precautions("Use moderate amounts in pregnancy."),
        PlantRecord::new("AloeVera", "Aloe vera", "Skin hydration, wound healing")
            .with_precautions("External use recommended."),
    ]
}

fn open_writable(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Connection::open(path).map_err(db_error("open plant database for writing"))
}

/// Create the `plants` table if it does not exist
pub fn initialize_database(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let conn = open_writable(path)?;
    conn.execute_batch(SCHEMA)
        .map_err(db_error("create plants table"))?;
    tracing::info!("Initialized plant database at {}", path.display());
    Ok(())
}

/// Insert the sample records, leaving existing labels untouched.
///
/// Returns the number of rows actually inserted.
pub fn seed_defaults(path: impl AsRef<Path>) -> Result<usize> {
    let mut conn = open_writable(path.as_ref())?;
    let inserted = write_records(&mut conn, &default_records(), INSERT_IGNORE)?;
    tracing::info!("Seeded {} sample record(s)", inserted);
    Ok(inserted)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    List(Vec<PlantRecord>),
    Wrapped { plants: Vec<PlantRecord> },
}

/// Parse a YAML or JSON record file.
///
/// Accepts either a bare list of records or a `plants:` key holding one.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<PlantRecord>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let parsed: RecordFile = if is_json {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)
            .map_err(|e| Error::config(format!("invalid record file {}: {}", path.display(), e)))?
    };

    let records = match parsed {
        RecordFile::List(records) | RecordFile::Wrapped { plants: records } => records,
    };
    for record in &records {
        validate(record)?;
    }
    Ok(records)
}

fn validate(record: &PlantRecord) -> Result<()> {
    if record.label.trim().is_empty() {
        return Err(Error::config("record with an empty label"));
    }
    if record.scientific_name.trim().is_empty() {
        return Err(Error::config(format!(
            "record '{}' has no scientific name",
            record.label
        )));
    }
    Ok(())
}

/// Upsert every record of a YAML/JSON file into the database.
///
/// The schema is created first if needed. Returns the number of records
/// written.
pub fn import_records(database: impl AsRef<Path>, file: impl AsRef<Path>) -> Result<usize> {
    let records = load_records(file.as_ref())?;
    let mut conn = open_writable(database.as_ref())?;
    conn.execute_batch(SCHEMA)
        .map_err(db_error("create plants table"))?;

    let written = write_records(&mut conn, &records, UPSERT)?;
    tracing::info!(
        "Imported {} record(s) from {} into {}",
        written,
        file.as_ref().display(),
        database.as_ref().display()
    );
    Ok(written)
}

fn write_records(conn: &mut Connection, records: &[PlantRecord], sql: &str) -> Result<usize> {
    let tx = conn
        .transaction()
        .map_err(db_error("start transaction"))?;
    let mut written = 0;
    {
        let mut stmt = tx.prepare(sql).map_err(db_error("prepare insert"))?;
        for record in records {
            written += stmt
                .execute(params![
                    record.label,
                    record.scientific_name,
                    record.uses,
                    record.precautions
                ])
                .map_err(db_error("write plant record"))?;
        }
    }
    tx.commit().map_err(db_error("commit records"))?;
    Ok(written)
}

/// Classifier labels that have no metadata record, in classifier order
pub fn missing_labels<'a, S, I>(store: &S, labels: I) -> Result<Vec<String>>
where
    S: PlantStore + ?Sized,
    I: IntoIterator<Item = &'a str>,
{
    let known: HashSet<String> = store.labels()?.into_iter().collect();
    Ok(labels
        .into_iter()
        .filter(|label| !known.contains(*label))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plant_store::{MemoryPlantStore, SqlitePlantStore};

    #[test]
    fn test_seed_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf_info.db");
        initialize_database(&path).unwrap();

        assert_eq!(seed_defaults(&path).unwrap(), 3);
        assert_eq!(seed_defaults(&path).unwrap(), 0);

        let store = SqlitePlantStore::open(&path).unwrap();
        assert_eq!(store.labels().unwrap().len(), 3);
    }

    #[test]
    fn test_initialize_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database").join("leaf_info.db");
        initialize_database(&path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_missing_labels() {
        let store = MemoryPlantStore::with_defaults();
        let missing = missing_labels(&store, ["Neem", "Mint", "Tulsi", "Curry"]).unwrap();
        assert_eq!(missing, vec!["Mint", "Curry"]);
    }

    #[test]
    fn test_validate_rejects_blank_label() {
        let record = PlantRecord::new("  ", "Mentha", "Digestion");
        assert!(validate(&record).is_err());
    }
}
