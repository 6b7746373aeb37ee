//! End-to-end tests of the offline database workflow:
//! init-db, seed, import, then read-only serving lookups.

use leafid_core::Error;
use leafid_store::{
    import_records, initialize_database, load_records, missing_labels, seed_defaults, PlantStore,
    SqlitePlantStore,
};
use std::path::Path;

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_import_yaml_upserts() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("leaf_info.db");
    initialize_database(&db).unwrap();
    seed_defaults(&db).unwrap();

    let file = write(
        dir.path(),
        "plants.yaml",
        r#"
- label: Neem
  scientific_name: Azadirachta indica
  uses: Antifungal, dental care
- label: Mint
  scientific_name: Mentha
  uses: Digestion, nausea relief
  precautions: May worsen acid reflux.
"#,
    );
    assert_eq!(import_records(&db, &file).unwrap(), 2);

    let store = SqlitePlantStore::open(&db).unwrap();
    let neem = store.lookup("Neem").unwrap();
    assert_eq!(neem.uses, "Antifungal, dental care");
    assert_eq!(neem.precautions, None);

    let mint = store.lookup("Mint").unwrap();
    assert_eq!(mint.scientific_name, "Mentha");
    assert_eq!(mint.precautions.as_deref(), Some("May worsen acid reflux."));

    assert_eq!(store.labels().unwrap().len(), 4);
}

#[test]
fn test_import_json_into_fresh_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("fresh.db");
    let file = write(
        dir.path(),
        "plants.json",
        r#"{"plants": [{"label": "Curry", "scientific_name": "Murraya koenigii", "uses": "Digestion"}]}"#,
    );

    assert_eq!(import_records(&db, &file).unwrap(), 1);
    let store = SqlitePlantStore::open(&db).unwrap();
    assert_eq!(store.lookup("Curry").unwrap().scientific_name, "Murraya koenigii");
}

#[test]
fn test_import_rejects_incomplete_records() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "bad.yaml",
        "- label: Mint\n  scientific_name: ''\n  uses: Digestion\n",
    );
    assert!(matches!(load_records(&file), Err(Error::Config(_))));
}

#[test]
fn test_import_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = import_records(dir.path().join("db.sqlite"), dir.path().join("absent.yaml"));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_label_coverage_against_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("leaf_info.db");
    initialize_database(&db).unwrap();
    seed_defaults(&db).unwrap();

    let store = SqlitePlantStore::open(&db).unwrap();
    let labels = ["AloeVera", "Neem", "Tulsi"];
    assert!(missing_labels(&store, labels).unwrap().is_empty());

    let labels = ["AloeVera", "Hibiscus"];
    assert_eq!(missing_labels(&store, labels).unwrap(), vec!["Hibiscus"]);
}

#[test]
fn test_read_only_store_sees_later_imports() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("leaf_info.db");
    initialize_database(&db).unwrap();

    let store = SqlitePlantStore::open(&db).unwrap();
    assert!(store.lookup("Neem").is_err());

    seed_defaults(&db).unwrap();
    assert!(store.lookup("Neem").is_ok());
}
