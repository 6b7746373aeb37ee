//! Class index to species label mapping

use leafid_core::{Error, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Ordered species labels; position `i` names class `i`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    labels: Vec<String>,
}

/// Accepted label file layouts
#[derive(Deserialize)]
#[serde(untagged)]
enum LabelFile {
    /// Keras `class_indices.json`: `{"Neem": 0, "Tulsi": 1}`
    Indices(HashMap<String, usize>),
    /// Plain list: `["Neem", "Tulsi"]`
    List(Vec<String>),
}

impl LabelMap {
    /// Build a label map from labels in class order
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::artifact_corrupt("label map is empty"));
        }

        let mut seen = HashSet::with_capacity(labels.len());
        for label in &labels {
            if label.trim().is_empty() {
                return Err(Error::artifact_corrupt("label map contains an empty label"));
            }
            if !seen.insert(label.as_str()) {
                return Err(Error::artifact_corrupt(format!("duplicate label '{}'", label)));
            }
        }

        Ok(Self { labels })
    }

    /// Build a label map from a `label -> index` table.
    ///
    /// Indices must cover `0..n` exactly once.
    pub fn from_indices(indices: HashMap<String, usize>) -> Result<Self> {
        let mut slots: Vec<Option<String>> = vec![None; indices.len()];
        for (label, idx) in indices {
            let slot = slots.get_mut(idx).ok_or_else(|| {
                Error::artifact_corrupt(format!("class index {} for '{}' is out of range", idx, label))
            })?;
            if slot.is_some() {
                return Err(Error::artifact_corrupt(format!("class index {} assigned twice", idx)));
            }
            *slot = Some(label);
        }

        // Every slot is filled: n distinct in-range indices over n slots
        Self::new(slots.into_iter().flatten().collect())
    }

    /// Parse a JSON label file body
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: LabelFile = serde_json::from_str(json)
            .map_err(|e| Error::artifact_corrupt(format!("invalid label file: {}", e)))?;
        match file {
            LabelFile::Indices(indices) => Self::from_indices(indices),
            LabelFile::List(labels) => Self::new(labels),
        }
    }

    /// Load a label file from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ArtifactMissing(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::artifact_corrupt(format!("failed to read {}: {}", path.display(), e))
        })?;
        let labels = Self::from_json_str(&contents)?;
        tracing::debug!("Loaded {} labels from {}", labels.len(), path.display());
        Ok(labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(String::as_str)
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keras_class_indices() {
        let labels = LabelMap::from_json_str(r#"{"Tulsi": 2, "AloeVera": 0, "Neem": 1}"#).unwrap();
        assert_eq!(labels.as_slice(), &["AloeVera", "Neem", "Tulsi"]);
        assert_eq!(labels.position("Neem"), Some(1));
    }

    #[test]
    fn test_label_list() {
        let labels = LabelMap::from_json_str(r#"["Neem", "Tulsi"]"#).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get(1), Some("Tulsi"));
        assert_eq!(labels.get(2), None);
    }

    #[test]
    fn test_gap_in_indices_rejected() {
        let err = LabelMap::from_json_str(r#"{"Neem": 0, "Tulsi": 2}"#).unwrap_err();
        assert!(matches!(err, Error::ArtifactCorrupt(_)));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        assert!(LabelMap::from_json_str(r#"["Neem", "Neem"]"#).is_err());
        assert!(LabelMap::from_json_str(r#"{"Neem": 0, "Tulsi": 0}"#).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = LabelMap::from_file("/nonexistent/class_indices.json").unwrap_err();
        assert!(matches!(err, Error::ArtifactMissing(_)));
    }

    #[test]
    fn test_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("class_indices.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(LabelMap::from_file(&path), Err(Error::ArtifactCorrupt(_))));
    }
}
