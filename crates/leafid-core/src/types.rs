//! Domain types shared by the classifier, the store and the server

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Metadata row for one plant species, keyed by the classifier label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantRecord {
    /// Species label as emitted by the classifier
    pub label: String,

    /// Botanical name
    pub scientific_name: String,

    /// Medicinal uses
    pub uses: String,

    /// Usage precautions, if any are known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precautions: Option<String>,
}

impl PlantRecord {
    pub fn new(
        label: impl Into<String>,
        scientific_name: impl Into<String>,
        uses: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            scientific_name: scientific_name.into(),
            uses: uses.into(),
            precautions: None,
        }
    }

    pub fn with_precautions(mut self, precautions: impl Into<String>) -> Self {
        self.precautions = Some(precautions.into());
        self
    }
}

/// A label with its class probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredLabel {
    pub label: String,
    pub score: f32,
}

/// Result of one forward pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted label (argmax)
    pub label: String,

    /// Index of the predicted class
    pub class_index: usize,

    /// Probability of the predicted class (0.0-1.0)
    pub confidence: f32,

    /// Best alternatives, highest first (includes the prediction itself)
    pub top_k: Vec<ScoredLabel>,

    /// Forward pass latency in microseconds
    pub latency_us: u64,
}

impl Prediction {
    /// Build a prediction from a probability vector.
    ///
    /// `labels[i]` names class `i`; classes past the end of `labels` are named
    /// by their index. Fails only when `probabilities` is empty.
    pub fn from_probabilities(probabilities: &[f32], labels: &[String], top_k: usize) -> Result<Self> {
        let name = |idx: usize| {
            labels
                .get(idx)
                .cloned()
                .unwrap_or_else(|| idx.to_string())
        };

        let mut ranked: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let &(class_index, confidence) = ranked
            .first()
            .ok_or_else(|| Error::internal("classifier produced no class scores"))?;

        let top_k = ranked
            .iter()
            .take(top_k.max(1))
            .map(|&(idx, score)| ScoredLabel {
                label: name(idx),
                score,
            })
            .collect();

        Ok(Self {
            label: name(class_index),
            class_index,
            confidence: confidence.clamp(0.0, 1.0),
            top_k,
            latency_us: 0,
        })
    }

    pub fn with_latency_us(mut self, latency_us: u64) -> Self {
        self.latency_us = latency_us;
        self
    }

    /// Confidence as a percentage, for display
    pub fn confidence_percent(&self) -> f32 {
        self.confidence * 100.0
    }
}

/// Outcome of the metadata lookup for a predicted label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "record", rename_all = "snake_case")]
pub enum PlantLookup {
    Found(PlantRecord),
    /// Species recognized, but no metadata row exists for it
    Unavailable,
}

impl PlantLookup {
    pub fn record(&self) -> Option<&PlantRecord> {
        match self {
            Self::Found(record) => Some(record),
            Self::Unavailable => None,
        }
    }
}

/// Combined result of the inference-and-lookup pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identification {
    pub prediction: Prediction,
    pub plant: PlantLookup,

    /// File name of the saved upload, when uploads are kept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_as: Option<String>,
}

/// Where an image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    /// Browser form upload
    Upload,
    /// Base64 frame captured from a webcam
    Webcam,
    /// Programmatic multipart upload
    Api,
}

impl CaptureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Webcam => "webcam",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CaptureSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "upload" => Ok(Self::Upload),
            "webcam" => Ok(Self::Webcam),
            "api" => Ok(Self::Api),
            other => Err(format!("unknown capture source: {other}")),
        }
    }
}

/// History row to append
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub filename: Option<String>,
    pub label: String,
    pub confidence: f32,
    pub source: CaptureSource,
    pub created_at: DateTime<Utc>,
}

/// Stored history row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub filename: Option<String>,
    pub label: String,
    pub confidence: f32,
    pub source: CaptureSource,
    pub created_at: DateTime<Utc>,
}
