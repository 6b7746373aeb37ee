//! Inference request handling
//!
//! One request is one independent pass: validate → decode → (crop) →
//! classify → look up → (save, record). Only validation, decoding and the
//! forward pass can fail the request; the metadata lookup degrades to
//! "details unavailable" and persistence is best-effort.

use chrono::Utc;
use leafid_classifiers::{crop_to_leaf, decode_image, Classifier};
use leafid_core::{
    CaptureSource, Error, Identification, NewHistoryEntry, PlantLookup, Prediction, Result,
};
use leafid_store::PlantStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::state::{AppState, RequestSettings};
use crate::uploads;

/// Raw image received from a client
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,

    /// Client-side file name of a form upload
    pub filename: Option<String>,

    pub source: CaptureSource,
}

impl ImagePayload {
    pub fn upload(bytes: Vec<u8>, filename: Option<String>, source: CaptureSource) -> Self {
        Self {
            bytes,
            filename,
            source,
        }
    }

    /// Frame captured from a webcam (no file name)
    pub fn webcam(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            filename: None,
            source: CaptureSource::Webcam,
        }
    }
}

/// Reject payloads before any decoding work
pub fn validate(payload: &ImagePayload, settings: &RequestSettings) -> Result<()> {
    if payload.bytes.is_empty() {
        return Err(Error::invalid_image("empty upload"));
    }
    if payload.bytes.len() > settings.decode.max_bytes {
        return Err(Error::invalid_image(format!(
            "upload of {} bytes exceeds the {} byte limit",
            payload.bytes.len(),
            settings.decode.max_bytes
        )));
    }
    if let Some(name) = &payload.filename {
        if !uploads::extension_allowed(name, &settings.allowed_extensions) {
            return Err(Error::invalid_image(format!(
                "unsupported file type; expected one of: {}",
                settings.allowed_extensions.join(", ")
            )));
        }
    }
    Ok(())
}

/// Decode and classify on the calling thread
pub fn classify(
    classifier: &dyn Classifier,
    bytes: &[u8],
    settings: &RequestSettings,
) -> Result<Prediction> {
    let image = decode_image(bytes, &settings.decode)?;
    let image = if settings.crop_to_leaf {
        crop_to_leaf(&image).unwrap_or(image)
    } else {
        image
    };
    classifier.predict_image(&image)
}

/// Identify the plant in an uploaded image
pub async fn identify(state: &AppState, payload: ImagePayload) -> Result<Identification> {
    let start = Instant::now();
    metrics::counter!("leafid_requests_total", "source" => payload.source.as_str()).increment(1);

    validate(&payload, &state.settings)?;

    let classifier = Arc::clone(&state.classifier);
    let settings = Arc::clone(&state.settings);
    let ImagePayload {
        bytes,
        filename,
        source,
    } = payload;

    let (prediction, bytes) = tokio::task::spawn_blocking(move || {
        classify(classifier.as_ref(), &bytes, &settings).map(|p| (p, bytes))
    })
    .await
    .map_err(|e| Error::internal(format!("inference task failed: {}", e)))??;

    debug!(
        "Predicted {} ({:.3}) in {}us",
        prediction.label, prediction.confidence, prediction.latency_us
    );
    metrics::histogram!("leafid_inference_latency_us").record(prediction.latency_us as f64);
    metrics::counter!("leafid_predictions_total", "label" => prediction.label.clone())
        .increment(1);

    let plant = lookup(Arc::clone(&state.plants), prediction.label.clone()).await;

    let saved_as = match &state.settings.upload_dir {
        Some(dir) => {
            let name = uploads::storage_name(filename.as_deref(), source, &bytes, Utc::now());
            match uploads::save(dir, &name, &bytes).await {
                Ok(()) => Some(name),
                Err(e) => {
                    warn!("Failed to save upload {}: {}", name, e);
                    None
                }
            }
        }
        None => None,
    };

    if let Some(history) = &state.history {
        record_history(Arc::clone(history), &prediction, saved_as.clone(), source).await;
    }

    info!(
        label = %prediction.label,
        confidence = prediction.confidence,
        source = source.as_str(),
        "Identified image in {}ms",
        start.elapsed().as_millis()
    );

    Ok(Identification {
        prediction,
        plant,
        saved_as,
    })
}

/// Metadata lookup that never fails the request
async fn lookup(plants: Arc<dyn PlantStore>, label: String) -> PlantLookup {
    let outcome = match tokio::task::spawn_blocking(move || {
        let result = plants.resolve(&label);
        (label, result)
    })
    .await
    {
        Ok((_, Ok(lookup))) => lookup,
        Ok((label, Err(e))) => {
            error!("Plant lookup for '{}' failed: {}", label, e);
            PlantLookup::Unavailable
        }
        Err(e) => {
            error!("Plant lookup task failed: {}", e);
            PlantLookup::Unavailable
        }
    };
    let status = match outcome {
        PlantLookup::Found(_) => "found",
        PlantLookup::Unavailable => "unavailable",
    };
    metrics::counter!("leafid_lookups_total", "status" => status).increment(1);
    outcome
}

async fn record_history(
    history: Arc<leafid_store::HistoryStore>,
    prediction: &Prediction,
    filename: Option<String>,
    source: CaptureSource,
) {
    let entry = NewHistoryEntry {
        filename,
        label: prediction.label.clone(),
        confidence: prediction.confidence,
        source,
        created_at: Utc::now(),
    };
    match tokio::task::spawn_blocking(move || history.record(&entry)).await {
        Ok(Ok(id)) => debug!("Recorded history row {}", id),
        Ok(Err(e)) => warn!("Failed to record history: {}", e),
        Err(e) => warn!("History task failed: {}", e),
    }
}
