use anyhow::Context;
use leafid_classifiers::{load_classifier, Classifier, DecodeLimits, LabelMap};
use leafid_store::{missing_labels, HistoryStore, PlantStore, SqlitePlantStore};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{ServerConfig, UploadConfig};

/// Per-request settings derived from the configuration
#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub decode: DecodeLimits,
    pub allowed_extensions: Vec<String>,
    pub crop_to_leaf: bool,

    /// Where accepted images are kept; `None` disables saving
    pub upload_dir: Option<PathBuf>,

    /// Rows shown on the history page
    pub history_page_size: usize,
}

impl RequestSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            decode: config.uploads.decode_limits(),
            allowed_extensions: config.uploads.allowed_extensions.clone(),
            crop_to_leaf: config.crop_to_leaf,
            upload_dir: config.uploads.save.then(|| config.uploads.dir.clone()),
            history_page_size: config.history.page_size,
        }
    }
}

impl Default for RequestSettings {
    fn default() -> Self {
        let uploads = UploadConfig::default();
        Self {
            decode: uploads.decode_limits(),
            allowed_extensions: uploads.allowed_extensions,
            crop_to_leaf: false,
            upload_dir: None,
            history_page_size: 50,
        }
    }
}

/// Shared application state.
///
/// The classifier and the plant store are loaded once and shared read-only
/// by every request.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<dyn Classifier>,
    pub plants: Arc<dyn PlantStore>,

    /// Prediction history; `None` when disabled
    pub history: Option<Arc<HistoryStore>>,

    pub settings: Arc<RequestSettings>,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(classifier: Arc<dyn Classifier>, plants: Arc<dyn PlantStore>) -> Self {
        Self {
            classifier,
            plants,
            history: None,
            settings: Arc::new(RequestSettings::default()),
            metrics_handle: None,
        }
    }

    pub fn with_history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_settings(mut self, settings: RequestSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn with_metrics_handle(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Load every artifact named by the configuration.
    ///
    /// Fails on a missing or corrupt classifier artifact and on a missing
    /// plant database, before any listener is bound. History is optional:
    /// if its database cannot be opened it is disabled with a warning.
    pub fn from_config(
        config: &ServerConfig,
        metrics_handle: Option<PrometheusHandle>,
    ) -> anyhow::Result<Self> {
        info!("Initializing application state");

        let classifier = load_classifier(&config.model).context("Failed to load classifier")?;
        info!(
            "Classifier '{}' ready with {} labels",
            classifier.name(),
            classifier.labels().len()
        );

        let plants = SqlitePlantStore::open(&config.database)
            .context("Failed to open plant database")?;
        report_label_coverage(&plants, classifier.labels());

        let history = if config.history.enabled {
            match HistoryStore::open(&config.history.path) {
                Ok(history) => Some(Arc::new(history)),
                Err(e) => {
                    warn!("Prediction history disabled: {}", e);
                    None
                }
            }
        } else {
            info!("Prediction history disabled by configuration");
            None
        };

        let settings = RequestSettings::from_config(config);
        if let Some(dir) = &settings.upload_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create upload directory {}", dir.display()))?;
            info!("Saving uploads to {}", dir.display());
        }
        if settings.crop_to_leaf {
            info!("Leaf cropping enabled");
        }

        Ok(Self {
            classifier,
            plants: Arc::new(plants),
            history,
            settings: Arc::new(settings),
            metrics_handle,
        })
    }
}

/// Warn about classifier labels the database cannot describe
fn report_label_coverage(store: &dyn PlantStore, labels: &LabelMap) {
    match missing_labels(store, labels.iter()) {
        Ok(missing) if missing.is_empty() => {
            info!("Every classifier label has a plant record");
        }
        Ok(missing) => {
            warn!(
                "{} classifier label(s) have no plant record and will show as unavailable: {}",
                missing.len(),
                missing.join(", ")
            );
        }
        Err(e) => warn!("Could not check label coverage: {}", e),
    }
}
