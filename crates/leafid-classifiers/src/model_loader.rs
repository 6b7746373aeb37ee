//! Artifact loading for Candle-based leaf classifiers
//!
//! The classifier is loaded once at startup. A missing weight or label file is
//! reported as [`Error::ArtifactMissing`]; a file that exists but cannot be
//! parsed, or whose tensors do not fit the network, as
//! [`Error::ArtifactCorrupt`]. Both are fatal for the server.

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::VarBuilder;
use leafid_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::classifier::{Classifier, DEFAULT_TOP_K};
use crate::ensemble::EnsembleClassifier;
use crate::labels::LabelMap;
use crate::mobilenet::{MobileNetV2, MobileNetV2Config};
use crate::preprocess::InputSpec;

/// Classifier configuration: one or more weight artifacts sharing a label
/// map and an input spec
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Weight artifacts; more than one forms an averaging ensemble
    #[serde(default = "default_artifacts")]
    pub artifacts: Vec<ArtifactSpec>,

    /// Label file (`class_indices.json` or a JSON list)
    #[serde(default = "default_labels_path")]
    pub labels: PathBuf,

    /// Network input size and normalization
    #[serde(default)]
    pub input: InputSpec,

    /// Device to run inference on (`cpu`, `cuda:0`, `metal:0`)
    #[serde(default)]
    pub device: DeviceType,

    /// Number of ranked alternatives to report
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_artifacts() -> Vec<ArtifactSpec> {
    vec![ArtifactSpec::local("models/mobilenet_v2.safetensors")]
}

fn default_labels_path() -> PathBuf {
    PathBuf::from("models/class_indices.json")
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifacts: default_artifacts(),
            labels: default_labels_path(),
            input: InputSpec::default(),
            device: DeviceType::Cpu,
            top_k: default_top_k(),
        }
    }
}

impl ModelConfig {
    /// Single local artifact with its label file
    pub fn from_local(weights: impl Into<PathBuf>, labels: impl Into<PathBuf>) -> Self {
        Self {
            artifacts: vec![ArtifactSpec::local(weights)],
            labels: labels.into(),
            ..Default::default()
        }
    }

    /// Add another ensemble member
    pub fn with_artifact(mut self, artifact: ArtifactSpec) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Set input spec
    pub fn with_input(mut self, input: InputSpec) -> Self {
        self.input = input;
        self
    }

    /// Set device
    pub fn with_device(mut self, device: DeviceType) -> Self {
        self.device = device;
        self
    }

    /// Set how many alternatives to report
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

/// One weight file and the network it parameterizes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Display name; defaults to the weight file stem
    #[serde(default)]
    pub name: Option<String>,

    /// Where to find the weights
    pub source: ModelSource,

    /// Weight format; inferred from the file extension when absent
    #[serde(default)]
    pub format: Option<ModelFormat>,

    #[serde(default)]
    pub architecture: ArchitectureConfig,
}

impl ArtifactSpec {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            name: None,
            source: ModelSource::Local { path: path.into() },
            format: None,
            architecture: ArchitectureConfig::default(),
        }
    }

    pub fn with_architecture(mut self, architecture: ArchitectureConfig) -> Self {
        self.architecture = architecture;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Source location for model weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelSource {
    /// Load from local file system
    Local { path: PathBuf },

    /// Download from Hugging Face Hub
    HuggingFace {
        repo: String,
        #[serde(default = "default_revision")]
        revision: String,
        filename: String,
    },
}

fn default_revision() -> String {
    "main".to_string()
}

/// Model file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// SafeTensors format (recommended)
    SafeTensors,
    /// PyTorch format
    PyTorch,
}

impl ModelFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("safetensors") => Some(Self::SafeTensors),
            Some("pt") | Some("pth") | Some("bin") => Some(Self::PyTorch),
            _ => None,
        }
    }
}

/// Network architecture of an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ArchitectureConfig {
    MobilenetV2 {
        #[serde(default = "default_width_multiplier")]
        width_multiplier: f64,
    },
}

fn default_width_multiplier() -> f64 {
    1.0
}

impl Default for ArchitectureConfig {
    fn default() -> Self {
        Self::MobilenetV2 {
            width_multiplier: default_width_multiplier(),
        }
    }
}

/// Device type for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceType {
    /// CPU inference (always available)
    #[default]
    Cpu,
    /// CUDA GPU inference (if available)
    Cuda(usize),
    /// Metal (Apple Silicon)
    Metal(usize),
}

impl DeviceType {
    /// Create Candle device from device type
    pub fn create(&self) -> Result<Device> {
        match self {
            Self::Cpu => Ok(Device::Cpu),
            Self::Cuda(idx) => Device::new_cuda(*idx)
                .map_err(|e| Error::config(format!("failed to create CUDA device {}: {}", idx, e))),
            Self::Metal(idx) => Device::new_metal(*idx)
                .map_err(|e| Error::config(format!("failed to create Metal device {}: {}", idx, e))),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(idx) => write!(f, "cuda:{}", idx),
            Self::Metal(idx) => write!(f, "metal:{}", idx),
        }
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (kind, index) = match s.split_once(':') {
            Some((kind, idx)) => {
                let idx = idx
                    .parse::<usize>()
                    .map_err(|_| format!("invalid device index in '{}'", s))?;
                (kind, idx)
            }
            None => (s, 0),
        };
        match kind.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(index)),
            "metal" | "mps" => Ok(Self::Metal(index)),
            _ => Err(format!("unknown device '{}'", s)),
        }
    }
}

impl TryFrom<String> for DeviceType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceType> for String {
    fn from(device: DeviceType) -> Self {
        device.to_string()
    }
}

/// Load the configured classifier (single network or ensemble)
pub fn load_classifier(config: &ModelConfig) -> Result<Arc<dyn Classifier>> {
    if config.artifacts.is_empty() {
        return Err(Error::config("no classifier artifacts configured"));
    }
    config.input.validate()?;

    let labels = Arc::new(LabelMap::from_file(&config.labels)?);
    let device = config.device.create()?;
    tracing::info!(
        "Loading {} artifact(s) with {} labels on {}",
        config.artifacts.len(),
        labels.len(),
        config.device
    );

    let mut members: Vec<Arc<dyn Classifier>> = Vec::with_capacity(config.artifacts.len());
    for artifact in &config.artifacts {
        let classifier = MobileNetClassifier::load(
            artifact,
            labels.clone(),
            config.input.clone(),
            &device,
            config.top_k,
        )?;
        tracing::info!("Loaded artifact '{}'", classifier.name());
        members.push(Arc::new(classifier));
    }

    if members.len() == 1 {
        return Ok(members.remove(0));
    }
    let ensemble = EnsembleClassifier::new(members)?.with_top_k(config.top_k);
    Ok(Arc::new(ensemble))
}

/// A MobileNetV2 with its label map, ready for inference
pub struct MobileNetClassifier {
    name: String,
    model: MobileNetV2,
    labels: Arc<LabelMap>,
    input: InputSpec,
    device: Device,
    top_k: usize,
    weights_path: PathBuf,
}

impl MobileNetClassifier {
    /// Resolve, read and build one artifact
    pub fn load(
        artifact: &ArtifactSpec,
        labels: Arc<LabelMap>,
        input: InputSpec,
        device: &Device,
        top_k: usize,
    ) -> Result<Self> {
        let weights_path = resolve_model_path(&artifact.source)?;
        let format = artifact
            .format
            .or_else(|| ModelFormat::from_path(&weights_path))
            .unwrap_or(ModelFormat::SafeTensors);

        let vb = load_weights(&weights_path, format, device)?;
        let ArchitectureConfig::MobilenetV2 { width_multiplier } = artifact.architecture;
        let network_config =
            MobileNetV2Config::new(labels.len()).with_width_multiplier(width_multiplier);
        let model = MobileNetV2::new(&network_config, vb).map_err(|e| {
            Error::artifact_corrupt(format!(
                "{} does not match a {}-class MobileNetV2 (width {}): {}",
                weights_path.display(),
                labels.len(),
                width_multiplier,
                e
            ))
        })?;

        let name = artifact.name.clone().unwrap_or_else(|| {
            weights_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("mobilenet_v2")
                .to_string()
        });

        Ok(Self::from_parts(name, model, labels, input, device.clone())
            .with_top_k(top_k)
            .with_weights_path(weights_path))
    }

    /// Wrap an already-built network
    pub fn from_parts(
        name: impl Into<String>,
        model: MobileNetV2,
        labels: Arc<LabelMap>,
        input: InputSpec,
        device: Device,
    ) -> Self {
        Self {
            name: name.into(),
            model,
            labels,
            input,
            device,
            top_k: DEFAULT_TOP_K,
            weights_path: PathBuf::new(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    fn with_weights_path(mut self, path: PathBuf) -> Self {
        self.weights_path = path;
        self
    }

    /// Get weights path
    pub fn weights_path(&self) -> &Path {
        &self.weights_path
    }
}

impl Classifier for MobileNetClassifier {
    fn probabilities(&self, input: &Tensor) -> Result<Vec<f32>> {
        let (batch, channels, _, _) = input
            .dims4()
            .map_err(|e| Error::internal(format!("unexpected input shape: {}", e)))?;
        if batch != 1 || channels != 3 {
            return Err(Error::internal(format!(
                "expected a [1, 3, H, W] input, got {:?}",
                input.dims()
            )));
        }

        let run = || -> candle_core::Result<Vec<f32>> {
            let input = input.to_device(&self.device)?.to_dtype(DType::F32)?;
            let logits = self.model.forward(&input)?;
            candle_nn::ops::softmax_last_dim(&logits)?
                .squeeze(0)?
                .to_vec1::<f32>()
        };
        run().map_err(|e| Error::internal(format!("forward pass failed: {}", e)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }

    fn input_spec(&self) -> &InputSpec {
        &self.input
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn top_k(&self) -> usize {
        self.top_k
    }
}

/// Resolve model path from source
fn resolve_model_path(source: &ModelSource) -> Result<PathBuf> {
    match source {
        ModelSource::Local { path } => {
            if !path.is_file() {
                return Err(Error::ArtifactMissing(path.clone()));
            }
            Ok(path.clone())
        }
        ModelSource::HuggingFace {
            repo,
            revision,
            filename,
        } => download_from_huggingface(repo, revision, filename),
    }
}

/// Fetch an artifact from the Hugging Face Hub cache, downloading it if needed
#[cfg(feature = "hf-hub")]
fn download_from_huggingface(repo: &str, revision: &str, filename: &str) -> Result<PathBuf> {
    use hf_hub::{api::sync::Api, Repo, RepoType};

    tracing::info!("Fetching {} from Hugging Face: {} @ {}", filename, repo, revision);
    let remote = PathBuf::from(format!("hf://{}@{}/{}", repo, revision, filename));

    let api = Api::new()
        .map_err(|e| Error::config(format!("failed to initialize Hugging Face API: {}", e)))?;
    let repo = api.repo(Repo::with_revision(
        repo.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    repo.get(filename).map_err(|e| {
        tracing::error!("Download of {} failed: {}", remote.display(), e);
        Error::ArtifactMissing(remote)
    })
}

#[cfg(not(feature = "hf-hub"))]
fn download_from_huggingface(repo: &str, revision: &str, filename: &str) -> Result<PathBuf> {
    Err(Error::config(format!(
        "cannot fetch hf://{}@{}/{}: built without the 'hf-hub' feature",
        repo, revision, filename
    )))
}

/// Read weights into a VarBuilder
fn load_weights(path: &Path, format: ModelFormat, device: &Device) -> Result<VarBuilder<'static>> {
    tracing::debug!("Reading {:?} weights from {}", format, path.display());
    match format {
        ModelFormat::SafeTensors => {
            let tensors = candle_core::safetensors::load(path, device).map_err(|e| {
                Error::artifact_corrupt(format!("failed to load SafeTensors {}: {}", path.display(), e))
            })?;
            Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
        }
        ModelFormat::PyTorch => VarBuilder::from_pth(path, DType::F32, device).map_err(|e| {
            Error::artifact_corrupt(format!(
                "failed to load PyTorch weights {}: {}",
                path.display(),
                e
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_yaml() {
        let yaml = r#"
artifacts:
  - name: "leaf-mobilenet"
    source:
      type: local
      path: "models/leaf.safetensors"
    architecture:
      type: mobilenet-v2
      width_multiplier: 0.75
  - source:
      type: huggingface
      repo: "example/leaf-mobilenet"
      filename: "model.safetensors"
labels: "models/class_indices.json"
input:
  width: 224
  height: 224
  normalization: symmetric
device: "cuda:1"
"#;
        let config: ModelConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.artifacts.len(), 2);
        assert_eq!(
            config.artifacts[0].architecture,
            ArchitectureConfig::MobilenetV2 {
                width_multiplier: 0.75
            }
        );
        if let ModelSource::HuggingFace { repo, revision, .. } = &config.artifacts[1].source {
            assert_eq!(repo, "example/leaf-mobilenet");
            assert_eq!(revision, "main");
        } else {
            panic!("Expected HuggingFace source");
        }
        assert_eq!(config.device, DeviceType::Cuda(1));
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert_eq!(config.input.normalization, crate::Normalization::Symmetric);
    }

    #[test]
    fn test_device_parsing() {
        assert_eq!("cpu".parse::<DeviceType>().unwrap(), DeviceType::Cpu);
        assert_eq!("cuda".parse::<DeviceType>().unwrap(), DeviceType::Cuda(0));
        assert_eq!("metal:2".parse::<DeviceType>().unwrap(), DeviceType::Metal(2));
        assert!("tpu".parse::<DeviceType>().is_err());
        assert!("cuda:x".parse::<DeviceType>().is_err());
        assert_eq!(DeviceType::Cuda(3).to_string(), "cuda:3");
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ModelFormat::from_path(Path::new("m.safetensors")),
            Some(ModelFormat::SafeTensors)
        );
        assert_eq!(ModelFormat::from_path(Path::new("m.pth")), Some(ModelFormat::PyTorch));
        assert_eq!(ModelFormat::from_path(Path::new("m.h5")), None);
    }

    #[test]
    fn test_missing_weights() {
        let dir = tempfile::tempdir().unwrap();
        let labels = dir.path().join("labels.json");
        std::fs::write(&labels, r#"["Neem", "Tulsi"]"#).unwrap();

        let config = ModelConfig::from_local(dir.path().join("absent.safetensors"), &labels);
        match load_classifier(&config) {
            Err(Error::ArtifactMissing(path)) => assert!(path.ends_with("absent.safetensors")),
            other => panic!("expected ArtifactMissing, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_garbage_weights() {
        let dir = tempfile::tempdir().unwrap();
        let labels = dir.path().join("labels.json");
        let weights = dir.path().join("leaf.safetensors");
        std::fs::write(&labels, r#"["Neem", "Tulsi"]"#).unwrap();
        std::fs::write(&weights, b"this is not a tensor file").unwrap();

        let config = ModelConfig::from_local(&weights, &labels);
        assert!(matches!(load_classifier(&config), Err(Error::ArtifactCorrupt(_))));
    }

    #[test]
    fn test_no_artifacts() {
        let config = ModelConfig {
            artifacts: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(load_classifier(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_input_size_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let labels = dir.path().join("labels.json");
        let weights = dir.path().join("leaf.safetensors");
        std::fs::write(&labels, r#"["Neem", "Tulsi"]"#).unwrap();
        std::fs::write(&weights, b"this is not a tensor file").unwrap();

        let config = ModelConfig::from_local(&weights, &labels).with_input(InputSpec {
            width: 0,
            ..InputSpec::default()
        });
        assert!(matches!(load_classifier(&config), Err(Error::Config(_))));
    }
}
