//! LeafID Classifiers
//!
//! Image classification for medicinal leaf identification.
//!
//! The classifier artifact is loaded exactly once at process start and shared
//! read-only between requests:
//! - [`model_loader`] resolves weight files (local or Hugging Face Hub) and
//!   builds a [`mobilenet::MobileNetV2`] per artifact
//! - [`preprocess`] turns uploaded bytes into the fixed-size input tensor
//! - [`segment`] optionally crops a photo down to the leaf before inference
//! - [`ensemble`] averages several artifacts that share one label map
//!
//! All inference runs on CPU by default; CUDA and Metal devices are
//! selectable per configuration.

pub mod classifier;
pub mod ensemble;
pub mod labels;
pub mod mobilenet;
pub mod model_loader;
pub mod preprocess;
pub mod segment;

pub use classifier::{Classifier, DEFAULT_TOP_K};
pub use ensemble::EnsembleClassifier;
pub use labels::LabelMap;
pub use mobilenet::{MobileNetV2, MobileNetV2Config};
pub use model_loader::{
    load_classifier, ArchitectureConfig, ArtifactSpec, DeviceType, MobileNetClassifier,
    ModelConfig, ModelFormat, ModelSource,
};
pub use preprocess::{decode_data_url, decode_image, to_tensor, DecodeLimits, InputSpec, Normalization};
pub use segment::crop_to_leaf;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::Classifier;
    pub use crate::labels::LabelMap;
    pub use crate::model_loader::{load_classifier, ModelConfig};
    pub use crate::preprocess::{decode_image, to_tensor, DecodeLimits, InputSpec};
}
