//! Classifier trait

use candle_core::{Device, Tensor};
use image::DynamicImage;
use leafid_core::{Prediction, Result};
use std::time::Instant;

use crate::labels::LabelMap;
use crate::preprocess::{to_tensor, InputSpec};

/// Number of ranked alternatives reported with each prediction
pub const DEFAULT_TOP_K: usize = 3;

/// Trait for all image classifiers.
///
/// Implementations hold immutable weights and are shared across request
/// threads; `predict` is a pure function of its input.
pub trait Classifier: Send + Sync {
    /// Class probabilities for a `[1, 3, H, W]` input tensor, indexed like
    /// [`Classifier::labels`]
    fn probabilities(&self, input: &Tensor) -> Result<Vec<f32>>;

    /// Get the classifier name
    fn name(&self) -> &str;

    /// Label map for the classifier head
    fn labels(&self) -> &LabelMap;

    /// Fixed input size and normalization expected by the network
    fn input_spec(&self) -> &InputSpec;

    /// Device the weights live on
    fn device(&self) -> &Device;

    /// How many alternatives to include in each prediction
    fn top_k(&self) -> usize {
        DEFAULT_TOP_K
    }

    /// Run one forward pass and pick the most probable label.
    ///
    /// Always returns some label for a well-formed tensor, including for
    /// images that show no known plant.
    fn predict(&self, input: &Tensor) -> Result<Prediction> {
        let start = Instant::now();
        let probabilities = self.probabilities(input)?;
        let prediction =
            Prediction::from_probabilities(&probabilities, self.labels().as_slice(), self.top_k())?;
        Ok(prediction.with_latency_us(start.elapsed().as_micros() as u64))
    }

    /// Resize, normalize and classify a decoded image
    fn predict_image(&self, image: &DynamicImage) -> Result<Prediction> {
        let input = to_tensor(image, self.input_spec(), self.device())?;
        self.predict(&input)
    }
}
