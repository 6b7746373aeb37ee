//! Probability-averaging ensemble

use candle_core::{Device, Tensor};
use leafid_core::{Error, Result};
use std::sync::Arc;

use crate::classifier::{Classifier, DEFAULT_TOP_K};
use crate::labels::LabelMap;
use crate::preprocess::InputSpec;

/// Averages the class probabilities of several classifiers.
///
/// All members must share one label map and one input spec, so a single
/// preprocessed tensor feeds every member.
pub struct EnsembleClassifier {
    name: String,
    members: Vec<Arc<dyn Classifier>>,
    top_k: usize,
}

impl EnsembleClassifier {
    pub fn new(members: Vec<Arc<dyn Classifier>>) -> Result<Self> {
        let first = members
            .first()
            .ok_or_else(|| Error::config("ensemble needs at least one member"))?;

        for member in &members[1..] {
            if member.labels() != first.labels() {
                return Err(Error::config(format!(
                    "ensemble member '{}' has a different label map than '{}'",
                    member.name(),
                    first.name()
                )));
            }
            if member.input_spec() != first.input_spec() {
                return Err(Error::config(format!(
                    "ensemble member '{}' expects a different input than '{}'",
                    member.name(),
                    first.name()
                )));
            }
        }

        let name = format!(
            "ensemble({})",
            members.iter().map(|m| m.name()).collect::<Vec<_>>().join("+")
        );

        Ok(Self {
            name,
            members,
            top_k: DEFAULT_TOP_K,
        })
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn members(&self) -> &[Arc<dyn Classifier>] {
        &self.members
    }
}

impl Classifier for EnsembleClassifier {
    fn probabilities(&self, input: &Tensor) -> Result<Vec<f32>> {
        let mut sum = vec![0.0f32; self.labels().len()];
        for member in &self.members {
            let probabilities = member.probabilities(input)?;
            if probabilities.len() != sum.len() {
                return Err(Error::internal(format!(
                    "member '{}' returned {} scores for {} labels",
                    member.name(),
                    probabilities.len(),
                    sum.len()
                )));
            }
            sum.iter_mut()
                .zip(probabilities)
                .for_each(|(acc, p)| *acc += p);
        }

        let n = self.members.len() as f32;
        Ok(sum.into_iter().map(|p| p / n).collect())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn labels(&self) -> &LabelMap {
        self.members[0].labels()
    }

    fn input_spec(&self) -> &InputSpec {
        self.members[0].input_spec()
    }

    fn device(&self) -> &Device {
        self.members[0].device()
    }

    fn top_k(&self) -> usize {
        self.top_k
    }
}
