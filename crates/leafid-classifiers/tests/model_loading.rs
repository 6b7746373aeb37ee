//! Artifact loading tests
//!
//! Builds small randomly initialized MobileNetV2 networks, writes them to
//! SafeTensors files and loads them back through the public loader.

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use image::{DynamicImage, Rgb, RgbImage};
use leafid_classifiers::{
    load_classifier, ArchitectureConfig, ArtifactSpec, Classifier, InputSpec, MobileNetV2,
    MobileNetV2Config, ModelConfig,
};
use leafid_core::Error;
use std::path::{Path, PathBuf};

const LABELS: &str = r#"{"AloeVera": 0, "Neem": 1, "Tulsi": 2}"#;

fn save_network(dir: &Path, file: &str, num_classes: usize, width: f64) -> PathBuf {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    MobileNetV2::new(
        &MobileNetV2Config::new(num_classes).with_width_multiplier(width),
        vb,
    )
    .unwrap();

    let path = dir.join(file);
    varmap.save(&path).unwrap();
    path
}

fn write_labels(dir: &Path) -> PathBuf {
    let path = dir.join("class_indices.json");
    std::fs::write(&path, LABELS).unwrap();
    path
}

fn small_input() -> InputSpec {
    InputSpec::square(64)
}

fn leaf_photo() -> DynamicImage {
    let img = RgbImage::from_fn(96, 80, |x, y| {
        if (x as i32 - 48).pow(2) + (y as i32 - 40).pow(2) < 900 {
            Rgb([40, 120, 35])
        } else {
            Rgb([235, 230, 220])
        }
    });
    DynamicImage::ImageRgb8(img)
}

#[test]
fn test_load_and_predict() {
    let dir = tempfile::tempdir().unwrap();
    let weights = save_network(dir.path(), "leaf.safetensors", 3, 0.35);
    let labels = write_labels(dir.path());

    let mut config = ModelConfig::from_local(&weights, &labels)
        .with_input(small_input())
        .with_top_k(2);
    config.artifacts[0] = ArtifactSpec::local(&weights).with_architecture(
        ArchitectureConfig::MobilenetV2 {
            width_multiplier: 0.35,
        },
    );

    let classifier = load_classifier(&config).unwrap();
    assert_eq!(classifier.name(), "leaf");
    assert_eq!(classifier.labels().len(), 3);

    let prediction = classifier.predict_image(&leaf_photo()).unwrap();
    assert!(classifier.labels().position(&prediction.label).is_some());
    assert!((0.0..=1.0).contains(&prediction.confidence));
    assert_eq!(prediction.top_k.len(), 2);
    assert_eq!(prediction.top_k[0].label, prediction.label);
}

#[test]
fn test_out_of_distribution_input_still_predicts() {
    let dir = tempfile::tempdir().unwrap();
    let weights = save_network(dir.path(), "leaf.safetensors", 3, 0.35);
    let labels = write_labels(dir.path());

    let mut config = ModelConfig::from_local(&weights, &labels).with_input(small_input());
    config.artifacts[0].architecture = ArchitectureConfig::MobilenetV2 {
        width_multiplier: 0.35,
    };
    let classifier = load_classifier(&config).unwrap();

    let noise = RgbImage::from_fn(50, 50, |x, y| {
        Rgb([(x * 5) as u8, (y * 5) as u8, ((x + y) * 2) as u8])
    });
    let prediction = classifier
        .predict_image(&DynamicImage::ImageRgb8(noise))
        .unwrap();
    assert!(!prediction.label.is_empty());

    let total: f32 = classifier
        .probabilities(
            &leafid_classifiers::to_tensor(&leaf_photo(), classifier.input_spec(), &Device::Cpu)
                .unwrap(),
        )
        .unwrap()
        .iter()
        .sum();
    assert!((total - 1.0).abs() < 1e-4);
}

#[test]
fn test_predict_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let weights = save_network(dir.path(), "leaf.safetensors", 3, 0.35);
    let labels = write_labels(dir.path());

    let mut config = ModelConfig::from_local(&weights, &labels).with_input(small_input());
    config.artifacts[0].architecture = ArchitectureConfig::MobilenetV2 {
        width_multiplier: 0.35,
    };
    let classifier = load_classifier(&config).unwrap();

    let first = classifier.predict_image(&leaf_photo()).unwrap();
    let second = classifier.predict_image(&leaf_photo()).unwrap();
    assert_eq!(first.label, second.label);
    assert_eq!(first.confidence, second.confidence);
}

#[test]
fn test_label_count_mismatch_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    // Head trained for 4 classes, label file names 3
    let weights = save_network(dir.path(), "leaf.safetensors", 4, 0.35);
    let labels = write_labels(dir.path());

    let mut config = ModelConfig::from_local(&weights, &labels).with_input(small_input());
    config.artifacts[0].architecture = ArchitectureConfig::MobilenetV2 {
        width_multiplier: 0.35,
    };
    assert!(matches!(load_classifier(&config), Err(Error::ArtifactCorrupt(_))));
}

#[test]
fn test_width_mismatch_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let weights = save_network(dir.path(), "leaf.safetensors", 3, 0.35);
    let labels = write_labels(dir.path());

    // Default architecture is width 1.0
    let config = ModelConfig::from_local(&weights, &labels).with_input(small_input());
    assert!(matches!(load_classifier(&config), Err(Error::ArtifactCorrupt(_))));
}

#[test]
fn test_missing_labels() {
    let dir = tempfile::tempdir().unwrap();
    let weights = save_network(dir.path(), "leaf.safetensors", 3, 0.35);

    let config = ModelConfig::from_local(&weights, dir.path().join("class_indices.json"));
    assert!(matches!(load_classifier(&config), Err(Error::ArtifactMissing(_))));
}

#[test]
fn test_ensemble_of_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let small = save_network(dir.path(), "small.safetensors", 3, 0.35);
    let wide = save_network(dir.path(), "wide.safetensors", 3, 0.5);
    let labels = write_labels(dir.path());

    let config = ModelConfig {
        artifacts: vec![
            ArtifactSpec::local(&small).with_architecture(ArchitectureConfig::MobilenetV2 {
                width_multiplier: 0.35,
            }),
            ArtifactSpec::local(&wide)
                .with_name("wide")
                .with_architecture(ArchitectureConfig::MobilenetV2 {
                    width_multiplier: 0.5,
                }),
        ],
        labels,
        input: small_input(),
        ..Default::default()
    };

    let classifier = load_classifier(&config).unwrap();
    assert_eq!(classifier.name(), "ensemble(small+wide)");

    let prediction = classifier.predict_image(&leaf_photo()).unwrap();
    assert!(classifier.labels().position(&prediction.label).is_some());
}
