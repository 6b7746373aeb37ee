//! Latency benchmarks for the identification hot path
//!
//! Covers the per-request work done before and during inference:
//! - image decode of an uploaded JPEG/PNG
//! - leaf cropping and normalization to the input tensor
//! - a forward pass of a reduced-width MobileNetV2
//!
//! Run with: cargo bench -p leafid-classifiers

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;

use leafid_classifiers::{
    crop_to_leaf, decode_image, to_tensor, Classifier, DecodeLimits, InputSpec, LabelMap,
    MobileNetClassifier, MobileNetV2, MobileNetV2Config,
};

fn leaf_photo(width: u32, height: u32) -> DynamicImage {
    let (cx, cy) = (width as i64 / 2, height as i64 / 2);
    let radius = (width.min(height) as i64 / 3).pow(2);
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        if (x as i64 - cx).pow(2) + (y as i64 - cy).pow(2) < radius {
            Rgb([35, 115, 40])
        } else {
            Rgb([240, 236, 228])
        }
    }))
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("Failed to encode benchmark image");
    bytes
}

/// Decode of typical phone and webcam frame sizes
fn benchmark_decode(c: &mut Criterion) {
    let limits = DecodeLimits::default();
    let cases = vec![
        ("png_640x480", encode(&leaf_photo(640, 480), ImageFormat::Png)),
        ("jpeg_640x480", encode(&leaf_photo(640, 480), ImageFormat::Jpeg)),
        ("jpeg_1920x1080", encode(&leaf_photo(1920, 1080), ImageFormat::Jpeg)),
    ];

    let mut group = c.benchmark_group("Decode");
    group.sample_size(50);

    for (name, bytes) in &cases {
        group.bench_with_input(BenchmarkId::new("decode_image", name), bytes, |b, bytes| {
            b.iter(|| decode_image(black_box(bytes), &limits).unwrap());
        });
    }

    group.finish();
}

/// Cropping and tensor construction at the default 224x224 input
fn benchmark_preprocess(c: &mut Criterion) {
    let spec = InputSpec::default();
    let image = leaf_photo(1280, 960);

    let mut group = c.benchmark_group("Preprocess");
    group.sample_size(50);

    group.bench_function("crop_to_leaf", |b| {
        b.iter(|| crop_to_leaf(black_box(&image)));
    });
    group.bench_function("to_tensor", |b| {
        b.iter(|| to_tensor(black_box(&image), &spec, &Device::Cpu).unwrap());
    });

    group.finish();
}

/// Forward pass of a randomly initialized network
fn benchmark_inference(c: &mut Criterion) {
    let labels = Arc::new(
        LabelMap::new(vec!["AloeVera".into(), "Neem".into(), "Tulsi".into()]).unwrap(),
    );

    let mut group = c.benchmark_group("Inference");
    group.sample_size(20);

    for (width, size) in [(0.35, 96u32), (0.35, 224), (1.0, 224)] {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = MobileNetV2Config::new(labels.len()).with_width_multiplier(width);
        let model = MobileNetV2::new(&config, vb).expect("Failed to build network");
        let classifier = MobileNetClassifier::from_parts(
            "bench",
            model,
            labels.clone(),
            InputSpec::square(size),
            Device::Cpu,
        );
        let input = to_tensor(&leaf_photo(size, size), classifier.input_spec(), &Device::Cpu)
            .unwrap();

        group.bench_with_input(
            BenchmarkId::new("predict", format!("w{}_{}px", width, size)),
            &input,
            |b, input| {
                b.iter(|| classifier.predict(black_box(input)).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_decode,
    benchmark_preprocess,
    benchmark_inference
);
criterion_main!(benches);
