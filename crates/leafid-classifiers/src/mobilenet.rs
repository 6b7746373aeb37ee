//! MobileNetV2 image classifier
//!
//! Follows the torchvision module layout so weights exported from a
//! fine-tuned `torchvision.models.mobilenet_v2` load without renaming:
//!
//! - `features.0`: 3x3 stem convolution, stride 2
//! - `features.1..=17`: inverted residual blocks
//! - `features.18`: 1x1 convolution to the final feature width
//! - `classifier.1`: linear head over globally pooled features

use candle_core::{Module, Result, Tensor};
use candle_nn::{batch_norm, conv2d_no_bias, linear, BatchNorm, Conv2d, Conv2dConfig, Linear, VarBuilder};

const BN_EPS: f64 = 1e-5;

/// `(expand ratio, output channels, repeats, first stride)` per stage
const INVERTED_RESIDUAL_SETTINGS: [(usize, usize, usize, usize); 7] = [
    (1, 16, 1, 1),
    (6, 24, 2, 2),
    (6, 32, 3, 2),
    (6, 64, 4, 2),
    (6, 96, 3, 1),
    (6, 160, 3, 2),
    (6, 320, 1, 1),
];

/// Network hyperparameters
#[derive(Debug, Clone, PartialEq)]
pub struct MobileNetV2Config {
    /// Number of output classes (size of the label map)
    pub num_classes: usize,

    /// Channel width multiplier (1.0 for the standard network)
    pub width_multiplier: f64,
}

impl MobileNetV2Config {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            width_multiplier: 1.0,
        }
    }

    pub fn with_width_multiplier(mut self, width_multiplier: f64) -> Self {
        self.width_multiplier = width_multiplier;
        self
    }

    fn stem_channels(&self) -> usize {
        make_divisible(32.0 * self.width_multiplier, 8)
    }

    /// Width of the pooled feature vector fed to the classifier head
    pub fn last_channels(&self) -> usize {
        make_divisible(1280.0 * self.width_multiplier.max(1.0), 8)
    }
}

/// Round a channel count to the nearest multiple of `divisor`, never going
/// more than 10% below the requested value
fn make_divisible(value: f64, divisor: usize) -> usize {
    let d = divisor as f64;
    let rounded = (((value + d / 2.0) / d).floor() as usize * divisor).max(divisor);
    if (rounded as f64) < 0.9 * value {
        rounded + divisor
    } else {
        rounded
    }
}

/// Convolution + inference-mode batch norm, optionally followed by ReLU6
#[derive(Debug, Clone)]
struct ConvBn {
    conv: Conv2d,
    bn: BatchNorm,
    relu6: bool,
}

impl ConvBn {
    #[allow(clippy::too_many_arguments)]
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        relu6: bool,
        conv_vb: VarBuilder,
        bn_vb: VarBuilder,
    ) -> Result<Self> {
        let config = Conv2dConfig {
            padding: (kernel - 1) / 2,
            stride,
            groups,
            ..Default::default()
        };
        Ok(Self {
            conv: conv2d_no_bias(in_channels, out_channels, kernel, config, conv_vb)?,
            bn: batch_norm(out_channels, BN_EPS, bn_vb)?,
            relu6,
        })
    }

    /// torchvision `Conv2dNormActivation`: conv at `.0`, norm at `.1`
    fn activated(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        Self::new(
            in_channels,
            out_channels,
            kernel,
            stride,
            groups,
            true,
            vb.pp("0"),
            vb.pp("1"),
        )
    }
}

impl Module for ConvBn {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let ys = xs.apply(&self.conv)?.apply_t(&self.bn, false)?;
        if self.relu6 {
            ys.clamp(0f32, 6f32)
        } else {
            Ok(ys)
        }
    }
}

#[derive(Debug, Clone)]
struct InvertedResidual {
    expand: Option<ConvBn>,
    depthwise: ConvBn,
    project: ConvBn,
    use_residual: bool,
}

impl InvertedResidual {
    fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        expand_ratio: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let hidden = in_channels * expand_ratio;
        let vb = vb.pp("conv");

        let (expand, next) = if expand_ratio != 1 {
            let expand = ConvBn::activated(in_channels, hidden, 1, 1, 1, vb.pp("0"))?;
            (Some(expand), 1)
        } else {
            (None, 0)
        };

        let depthwise = ConvBn::activated(hidden, hidden, 3, stride, hidden, vb.pp(next))?;
        let project = ConvBn::new(
            hidden,
            out_channels,
            1,
            1,
            1,
            false,
            vb.pp(next + 1),
            vb.pp(next + 2),
        )?;

        Ok(Self {
            expand,
            depthwise,
            project,
            use_residual: stride == 1 && in_channels == out_channels,
        })
    }
}

impl Module for InvertedResidual {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let ys = match &self.expand {
            Some(expand) => xs.apply(expand)?,
            None => xs.clone(),
        };
        let ys = ys.apply(&self.depthwise)?.apply(&self.project)?;
        if self.use_residual {
            xs + ys
        } else {
            Ok(ys)
        }
    }
}

/// MobileNetV2 network producing class logits
#[derive(Debug, Clone)]
pub struct MobileNetV2 {
    stem: ConvBn,
    blocks: Vec<InvertedResidual>,
    head: ConvBn,
    classifier: Linear,
    config: MobileNetV2Config,
}

impl MobileNetV2 {
    pub fn new(config: &MobileNetV2Config, vb: VarBuilder) -> Result<Self> {
        if config.num_classes == 0 {
            candle_core::bail!("MobileNetV2 needs at least one output class");
        }
        if config.width_multiplier.is_nan() || config.width_multiplier <= 0.0 {
            candle_core::bail!("invalid width multiplier {}", config.width_multiplier);
        }

        let features = vb.pp("features");
        let mut in_channels = config.stem_channels();
        let stem = ConvBn::activated(3, in_channels, 3, 2, 1, features.pp(0))?;

        let mut blocks = Vec::with_capacity(17);
        let mut index = 1;
        for (expand_ratio, channels, repeats, first_stride) in INVERTED_RESIDUAL_SETTINGS {
            let out_channels = make_divisible(channels as f64 * config.width_multiplier, 8);
            for i in 0..repeats {
                let stride = if i == 0 { first_stride } else { 1 };
                blocks.push(InvertedResidual::new(
                    in_channels,
                    out_channels,
                    stride,
                    expand_ratio,
                    features.pp(index),
                )?);
                in_channels = out_channels;
                index += 1;
            }
        }

        let last_channels = config.last_channels();
        let head = ConvBn::activated(in_channels, last_channels, 1, 1, 1, features.pp(index))?;
        let classifier = linear(last_channels, config.num_classes, vb.pp("classifier").pp(1))?;

        Ok(Self {
            stem,
            blocks,
            head,
            classifier,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &MobileNetV2Config {
        &self.config
    }
}

impl Module for MobileNetV2 {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.apply(&self.stem)?;
        for block in &self.blocks {
            xs = xs.apply(block)?;
        }
        xs.apply(&self.head)?
            .mean_keepdim(3)?
            .mean_keepdim(2)?
            .flatten_from(1)?
            .apply(&self.classifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_make_divisible() {
        assert_eq!(make_divisible(32.0, 8), 32);
        assert_eq!(make_divisible(32.0 * 0.35, 8), 16);
        assert_eq!(make_divisible(16.0 * 0.35, 8), 8);
        assert_eq!(make_divisible(1280.0, 8), 1280);
        assert_eq!(make_divisible(96.0 * 0.75, 8), 72);
    }

    #[test]
    fn test_forward_shape() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = MobileNetV2Config::new(5).with_width_multiplier(0.35);
        let model = MobileNetV2::new(&config, vb).unwrap();

        let input = Tensor::zeros((1, 3, 32, 32), DType::F32, &Device::Cpu).unwrap();
        let logits = model.forward(&input).unwrap();
        assert_eq!(logits.dims(), &[1, 5]);
    }

    #[test]
    fn test_torchvision_parameter_names() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = MobileNetV2Config::new(3).with_width_multiplier(0.35);
        MobileNetV2::new(&config, vb).unwrap();

        let data = varmap.data().lock().unwrap();
        for name in [
            "features.0.0.weight",
            "features.0.1.running_var",
            "features.1.conv.0.0.weight",
            "features.1.conv.1.weight",
            "features.1.conv.2.running_mean",
            "features.2.conv.0.0.weight",
            "features.2.conv.2.weight",
            "features.2.conv.3.bias",
            "features.17.conv.3.weight",
            "features.18.0.weight",
            "classifier.1.weight",
            "classifier.1.bias",
        ] {
            assert!(data.contains_key(name), "missing parameter {}", name);
        }
    }

    #[test]
    fn test_zero_classes_rejected() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        assert!(MobileNetV2::new(&MobileNetV2Config::new(0), vb).is_err());
    }
}
