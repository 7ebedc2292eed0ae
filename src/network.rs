use candle_core::{bail, Result, Tensor, D};
use candle_nn::{
    conv2d, linear, Conv2d, Conv2dConfig, Dropout, Linear, Module, ModuleT, VarBuilder,
};

pub const IMAGE_SIZE: usize = 150;
pub const CHANNELS: usize = 3;
pub const NUM_CLASSES: usize = 4;

const CONV_WIDTHS: [usize; 5] = [CHANNELS, 32, 64, 128, 256];
// 150 -> 75 -> 37 -> 18 -> 9 after four floor-halving pools
const FEATURE_SIDE: usize = 9;
const FLATTENED: usize = 256 * FEATURE_SIDE * FEATURE_SIDE;
const DROPOUT: f32 = 0.5;

/// Conv2d 3x3 (padding 1) followed by ReLU and a 2x2 max-pool.
#[derive(Debug, Clone)]
struct ConvBlock {
    conv: Conv2d,
}

impl ConvBlock {
    fn new(in_channels: usize, out_channels: usize, vb: VarBuilder) -> Result<Self> {
        let config = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        let conv = conv2d(in_channels, out_channels, 3, config, vb)?;
        Ok(Self { conv })
    }
}

impl Module for ConvBlock {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.conv.forward(xs)?.relu()?.max_pool2d(2)
    }
}

/// The brain tumor classifier network.
///
/// Parameter names follow the `nn.Sequential` layout the checkpoint was
/// exported from: `conv_layers.{0,3,6,9}` for the convolutions and
/// `fc_layers.{1,4,7}` for the fully-connected layers.
#[derive(Debug, Clone)]
pub struct BrainTumorNet {
    features: Vec<ConvBlock>,
    fc1: Linear,
    fc2: Linear,
    fc3: Linear,
    dropout: Dropout,
}

impl BrainTumorNet {
    pub fn new(vb: VarBuilder) -> Result<Self> {
        let conv_vb = vb.pp("conv_layers");
        let features = CONV_WIDTHS
            .windows(2)
            .enumerate()
            .map(|(i, w)| ConvBlock::new(w[0], w[1], conv_vb.pp(i * 3)))
            .collect::<Result<Vec<_>>>()?;

        let fc_vb = vb.pp("fc_layers");
        let fc1 = linear(FLATTENED, 128, fc_vb.pp("1"))?;
        let fc2 = linear(128, 64, fc_vb.pp("4"))?;
        let fc3 = linear(64, NUM_CLASSES, fc_vb.pp("7"))?;

        Ok(Self {
            features,
            fc1,
            fc2,
            fc3,
            dropout: Dropout::new(DROPOUT),
        })
    }

    /// Raw class scores, `[batch, 4]`, in evaluation mode.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.forward_t(xs, false)
    }

    /// Softmax over the class scores of [`BrainTumorNet::forward`].
    pub fn predict(&self, xs: &Tensor) -> Result<Tensor> {
        let logits = self.forward(xs)?;
        candle_nn::ops::softmax(&logits, D::Minus1)
    }
}

impl ModuleT for BrainTumorNet {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let (_, channels, height, width) = xs.dims4()?;
        if (channels, height, width) != (CHANNELS, IMAGE_SIZE, IMAGE_SIZE) {
            bail!(
                "expected input of shape [batch, {}, {}, {}], got {:?}",
                CHANNELS,
                IMAGE_SIZE,
                IMAGE_SIZE,
                xs.dims()
            )
        }

        let mut xs = xs.clone();
        for block in &self.features {
            xs = block.forward(&xs)?;
        }

        let xs = xs.flatten_from(1)?;
        let xs = self.fc1.forward(&xs)?.relu()?;
        let xs = self.dropout.forward_t(&xs, train)?;
        let xs = self.fc2.forward(&xs)?.relu()?;
        let xs = self.dropout.forward_t(&xs, train)?;
        self.fc3.forward(&xs)
    }
}
