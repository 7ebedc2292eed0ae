use std::path::Path;

use candle_core::{pickle::PthTensors, DType, Device, Tensor, D};
use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};

use crate::error::ClassifyError;
use crate::network::{BrainTumorNet, NUM_CLASSES};
use crate::preprocess::preprocess_image;

/// Class names, positionally aligned with the network's output scores.
pub const LABELS: [&str; NUM_CLASSES] = [
    "glioma tumor",
    "meningioma tumor",
    "no tumor",
    "pituitary tumor",
];

/// Entry of the saved training checkpoint that holds the parameters.
const STATE_DICT_KEY: &str = "model_state_dict";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class: String,
    pub probability: f32,
}

/// Request-side view of a loaded model, so handlers can be tested with
/// fakes.
pub trait Classify: Send + Sync + 'static {
    /// Label of the highest-scoring class.
    fn classify(&self, image_data: &[u8]) -> Result<&'static str, ClassifyError>;

    /// Softmax distribution over all classes, most likely first.
    fn predict(&self, image_data: &[u8]) -> Result<Vec<Prediction>, ClassifyError>;
}

pub fn label_for(index: usize) -> Option<&'static str> {
    LABELS.get(index).copied()
}

/// Picks CUDA when compiled in and present, the CPU otherwise.
pub fn select_device() -> candle_core::Result<Device> {
    Device::cuda_if_available(0)
}

pub struct Model {
    network: BrainTumorNet,
    device: Device,
}

impl Model {
    /// Loads the network from a checkpoint.
    ///
    /// `.safetensors` files are read as-is; anything else is read as a
    /// PyTorch archive whose `model_state_dict` entry holds the parameters.
    pub fn new(checkpoint_path: &Path, device: Device) -> candle_core::Result<Self> {
        let is_safetensors = checkpoint_path
            .extension()
            .is_some_and(|ext| ext == "safetensors");

        let vb = if is_safetensors {
            let tensors = candle_core::safetensors::load(checkpoint_path, &device)?;
            VarBuilder::from_tensors(tensors, DType::F32, &device)
        } else {
            let tensors = PthTensors::new(checkpoint_path, Some(STATE_DICT_KEY))?;
            VarBuilder::from_backend(Box::new(tensors), DType::F32, device.clone())
        };

        Self::from_var_builder(vb, device)
    }

    pub fn from_var_builder(vb: VarBuilder, device: Device) -> candle_core::Result<Self> {
        let network = BrainTumorNet::new(vb)?;
        Ok(Model { network, device })
    }

    fn logits(&self, image_data: &[u8]) -> Result<Tensor, ClassifyError> {
        let input = preprocess_image(image_data, &self.device)?;
        Ok(self.network.forward(&input)?)
    }
}

impl Classify for Model {
    fn classify(&self, image_data: &[u8]) -> Result<&'static str, ClassifyError> {
        let index = self
            .logits(image_data)?
            .argmax(D::Minus1)?
            .squeeze(0)?
            .to_scalar::<u32>()? as usize;

        label_for(index).ok_or_else(|| {
            candle_core::Error::Msg(format!("class index {index} out of range")).into()
        })
    }

    fn predict(&self, image_data: &[u8]) -> Result<Vec<Prediction>, ClassifyError> {
        let input = preprocess_image(image_data, &self.device)?;
        let probabilities = self
            .network
            .predict(&input)?
            .squeeze(0)?
            .to_vec1::<f32>()?;

        let mut predictions: Vec<Prediction> = LABELS
            .iter()
            .zip(probabilities)
            .map(|(label, probability)| Prediction {
                class: label.to_string(),
                probability,
            })
            .collect();

        predictions.sort_by(|a, b| b.probability.total_cmp(&a.probability));

        Ok(predictions)
    }
}
