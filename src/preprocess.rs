use candle_core::{DType, Device, Tensor};
use image::{imageops::FilterType, DynamicImage};

use crate::error::ClassifyError;
use crate::network::{CHANNELS, IMAGE_SIZE};

/// Per-channel normalization applied after scaling pixels to `[0, 1]`.
pub struct NormalizeConfig {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for NormalizeConfig {
    // Matches the training transform, which maps [0, 1] onto [-1, 1].
    fn default() -> Self {
        NormalizeConfig {
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        }
    }
}

/// Decodes `image_data` and turns it into a `[1, 3, 150, 150]` input tensor
/// on `device`.
pub fn preprocess_image(image_data: &[u8], device: &Device) -> Result<Tensor, ClassifyError> {
    let img = image::load_from_memory(image_data)?;
    image_to_tensor(&img, &NormalizeConfig::default(), device)
}

pub fn image_to_tensor(
    img: &DynamicImage,
    config: &NormalizeConfig,
    device: &Device,
) -> Result<Tensor, ClassifyError> {
    // RGB first, then a stretch resize; aspect ratio is not preserved.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let resized = rgb
        .resize_exact(IMAGE_SIZE as u32, IMAGE_SIZE as u32, FilterType::Triangle)
        .to_rgb8();

    let data = resized.into_raw();
    let pixels = Tensor::from_vec(data, (IMAGE_SIZE, IMAGE_SIZE, CHANNELS), device)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?;
    let scaled = (pixels / 255.)?;

    let mean = Tensor::new(&config.mean, device)?.reshape((CHANNELS, 1, 1))?;
    let std = Tensor::new(&config.std, device)?.reshape((CHANNELS, 1, 1))?;
    let normalized = scaled.broadcast_sub(&mean)?.broadcast_div(&std)?;

    Ok(normalized.unsqueeze(0)?)
}
