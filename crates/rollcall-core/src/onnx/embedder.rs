//! 128-dimensional face encoder via ONNX Runtime.
//!
//! Crop-based: the located region is expanded by a fixed margin, resized
//! to the model input and embedded. Embeddings are stored as produced —
//! the 0.6 Euclidean operating point is calibrated for this space, so no
//! renormalization is applied.

use crate::model::{FaceEmbedder, ModelError};
use crate::types::{FaceEmbedding, FaceRegion};
use image::imageops::FilterType;
use image::{imageops, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const EMBED_INPUT_SIZE: u32 = 150;
const EMBED_MEAN: f32 = 127.5;
const EMBED_STD: f32 = 128.0;
const EMBED_DIM: usize = 128;
/// Fraction of the region size added on each side before cropping, so the
/// encoder sees the face in context rather than a tight box.
const EMBED_CROP_MARGIN: f32 = 0.25;
const EMBED_MODEL_VERSION: &str = "face_resnet_128";

/// ONNX-backed face embedder.
pub struct OnnxFaceEmbedder {
    session: Session,
}

impl OnnxFaceEmbedder {
    /// Load the encoder model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ModelError> {
        if !Path::new(model_path).exists() {
            return Err(ModelError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(path = model_path, dim = EMBED_DIM, "loaded face encoder model");
        Ok(Self { session })
    }

    /// Crop the margin-expanded region and resize to the model input.
    fn prepare_crop(image: &RgbImage, region: &FaceRegion) -> RgbImage {
        let (img_w, img_h) = image.dimensions();
        let margin_x = (region.width() as f32 * EMBED_CROP_MARGIN) as u32;
        let margin_y = (region.height() as f32 * EMBED_CROP_MARGIN) as u32;

        let left = region.left.saturating_sub(margin_x);
        let top = region.top.saturating_sub(margin_y);
        let right = (region.right + margin_x).min(img_w);
        let bottom = (region.bottom + margin_y).min(img_h);

        let crop = imageops::crop_imm(image, left, top, right - left, bottom - top).to_image();
        imageops::resize(&crop, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE, FilterType::Triangle)
    }

    fn to_tensor(crop: &RgbImage) -> Array4<f32> {
        let size = EMBED_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in crop.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = (pixel.0[c] as f32 - EMBED_MEAN) / EMBED_STD;
            }
        }
        tensor
    }
}

impl FaceEmbedder for OnnxFaceEmbedder {
    fn embed(
        &mut self,
        image: &RgbImage,
        region: &FaceRegion,
    ) -> Result<Option<FaceEmbedding>, ModelError> {
        if region.is_degenerate() {
            return Ok(None);
        }

        let crop = Self::prepare_crop(image, region);
        let input = Self::to_tensor(&crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.is_empty() {
            return Ok(None);
        }
        if raw.len() != EMBED_DIM {
            return Err(ModelError::InferenceFailed(format!(
                "expected {EMBED_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Some(FaceEmbedding {
            values: raw.to_vec(),
            model_version: Some(EMBED_MODEL_VERSION.to_string()),
        }))
    }

    fn dim(&self) -> usize {
        EMBED_DIM
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_prepare_crop_output_size() {
        let image = RgbImage::from_pixel(300, 300, Rgb([100, 100, 100]));
        let region = FaceRegion { top: 50, right: 250, bottom: 250, left: 50 };
        let crop = OnnxFaceEmbedder::prepare_crop(&image, &region);
        assert_eq!(crop.dimensions(), (EMBED_INPUT_SIZE, EMBED_INPUT_SIZE));
    }

    #[test]
    fn test_prepare_crop_margin_clamped_at_edges() {
        // Region flush against the frame edge: margin must not underflow
        // or read outside the image.
        let image = RgbImage::from_pixel(100, 100, Rgb([100, 100, 100]));
        let region = FaceRegion { top: 0, right: 100, bottom: 100, left: 0 };
        let crop = OnnxFaceEmbedder::prepare_crop(&image, &region);
        assert_eq!(crop.dimensions(), (EMBED_INPUT_SIZE, EMBED_INPUT_SIZE));
    }

    #[test]
    fn test_to_tensor_normalization() {
        let crop = RgbImage::from_pixel(EMBED_INPUT_SIZE, EMBED_INPUT_SIZE, Rgb([128, 0, 255]));
        let tensor = OnnxFaceEmbedder::to_tensor(&crop);
        assert_eq!(
            tensor.shape(),
            &[1, 3, EMBED_INPUT_SIZE as usize, EMBED_INPUT_SIZE as usize]
        );
        assert!((tensor[[0, 0, 0, 0]] - (128.0 - EMBED_MEAN) / EMBED_STD).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0]] - (0.0 - EMBED_MEAN) / EMBED_STD).abs() < 1e-6);
        assert!((tensor[[0, 2, 0, 0]] - (255.0 - EMBED_MEAN) / EMBED_STD).abs() < 1e-6);
    }
}
