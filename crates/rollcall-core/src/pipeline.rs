//! Face locate/encode pipeline: image bytes in, embedding + quality out.

use crate::model::{FaceEmbedder, FaceLocator, ModelError};
use crate::quality;
use crate::types::{FaceEmbedding, FaceRegion};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("could not decode image bytes: {0}")]
    Decode(#[from] image::ImageError),
    #[error("no face detected in the image")]
    NoFaceDetected,
    #[error("multiple faces detected ({count}); ensure only one face is visible")]
    MultipleFacesDetected { count: usize },
    #[error("could not encode face from the image")]
    EncodingFailed,
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl EncodeError {
    /// User-correctable framing issues, surfaced verbatim to the caller
    /// rather than retried or masked.
    pub fn is_framing_issue(&self) -> bool {
        matches!(
            self,
            EncodeError::NoFaceDetected | EncodeError::MultipleFacesDetected { .. }
        )
    }
}

/// Successful encode: the single accepted face, its embedding and its
/// capture quality.
#[derive(Debug, Clone)]
pub struct EncodedFace {
    pub embedding: FaceEmbedding,
    pub region: FaceRegion,
    pub quality: f32,
}

/// Locate-then-encode pipeline over a pair of models.
///
/// Stateless across calls; `&mut self` only because inference sessions
/// require it.
pub struct FacePipeline<L, E> {
    locator: L,
    embedder: E,
}

impl<L: FaceLocator, E: FaceEmbedder> FacePipeline<L, E> {
    pub fn new(locator: L, embedder: E) -> Self {
        Self { locator, embedder }
    }

    /// Decode raw bytes, find exactly one face, and encode it.
    ///
    /// The source layout (grayscale, with-alpha, RGB) is canonicalized to
    /// 8-bit RGB before detection. Ambiguous frames with more than one
    /// face are refused outright — the caller controls framing, so safety
    /// wins over convenience here.
    pub fn encode(&mut self, image_bytes: &[u8]) -> Result<EncodedFace, EncodeError> {
        let image = image::load_from_memory(image_bytes)?.to_rgb8();

        let regions = self.locator.locate(&image)?;
        let region = match regions.as_slice() {
            [] => return Err(EncodeError::NoFaceDetected),
            [only] => *only,
            many => {
                return Err(EncodeError::MultipleFacesDetected { count: many.len() });
            }
        };

        let embedding = self
            .embedder
            .embed(&image, &region)?
            .ok_or(EncodeError::EncodingFailed)?;

        let quality = quality::score(&image, &region);

        tracing::debug!(
            ?region,
            dim = embedding.dim(),
            quality,
            "face encoded"
        );

        Ok(EncodedFace { embedding, region, quality })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    /// Locator stub returning a fixed set of regions.
    struct FixedLocator(Vec<FaceRegion>);

    impl FaceLocator for FixedLocator {
        fn locate(&mut self, _image: &RgbImage) -> Result<Vec<FaceRegion>, ModelError> {
            Ok(self.0.clone())
        }
    }

    /// Embedder stub deriving a deterministic vector from crop content,
    /// so identical photos produce identical embeddings.
    struct MeanColorEmbedder {
        yields_none: bool,
    }

    impl FaceEmbedder for MeanColorEmbedder {
        fn embed(
            &mut self,
            image: &RgbImage,
            region: &FaceRegion,
        ) -> Result<Option<FaceEmbedding>, ModelError> {
            if self.yields_none {
                return Ok(None);
            }
            let mut sums = [0.0f32; 3];
            let mut count = 0.0f32;
            for y in region.top..region.bottom {
                for x in region.left..region.right {
                    let p = image.get_pixel(x, y).0;
                    for c in 0..3 {
                        sums[c] += p[c] as f32 / 255.0;
                    }
                    count += 1.0;
                }
            }
            let values = (0..self.dim())
                .map(|i| sums[i % 3] / count.max(1.0))
                .collect();
            Ok(Some(FaceEmbedding { values, model_version: None }))
        }

        fn dim(&self) -> usize {
            128
        }
    }

    fn png_bytes(image: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn region(top: u32, right: u32, bottom: u32, left: u32) -> FaceRegion {
        FaceRegion { top, right, bottom, left }
    }

    #[test]
    fn test_invalid_bytes_decode_error() {
        let mut pipeline = FacePipeline::new(
            FixedLocator(vec![]),
            MeanColorEmbedder { yields_none: false },
        );
        let err = pipeline.encode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, EncodeError::Decode(_)));
    }

    #[test]
    fn test_zero_faces_rejected() {
        let image = RgbImage::from_pixel(64, 64, Rgb([120, 120, 120]));
        let mut pipeline = FacePipeline::new(
            FixedLocator(vec![]),
            MeanColorEmbedder { yields_none: false },
        );
        let err = pipeline.encode(&png_bytes(&image)).unwrap_err();
        assert!(matches!(err, EncodeError::NoFaceDetected));
        assert!(err.is_framing_issue());
    }

    #[test]
    fn test_multiple_faces_rejected_outright() {
        // Two faces must refuse the frame, never pick the larger one.
        let image = RgbImage::from_pixel(64, 64, Rgb([120, 120, 120]));
        let mut pipeline = FacePipeline::new(
            FixedLocator(vec![region(0, 60, 60, 0), region(2, 20, 20, 2)]),
            MeanColorEmbedder { yields_none: false },
        );
        let err = pipeline.encode(&png_bytes(&image)).unwrap_err();
        match err {
            EncodeError::MultipleFacesDetected { count } => assert_eq!(count, 2),
            other => panic!("expected MultipleFacesDetected, got {other:?}"),
        }
    }

    #[test]
    fn test_embedder_disagreement_is_recoverable() {
        let image = RgbImage::from_pixel(64, 64, Rgb([120, 120, 120]));
        let mut pipeline = FacePipeline::new(
            FixedLocator(vec![region(8, 56, 56, 8)]),
            MeanColorEmbedder { yields_none: true },
        );
        let err = pipeline.encode(&png_bytes(&image)).unwrap_err();
        assert!(matches!(err, EncodeError::EncodingFailed));
        assert!(!err.is_framing_issue());
    }

    #[test]
    fn test_single_face_encodes_with_quality() {
        let image = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
        let mut pipeline = FacePipeline::new(
            FixedLocator(vec![region(8, 56, 56, 8)]),
            MeanColorEmbedder { yields_none: false },
        );
        let encoded = pipeline.encode(&png_bytes(&image)).unwrap();
        assert_eq!(encoded.embedding.dim(), 128);
        assert_eq!(encoded.region, region(8, 56, 56, 8));
        assert!((0.0..=1.0).contains(&encoded.quality));
    }

    #[test]
    fn test_same_bytes_same_embedding() {
        let image = RgbImage::from_pixel(64, 64, Rgb([90, 140, 200]));
        let bytes = png_bytes(&image);
        let mut pipeline = FacePipeline::new(
            FixedLocator(vec![region(8, 56, 56, 8)]),
            MeanColorEmbedder { yields_none: false },
        );
        let a = pipeline.encode(&bytes).unwrap();
        let b = pipeline.encode(&bytes).unwrap();
        assert_eq!(a.embedding, b.embedding);
    }

    #[test]
    fn test_grayscale_input_canonicalized() {
        // Encode a Luma8 PNG; the pipeline must canonicalize to RGB and
        // still run end to end.
        let gray = image::GrayImage::from_pixel(64, 64, image::Luma([128]));
        let mut buf = Vec::new();
        gray.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let mut pipeline = FacePipeline::new(
            FixedLocator(vec![region(8, 56, 56, 8)]),
            MeanColorEmbedder { yields_none: false },
        );
        let encoded = pipeline.encode(&buf).unwrap();
        assert_eq!(encoded.embedding.dim(), 128);
    }
}
