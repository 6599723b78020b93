//! ONNX Runtime backends for the model seams.
//!
//! Both models are pretrained deployment artifacts loaded from a model
//! directory; swapping either for a different pretrained model only
//! requires honoring the same trait contract.

mod embedder;
mod locator;

pub use embedder::OnnxFaceEmbedder;
pub use locator::OnnxFaceLocator;
