//! rollcall-core — Face encoding and matching engine.
//!
//! Turns an image into a fixed-length face embedding with a quality score,
//! and scores embedding similarity against a stored reference to decide
//! whether a check-in is accepted. Detection and embedding models run via
//! ONNX Runtime behind trait seams so a different pretrained model can be
//! swapped in without touching the matcher.

pub mod matcher;
pub mod model;
pub mod onnx;
pub mod pipeline;
pub mod quality;
pub mod types;

pub use matcher::{Matcher, DEFAULT_MATCH_THRESHOLD};
pub use model::{FaceEmbedder, FaceLocator, ModelError};
pub use pipeline::{EncodeError, EncodedFace, FacePipeline};
pub use types::{FaceEmbedding, FaceRegion, MatchResult};
