//! Dedicated engine thread owning the inference sessions.
//!
//! ONNX sessions want exclusive mutable access, so the whole face pipeline
//! lives on one OS thread; async callers reach it through a clone-safe
//! handle over a bounded channel. Model loading happens before the thread
//! spawns, so an unusable deployment fails fast at startup.

use rollcall_core::onnx::{OnnxFaceEmbedder, OnnxFaceLocator};
use rollcall_core::{EncodeError, EncodedFace, FaceEmbedder, FaceLocator, FacePipeline, ModelError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("model load failed: {0}")]
    Model(#[from] ModelError),
    #[error("engine thread exited")]
    ChannelClosed,
}

enum EngineRequest {
    Encode {
        image_bytes: Vec<u8>,
        reply: oneshot::Sender<Result<EncodedFace, EncodeError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Encode one image: decode, locate exactly one face, embed, score.
    pub async fn encode(&self, image_bytes: Vec<u8>) -> Result<EncodedFace, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Encode { image_bytes, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        let result = reply_rx.await.map_err(|_| EngineError::ChannelClosed)?;
        Ok(result?)
    }

    /// Run any pipeline on a dedicated OS thread and return its handle.
    ///
    /// Generic over the model seams so tests can drive the engine with
    /// stub models.
    pub fn from_pipeline<L, E>(mut pipeline: FacePipeline<L, E>) -> EngineHandle
    where
        L: FaceLocator + Send + 'static,
        E: FaceEmbedder + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

        std::thread::Builder::new()
            .name("rollcall-engine".into())
            .spawn(move || {
                tracing::info!("engine thread started");
                while let Some(req) = rx.blocking_recv() {
                    match req {
                        EngineRequest::Encode { image_bytes, reply } => {
                            let _ = reply.send(pipeline.encode(&image_bytes));
                        }
                    }
                }
                tracing::info!("engine thread exiting");
            })
            .expect("failed to spawn engine thread");

        EngineHandle { tx }
    }
}

/// Load the ONNX models and spawn the engine thread.
pub fn spawn_engine(detector_path: &str, encoder_path: &str) -> Result<EngineHandle, EngineError> {
    let locator = OnnxFaceLocator::load(detector_path)?;
    tracing::info!(path = detector_path, "face detector loaded");

    let embedder = OnnxFaceEmbedder::load(encoder_path)?;
    tracing::info!(path = encoder_path, "face encoder loaded");

    Ok(EngineHandle::from_pipeline(FacePipeline::new(locator, embedder)))
}
