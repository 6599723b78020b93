//! rollcall-service — wires the face pipeline, the stores and the capture
//! sources into the attendance decision flow.

pub mod config;
pub mod engine;
pub mod service;

pub use config::Config;
pub use engine::{spawn_engine, EngineError, EngineHandle};
pub use service::{
    classify_timeliness, CheckInOutcome, RegistrationOutcome, Service, ServiceError,
    VerificationOutcome,
};
