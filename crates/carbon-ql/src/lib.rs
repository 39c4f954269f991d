//! Carbon impact models for hardware components.
//!
//! Configure a model once, through typed or untyped parameters, then evaluate
//! it against usage scenarios to get an estimate bounded by `min` and `max`.

pub mod config;
pub mod error;
pub mod impact;
pub mod reference;
pub mod telemetry;

pub use error::AppError;
pub use impact::{
    CpuParams, EvaluationError, ImpactEngine, ImpactEstimate, ImpactReport, ModelInstance,
    RawParams, ValidationError,
};
pub use reference::ReferenceProvider;
