//! Analysis engine integration.
//!
//! Drives an external UCI engine for position scores and computer moves. The
//! rest of the trainer only sees [`AnalysisClient`], [`RequestToken`] and the
//! [`AnalysisEvent`] stream.

pub mod manager;
pub mod process;
pub mod types;

pub use {
    manager::AnalysisClient,
    types::{AnalysisEvent, EngineSettings, Evaluation, RequestKind, RequestToken},
};
