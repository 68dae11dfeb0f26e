//! Shared data models for the Darkroom processing backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their typed options and runner results
//! - Queue lifecycle events
//! - Operation presets and the preset store document

pub mod event;
pub mod job;
pub mod options;
pub mod preset;
pub mod result;

// Re-export common types
pub use event::QueueEvent;
pub use job::{Job, JobId, JobSpec, JobStatus, JobType, SpecError};
pub use options::{
    ExportFormat, ExportOptions, ImportOptions, InpaintOptions, JobOptions, ObjectDetectOptions,
    ObjectReplaceOptions, QualityMode, SuperResOptions,
};
pub use preset::{Preset, PresetDocument, PresetMeta, PresetOperation, PRESET_DOCUMENT_VERSION};
pub use result::JobResult;
