//! Local persistence for Darkroom.
//!
//! This crate provides:
//! - `PresetManager`: a lazily loaded, write-through JSON preset store
//! - Atomic temp-then-rename file replacement

pub mod error;
pub mod fs_utils;
pub mod presets;

pub use error::{StorageError, StorageResult};
pub use fs_utils::write_atomic;
pub use presets::PresetManager;
