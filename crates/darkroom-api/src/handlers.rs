//! Request handlers.

pub mod health;
pub mod jobs;
pub mod presets;
pub mod queue;

pub use health::*;
pub use jobs::*;
pub use presets::*;
pub use queue::*;
