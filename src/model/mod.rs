//! Model sources and local compute devices.

pub mod device;
pub mod source;

pub use device::Device;
pub use source::{DEFAULT_MODEL, ModelSource, cache_dir};
