//! Configuration module.

mod env_file;
mod loader;
mod types;

pub use env_file::*;
pub use loader::*;
pub use types::*;
