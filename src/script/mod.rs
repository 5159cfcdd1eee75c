//! Automation script process spawning and combined output streaming.

mod events;
mod process;
mod stream;

pub use events::*;
pub use process::*;
pub use stream::*;
