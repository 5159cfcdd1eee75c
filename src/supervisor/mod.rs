//! Supervisor module: line classification, stage tracking, and run control.

mod cancel;
mod classifier;
mod request;
mod runner;
mod sink;
mod state;
mod tracker;

pub use cancel::*;
pub use classifier::*;
pub use request::*;
pub use runner::*;
pub use sink::*;
pub use state::*;
pub use tracker::*;
