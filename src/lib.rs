//! Deckathon Supervisor - supervised automation script runs with live stage tracking.

pub mod config;
pub mod display;
pub mod script;
pub mod supervisor;
