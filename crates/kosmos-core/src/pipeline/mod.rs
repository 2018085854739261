pub mod config;
pub mod interactive;
mod orchestrator;
mod types;

pub use orchestrator::Reduction;
pub use types::{NoOpReporter, ProgressReporter, Stage};
