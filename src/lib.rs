pub mod analyzer;
pub mod cli;
pub mod commands;
pub mod compile_db;
pub mod config;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod prompt;

pub use config::Config;
pub use pipeline::{PipelineHandle, PipelineOrchestrator, PipelineReport};
