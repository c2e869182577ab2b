pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::Cli;
pub use config::{cli::LocalStorage, toml_config::KintsugiConfig};

pub use core::{
    engine::{RemediationEngine, RunReport},
    fixer_agent::GeminiFixerAgent,
    github::GitHubClient,
    pipeline::AnalysisPipeline,
    review::ReviewService,
    store::JsonFixStore,
};
pub use utils::error::{KintsugiError, Result};
