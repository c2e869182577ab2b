pub mod classifier;
pub mod detection;
pub mod engine;
pub mod fixer_agent;
pub mod gemini;
pub mod github;
pub mod pipeline;
pub mod report;
pub mod review;
pub mod store;

pub use crate::domain::model::{FailureRecord, FixRecord, FixSuggestion};
pub use crate::domain::ports::{ConfigProvider, FixApplier, FixStore, FixerAgent, LlmClient, Pipeline, Storage};
pub use crate::utils::error::Result;
