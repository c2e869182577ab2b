use crate::domain::model::{AppliedFix, FailureRecord, FixRecord, FixSuggestion};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    /// 失敗紀錄來源：本地 JSON 檔或後端 API URL
    fn failure_source(&self) -> &str;
    fn data_dir(&self) -> &str;
    fn auto_approve_low_risk(&self) -> bool;
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
pub trait FixerAgent: Send + Sync {
    async fn analyze_failure(&self, failure: &FailureRecord) -> FixSuggestion;
}

#[async_trait]
pub trait FixStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<FixRecord>>;
    async fn save_all(&self, fixes: &[FixRecord]) -> Result<()>;
}

#[async_trait]
pub trait FixApplier: Send + Sync {
    async fn apply(&self, fix: &FixRecord) -> Result<AppliedFix>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn collect(&self) -> Result<Vec<FailureRecord>>;
    async fn analyze(&self, failures: Vec<FailureRecord>) -> Result<Vec<(FailureRecord, FixSuggestion)>>;
    async fn publish(&self, analyzed: Vec<(FailureRecord, FixSuggestion)>) -> Result<Vec<FixRecord>>;
}
