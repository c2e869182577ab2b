use crate::core::review::ReviewService;
use crate::domain::model::{FailureRecord, FailureStatus, FixRecord, FixSuggestion};
use crate::domain::ports::{ConfigProvider, FixStore, FixerAgent, Pipeline, Storage};
use crate::utils::error::{KintsugiError, Result};
use reqwest::Client;
use std::collections::HashSet;

pub const SUGGESTIONS_FILE: &str = "suggestions.json";

/// 收集失敗紀錄 -> 分析 -> 提出修正建議
pub struct AnalysisPipeline<S: Storage, C: ConfigProvider, F: FixStore> {
    storage: S,
    config: C,
    agent: Box<dyn FixerAgent>,
    review: ReviewService<F>,
    client: Client,
}

impl<S: Storage, C: ConfigProvider, F: FixStore> AnalysisPipeline<S, C, F> {
    pub fn new(storage: S, config: C, agent: Box<dyn FixerAgent>, review: ReviewService<F>) -> Self {
        Self {
            storage,
            config,
            agent,
            review,
            client: Client::new(),
        }
    }

    pub fn review(&self) -> &ReviewService<F> {
        &self.review
    }

    async fn fetch_failures(&self, endpoint: &str) -> Result<serde_json::Value> {
        tracing::debug!("Fetching failures from: {}", endpoint);
        let response = self.client.get(endpoint).send().await?;
        tracing::debug!("API response status: {}", response.status());

        let status = response.status();
        if !status.is_success() {
            return Err(KintsugiError::ApiStatusError {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    /// 讀取全部失敗紀錄（不過濾狀態），儀表板彙總也會用到
    pub async fn load_all_failures(&self) -> Result<Vec<FailureRecord>> {
        let source = self.config.failure_source();
        let value = if is_remote(source) {
            self.fetch_failures(source).await?
        } else {
            let data = tokio::fs::read(source).await?;
            serde_json::from_slice(&data)?
        };
        parse_failures(value)
    }
}

/// 接受陣列、單一物件或 `{"failures": [...]}` 三種格式
pub fn parse_failures(value: serde_json::Value) -> Result<Vec<FailureRecord>> {
    match value {
        serde_json::Value::Array(_) => Ok(serde_json::from_value(value)?),
        serde_json::Value::Object(mut obj) => match obj.remove("failures") {
            Some(list) => Ok(serde_json::from_value(list)?),
            None => Ok(vec![serde_json::from_value(serde_json::Value::Object(obj))?]),
        },
        other => Err(KintsugiError::validation(format!(
            "expected failure records, got {}",
            other
        ))),
    }
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider, F: FixStore> Pipeline for AnalysisPipeline<S, C, F> {
    async fn collect(&self) -> Result<Vec<FailureRecord>> {
        let failures = self.load_all_failures().await?;
        let total = failures.len();

        // 已有修正紀錄、已解決或忽略的失敗不再分析
        let proposed: HashSet<String> = self
            .review
            .list(None)
            .await?
            .into_iter()
            .map(|fix| fix.failure_id)
            .collect();
        let pending: Vec<FailureRecord> = failures
            .into_iter()
            .filter(|f| matches!(f.status, FailureStatus::New | FailureStatus::Analyzing))
            .filter(|f| !proposed.contains(&f.id))
            .collect();

        if pending.len() < total {
            tracing::info!("Skipping {} already handled failure(s)", total - pending.len());
        }
        Ok(pending)
    }

    async fn analyze(&self, failures: Vec<FailureRecord>) -> Result<Vec<(FailureRecord, FixSuggestion)>> {
        let mut analyzed = Vec::with_capacity(failures.len());

        for mut failure in failures {
            if failure.error_log.trim().is_empty() {
                tracing::warn!("Failure {} has an empty log", failure.id);
            }
            let suggestion = self.agent.analyze_failure(&failure).await;
            tracing::debug!(
                "Failure {}: {} / {} (confidence {:.2})",
                failure.id,
                suggestion.error_type,
                suggestion.project_type,
                suggestion.confidence
            );
            failure.status = FailureStatus::FixSuggested;
            analyzed.push((failure, suggestion));
        }

        Ok(analyzed)
    }

    async fn publish(&self, analyzed: Vec<(FailureRecord, FixSuggestion)>) -> Result<Vec<FixRecord>> {
        let mut records = Vec::with_capacity(analyzed.len());
        for (failure, suggestion) in analyzed {
            records.push(self.review.propose(&failure, suggestion).await?);
        }

        let data = serde_json::to_vec_pretty(&records)?;
        self.storage.write_file(SUGGESTIONS_FILE, &data).await?;
        tracing::debug!("Wrote {} suggestion(s) to {}", records.len(), SUGGESTIONS_FILE);

        Ok(records)
    }
}
