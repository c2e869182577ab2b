use crate::core::classifier::fallback_suggestion;
use crate::core::gemini::{GeminiClient, GeminiSettings};
use crate::domain::model::{
    ErrorType, FailureRecord, FileChange, FixSuggestion, ProjectType, RiskLevel, Severity,
    SuggestionSource,
};
use crate::domain::ports::{FixerAgent, LlmClient};
use crate::utils::error::{KintsugiError, Result};
use async_trait::async_trait;
use serde::Deserialize;

pub const DEFAULT_MAX_LOG_LINES: usize = 200;

/// 有 API key 時走 Gemini，否則或失敗時退回規則式分析
pub struct GeminiFixerAgent {
    llm: Option<Box<dyn LlmClient>>,
    max_log_lines: usize,
}

/// 模型回傳的 JSON；欄位都可能缺漏或不合法
#[derive(Debug, Deserialize)]
struct AiAnswer {
    error_type: Option<String>,
    project_type: Option<String>,
    root_cause: Option<String>,
    severity: Option<String>,
    #[serde(default)]
    suggested_steps: Vec<String>,
    risk_level: Option<String>,
    confidence: Option<f32>,
    #[serde(default)]
    affected_files: Vec<String>,
    #[serde(default)]
    file_changes: Vec<FileChange>,
}

impl GeminiFixerAgent {
    pub fn new(llm: Option<Box<dyn LlmClient>>, max_log_lines: usize) -> Self {
        Self { llm, max_log_lines }
    }

    /// 只用規則式分析
    pub fn heuristic_only() -> Self {
        Self::new(None, DEFAULT_MAX_LOG_LINES)
    }

    pub fn from_settings(settings: Option<GeminiSettings>, max_log_lines: usize) -> Result<Self> {
        let llm = match settings {
            Some(s) if !s.api_key.trim().is_empty() => {
                Some(Box::new(GeminiClient::new(s)?) as Box<dyn LlmClient>)
            }
            _ => None,
        };
        Ok(Self::new(llm, max_log_lines))
    }

    pub fn ai_enabled(&self) -> bool {
        self.llm.is_some()
    }

    pub async fn analyze_log(&self, log: &str) -> FixSuggestion {
        self.analyze_failure(&FailureRecord::from_log("adhoc", log)).await
    }

    fn build_prompt(&self, failure: &FailureRecord, project_type: ProjectType) -> String {
        let tail = log_tail(&failure.error_log, self.max_log_lines);
        format!(
            "You are a CI/CD failure analyst. Analyze the failing job below and answer with a single JSON object.\n\
             Fields: error_type (one of dependency, compilation, test_failure, lint, type_check, timeout, \
             out_of_memory, permission, network, configuration, docker_build, unknown), project_type \
             (javascript, typescript, python, rust, go, java, docker, unknown), root_cause (string), \
             severity (low, medium, high, critical), suggested_steps (array of strings), risk_level \
             (low, medium, high), confidence (0.0 to 1.0), affected_files (array of paths), file_changes \
             (array of {{\"path\", \"content\"}} with full new file contents, empty if unsure).\n\n\
             Repository: {}\nBranch: {}\nWorkflow: {}\nJob: {}\nDetected project type: {}\n\n\
             Log (last {} lines):\n{}",
            display_or_unknown(&failure.repository),
            display_or_unknown(&failure.branch),
            failure.workflow_name.as_deref().unwrap_or("unknown"),
            failure.job_name.as_deref().unwrap_or("unknown"),
            project_type,
            self.max_log_lines,
            tail
        )
    }

    async fn analyze_with_ai(
        &self,
        llm: &dyn LlmClient,
        failure: &FailureRecord,
        fallback: &FixSuggestion,
    ) -> Result<FixSuggestion> {
        let prompt = self.build_prompt(failure, fallback.project_type);
        let text = llm.generate(&prompt).await?;
        parse_ai_answer(&text, fallback)
    }
}

#[async_trait]
impl FixerAgent for GeminiFixerAgent {
    async fn analyze_failure(&self, failure: &FailureRecord) -> FixSuggestion {
        let fallback = fallback_suggestion(&failure.error_log);

        let Some(llm) = self.llm.as_deref() else {
            return fallback;
        };

        match self.analyze_with_ai(llm, failure, &fallback).await {
            Ok(suggestion) => {
                tracing::info!(
                    "🤖 AI analysis for failure {}: {} ({})",
                    failure.id,
                    suggestion.error_type,
                    suggestion.severity
                );
                suggestion
            }
            Err(e) => {
                tracing::warn!(
                    "⚠️ AI analysis failed for failure {}, using heuristic result: {}",
                    failure.id,
                    e
                );
                fallback
            }
        }
    }
}

fn display_or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "unknown"
    } else {
        value
    }
}

pub fn log_tail(log: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = log.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// 去掉 ```json ... ``` 之類的 code fence
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_enum<T: serde::de::DeserializeOwned>(value: Option<&str>, default: T) -> T {
    value
        .map(|v| v.trim().to_lowercase().replace([' ', '-'], "_"))
        .and_then(|v| serde_json::from_value(serde_json::Value::String(v)).ok())
        .unwrap_or(default)
}

fn parse_ai_answer(text: &str, fallback: &FixSuggestion) -> Result<FixSuggestion> {
    let answer: AiAnswer = serde_json::from_str(strip_code_fence(text)).map_err(|e| {
        KintsugiError::AiResponseError {
            message: format!("model answer is not valid JSON: {}", e),
        }
    })?;

    let error_type: ErrorType = parse_enum(answer.error_type.as_deref(), fallback.error_type);
    let project_type: ProjectType =
        parse_enum(answer.project_type.as_deref(), fallback.project_type);
    let severity: Severity = parse_enum(answer.severity.as_deref(), fallback.severity);
    let risk_level: RiskLevel = parse_enum(answer.risk_level.as_deref(), fallback.risk_level);

    let root_cause = answer
        .root_cause
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| fallback.root_cause.clone());

    let suggested_steps = if answer.suggested_steps.is_empty() {
        fallback.suggested_steps.clone()
    } else {
        answer.suggested_steps
    };

    let affected_files = if answer.affected_files.is_empty() {
        fallback.affected_files.clone()
    } else {
        answer.affected_files
    };

    let file_changes = answer
        .file_changes
        .into_iter()
        .filter(|c| !c.path.trim().is_empty())
        .collect();

    let confidence = answer
        .confidence
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(fallback.confidence);

    Ok(FixSuggestion {
        error_type,
        project_type,
        root_cause,
        severity,
        suggested_steps,
        risk_level,
        confidence,
        affected_files,
        file_changes,
        source: SuggestionSource::Ai,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct StubLlm {
        answer: Option<String>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl StubLlm {
        fn answering(text: &str) -> (Self, Arc<Mutex<Vec<String>>>) {
            let prompts = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    answer: Some(text.to_string()),
                    prompts: prompts.clone(),
                },
                prompts,
            )
        }

        fn failing() -> Self {
            Self {
                answer: None,
                prompts: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answer.clone().ok_or(KintsugiError::ApiStatusError {
                status: 500,
                body: "boom".to_string(),
            })
        }
    }

    const NODE_LOG: &str = "npm ERR! code 1\nError: Cannot find module 'express'";

    #[tokio::test]
    async fn test_without_llm_uses_heuristic() {
        let agent = GeminiFixerAgent::heuristic_only();
        assert!(!agent.ai_enabled());

        let s = agent.analyze_log(NODE_LOG).await;
        assert_eq!(s.source, SuggestionSource::Heuristic);
        assert_eq!(s.error_type, ErrorType::Dependency);
    }

    #[test]
    fn test_empty_api_key_disables_ai() {
        let agent = GeminiFixerAgent::from_settings(Some(GeminiSettings::new("  ")), 50).unwrap();
        assert!(!agent.ai_enabled());
    }

    #[tokio::test]
    async fn test_ai_answer_is_used() {
        let (llm, prompts) = StubLlm::answering(
            r#"```json
{"error_type": "dependency", "project_type": "javascript", "root_cause": "express not installed",
 "severity": "high", "suggested_steps": ["npm install express"], "risk_level": "low",
 "confidence": 0.93, "file_changes": [{"path": "package.json", "content": "{}"}]}
```"#,
        );
        let agent = GeminiFixerAgent::new(Some(Box::new(llm)), 10);

        let mut failure = FailureRecord::from_log("f-1", NODE_LOG);
        failure.repository = "acme/web".to_string();
        let s = agent.analyze_failure(&failure).await;

        assert_eq!(s.source, SuggestionSource::Ai);
        assert_eq!(s.root_cause, "express not installed");
        assert_eq!(s.suggested_steps, vec!["npm install express".to_string()]);
        assert_eq!(s.file_changes.len(), 1);
        assert!((s.confidence - 0.93).abs() < 1e-6);

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Repository: acme/web"));
        assert!(prompts[0].contains("Detected project type: javascript"));
    }

    #[tokio::test]
    async fn test_llm_error_falls_back() {
        let agent = GeminiFixerAgent::new(Some(Box::new(StubLlm::failing())), 10);
        let s = agent.analyze_log(NODE_LOG).await;
        assert_eq!(s.source, SuggestionSource::Heuristic);
        assert_eq!(s.error_type, ErrorType::Dependency);
    }

    #[tokio::test]
    async fn test_unparseable_answer_falls_back() {
        let (llm, _) = StubLlm::answering("I think you should reinstall node.");
        let agent = GeminiFixerAgent::new(Some(Box::new(llm)), 10);
        let s = agent.analyze_log(NODE_LOG).await;
        assert_eq!(s.source, SuggestionSource::Heuristic);
    }

    #[test]
    fn test_unknown_enum_values_take_fallback_fields() {
        let fallback = fallback_suggestion(NODE_LOG);
        let s = parse_ai_answer(
            r#"{"error_type": "cosmic rays", "severity": "Very High", "risk_level": "medium", "confidence": 7}"#,
            &fallback,
        )
        .unwrap();

        assert_eq!(s.error_type, fallback.error_type);
        assert_eq!(s.severity, fallback.severity);
        assert_eq!(s.risk_level, RiskLevel::Medium);
        assert_eq!(s.root_cause, fallback.root_cause);
        assert_eq!(s.suggested_steps, fallback.suggested_steps);
        assert!((s.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_enum_spelling_is_normalized() {
        let fallback = fallback_suggestion(NODE_LOG);
        let s = parse_ai_answer(r#"{"error_type": "Test Failure", "risk_level": "HIGH"}"#, &fallback)
            .unwrap();
        assert_eq!(s.error_type, ErrorType::TestFailure);
        assert_eq!(s.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_log_tail_keeps_last_lines() {
        let log = "a\nb\nc\nd";
        assert_eq!(log_tail(log, 2), "c\nd");
        assert_eq!(log_tail(log, 10), log);
        assert_eq!(log_tail("", 3), "");
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }
}
