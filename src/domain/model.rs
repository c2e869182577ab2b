use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureStatus {
    #[default]
    New,
    Analyzing,
    FixSuggested,
    Resolved,
    Ignored,
}

/// CI 失敗紀錄，對應後端資料庫的一列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: String,
    pub repository: String,
    pub branch: String,
    #[serde(default)]
    pub workflow_name: Option<String>,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub commit_sha: Option<String>,
    pub error_log: String,
    #[serde(default = "Utc::now")]
    pub detected_at: DateTime<Utc>,
    #[serde(default)]
    pub status: FailureStatus,
}

impl FailureRecord {
    pub fn from_log(id: impl Into<String>, error_log: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            repository: String::new(),
            branch: String::new(),
            workflow_name: None,
            job_name: None,
            commit_sha: None,
            error_log: error_log.into(),
            detected_at: Utc::now(),
            status: FailureStatus::New,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    Javascript,
    Typescript,
    Python,
    Rust,
    Go,
    Java,
    Docker,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Dependency,
    Compilation,
    TestFailure,
    Lint,
    TypeCheck,
    Timeout,
    OutOfMemory,
    Permission,
    Network,
    Configuration,
    DockerBuild,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    Ai,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub error_type: ErrorType,
    pub project_type: ProjectType,
    pub root_cause: String,
    pub severity: Severity,
    pub suggested_steps: Vec<String>,
    pub risk_level: RiskLevel,
    pub confidence: f32,
    #[serde(default)]
    pub affected_files: Vec<String>,
    #[serde(default)]
    pub file_changes: Vec<FileChange>,
    pub source: SuggestionSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
    ApplyFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixRecord {
    pub id: String,
    pub failure_id: String,
    pub repository: String,
    pub base_branch: String,
    pub suggestion: FixSuggestion,
    pub status: FixStatus,
    #[serde(default)]
    pub reviewer: Option<String>,
    #[serde(default)]
    pub review_comment: Option<String>,
    #[serde(default)]
    pub pull_request_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 套用修正後 GitHub 上產生的結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedFix {
    pub branch: String,
    pub commit_sha: String,
    pub pull_request_number: u64,
    pub pull_request_url: String,
}

macro_rules! snake_case_display {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    match serde_json::to_value(self) {
                        Ok(serde_json::Value::String(s)) => f.write_str(&s),
                        _ => write!(f, "{:?}", self),
                    }
                }
            }
        )*
    };
}

snake_case_display!(
    FailureStatus,
    ProjectType,
    ErrorType,
    Severity,
    RiskLevel,
    SuggestionSource,
    FixStatus
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_record_defaults_from_minimal_json() {
        let json = r#"{
            "id": "f-1",
            "repository": "acme/web",
            "branch": "main",
            "error_log": "npm ERR! missing script: build"
        }"#;
        let failure: FailureRecord = serde_json::from_str(json).unwrap();
        assert_eq!(failure.status, FailureStatus::New);
        assert!(failure.workflow_name.is_none());
        assert!(failure.commit_sha.is_none());
    }

    #[test]
    fn test_enums_display_as_snake_case() {
        assert_eq!(ErrorType::TestFailure.to_string(), "test_failure");
        assert_eq!(FixStatus::ApplyFailed.to_string(), "apply_failed");
        assert_eq!(ProjectType::Typescript.to_string(), "typescript");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(RiskLevel::Low < RiskLevel::High);
    }
}
