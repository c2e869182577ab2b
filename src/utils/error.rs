use thiserror::Error;

#[derive(Error, Debug)]
pub enum KintsugiError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    ApiStatusError { status: u16, body: String },

    #[error("AI response error: {message}")]
    AiResponseError { message: String },

    #[error("GitHub step '{step}' failed (status {status}): {message}")]
    GitHubStepError {
        step: String,
        status: u16,
        message: String,
    },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Fix not found: {fix_id}")]
    NotFound { fix_id: String },

    #[error("Cannot {action} fix {fix_id} in status '{from}'")]
    InvalidTransition {
        fix_id: String,
        from: String,
        action: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Remote,
    Configuration,
    Data,
    Workflow,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl KintsugiError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            KintsugiError::ApiError(_) => ErrorCategory::Network,
            KintsugiError::ApiStatusError { .. }
            | KintsugiError::AiResponseError { .. }
            | KintsugiError::GitHubStepError { .. } => ErrorCategory::Remote,
            KintsugiError::ConfigError { .. }
            | KintsugiError::MissingConfigError { .. }
            | KintsugiError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            KintsugiError::CsvError(_)
            | KintsugiError::SerializationError(_)
            | KintsugiError::ValidationError { .. } => ErrorCategory::Data,
            KintsugiError::NotFound { .. } | KintsugiError::InvalidTransition { .. } => {
                ErrorCategory::Workflow
            }
            KintsugiError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 可以重試的遠端錯誤
            KintsugiError::ApiError(_)
            | KintsugiError::ApiStatusError { .. }
            | KintsugiError::AiResponseError { .. }
            | KintsugiError::GitHubStepError { .. } => ErrorSeverity::Medium,
            KintsugiError::IoError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            KintsugiError::ApiError(_) => {
                "Check network connectivity and the configured endpoints".to_string()
            }
            KintsugiError::ApiStatusError { status, .. } if *status == 401 || *status == 403 => {
                "Check that the API key or token is valid and has the required scopes".to_string()
            }
            KintsugiError::ApiStatusError { .. } => {
                "Retry later; the remote service rejected the request".to_string()
            }
            KintsugiError::AiResponseError { .. } => {
                "Retry the analysis or unset the Gemini API key to use heuristic analysis"
                    .to_string()
            }
            KintsugiError::GitHubStepError { step, .. } => format!(
                "Inspect the repository state after '{}'; a branch may have been left behind",
                step
            ),
            KintsugiError::CsvError(_) => "Check the export destination".to_string(),
            KintsugiError::IoError(_) => {
                "Check file permissions and that the data directory exists".to_string()
            }
            KintsugiError::SerializationError(_) => {
                "Check that the input file contains valid JSON".to_string()
            }
            KintsugiError::ConfigError { .. }
            | KintsugiError::MissingConfigError { .. }
            | KintsugiError::InvalidConfigValueError { .. } => {
                "Fix the configuration file (see kintsugi.example.toml)".to_string()
            }
            KintsugiError::ValidationError { .. } => {
                "Correct the input and try again".to_string()
            }
            KintsugiError::NotFound { .. } => {
                "Run `kintsugi list` to see known fix ids".to_string()
            }
            KintsugiError::InvalidTransition { .. } => {
                "Check the current status of the fix with `kintsugi list`".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            KintsugiError::ApiError(_) => "Could not reach a remote service".to_string(),
            KintsugiError::GitHubStepError { step, .. } => {
                format!("Applying the fix on GitHub failed during '{}'", step)
            }
            KintsugiError::NotFound { fix_id } => format!("No fix with id {}", fix_id),
            other => other.to_string(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        KintsugiError::ValidationError {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KintsugiError>;
