use crate::core::fixer_agent::DEFAULT_MAX_LOG_LINES;
use crate::core::gemini::{GeminiSettings, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
use crate::core::github::{GitHubSettings, DEFAULT_GITHUB_API_URL};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{KintsugiError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KintsugiConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub review: ReviewConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// 本地 JSON 檔路徑或後端 API URL
    #[serde(default = "default_failure_source")]
    pub failure_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// fixes.json 與 suggestions.json 存放的目錄
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub token: Option<String>,
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReviewConfig {
    #[serde(default)]
    pub auto_approve_low_risk: bool,
    pub default_reviewer: Option<String>,
}

fn default_service_name() -> String {
    "kintsugi".to_string()
}

fn default_data_dir() -> String {
    "./kintsugi-data".to_string()
}

fn default_failure_source() -> String {
    "./failures.json".to_string()
}

fn default_gemini_base_url() -> String {
    DEFAULT_GEMINI_BASE_URL.to_string()
}

fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_github_api_url() -> String {
    DEFAULT_GITHUB_API_URL.to_string()
}

fn default_user_agent() -> String {
    "kintsugi".to_string()
}

fn default_max_log_lines() -> usize {
    DEFAULT_MAX_LOG_LINES
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            failure_source: default_failure_source(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_github_api_url(),
            user_agent: default_user_agent(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_log_lines: default_max_log_lines(),
        }
    }
}

fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"))
}

/// 未替換的 `${VAR}` 或空字串視為未設定
fn usable_secret(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !env_var_regex().is_match(v))
}

impl KintsugiConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(KintsugiError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 檔案不存在時使用預設值
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(
                "Config file {} not found, using defaults",
                path.as_ref().display()
            );
            let mut config = Self::default();
            config.apply_env_fallbacks();
            Ok(config)
        }
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content);

        let mut config: Self =
            toml::from_str(&processed_content).map_err(|e| KintsugiError::ConfigError {
                message: format!("TOML parsing error: {}", e),
            })?;
        config.apply_env_fallbacks();
        Ok(config)
    }

    /// 替換環境變數 (例如 ${GEMINI_API_KEY})
    fn substitute_env_vars(content: &str) -> String {
        env_var_regex()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    fn apply_env_fallbacks(&mut self) {
        if usable_secret(self.gemini.api_key.as_ref()).is_none() {
            self.gemini.api_key = std::env::var(GEMINI_API_KEY_ENV).ok();
        }
        if usable_secret(self.github.token.as_ref()).is_none() {
            self.github.token = std::env::var(GITHUB_TOKEN_ENV).ok();
        }
    }

    /// 沒有 API key 時回傳 None，代表只用規則式分析
    pub fn gemini_settings(&self) -> Option<GeminiSettings> {
        let api_key = usable_secret(self.gemini.api_key.as_ref())?;
        Some(GeminiSettings {
            api_key,
            base_url: self.gemini.base_url.clone(),
            model: self.gemini.model.clone(),
            temperature: self.gemini.temperature,
            timeout_seconds: self.gemini.timeout_seconds,
        })
    }

    pub fn github_settings(&self) -> Result<GitHubSettings> {
        let token = usable_secret(self.github.token.as_ref()).ok_or_else(|| {
            KintsugiError::MissingConfigError {
                field: format!("github.token (or {})", GITHUB_TOKEN_ENV),
            }
        })?;
        validation::validate_github_token("github.token", &token)?;
        Ok(GitHubSettings {
            api_url: self.github.api_url.clone(),
            token,
            user_agent: self.github.user_agent.clone(),
            timeout_seconds: self.github.timeout_seconds,
        })
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("service.name", &self.service.name)?;
        validation::validate_path("storage.data_dir", &self.storage.data_dir)?;

        let source = &self.service.failure_source;
        if source.starts_with("http://") || source.starts_with("https://") {
            validation::validate_url("service.failure_source", source)?;
        } else {
            validation::validate_path("service.failure_source", source)?;
        }

        validation::validate_url("gemini.base_url", &self.gemini.base_url)?;
        validation::validate_non_empty_string("gemini.model", &self.gemini.model)?;
        validation::validate_range("gemini.temperature", self.gemini.temperature, 0.0, 2.0)?;
        validation::validate_positive_number(
            "gemini.timeout_seconds",
            self.gemini.timeout_seconds as usize,
            1,
        )?;

        validation::validate_url("github.api_url", &self.github.api_url)?;
        validation::validate_non_empty_string("github.user_agent", &self.github.user_agent)?;
        if let Some(token) = usable_secret(self.github.token.as_ref()) {
            validation::validate_github_token("github.token", &token)?;
        }

        validation::validate_positive_number("analysis.max_log_lines", self.analysis.max_log_lines, 1)?;
        Ok(())
    }
}

impl ConfigProvider for KintsugiConfig {
    fn failure_source(&self) -> &str {
        &self.service.failure_source
    }

    fn data_dir(&self) -> &str {
        &self.storage.data_dir
    }

    fn auto_approve_low_risk(&self) -> bool {
        self.review.auto_approve_low_risk
    }
}

impl Validate for KintsugiConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
