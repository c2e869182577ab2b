use crate::utils::error::{KintsugiError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// GitHub token 前綴
const GITHUB_TOKEN_PREFIXES: &[&str] = &["ghp_", "github_pat_", "gho_", "ghu_", "ghs_", "ghr_"];

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(KintsugiError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(KintsugiError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(KintsugiError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(KintsugiError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(KintsugiError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(KintsugiError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(KintsugiError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(KintsugiError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// `owner/repo` 格式，兩段都不能為空
pub fn validate_repository(field_name: &str, repository: &str) -> Result<()> {
    let parts: Vec<&str> = repository.split('/').collect();
    if parts.len() == 2 && parts.iter().all(|p| !p.trim().is_empty()) {
        return Ok(());
    }
    Err(KintsugiError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: repository.to_string(),
        reason: "Repository must be in 'owner/repo' format".to_string(),
    })
}

/// 只檢查格式，不驗證 token 是否有效
pub fn is_valid_github_token(token: &str) -> bool {
    !token.is_empty()
        && GITHUB_TOKEN_PREFIXES
            .iter()
            .any(|prefix| token.starts_with(prefix))
}

pub fn validate_github_token(field_name: &str, token: &str) -> Result<()> {
    if is_valid_github_token(token) {
        return Ok(());
    }
    Err(KintsugiError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: "<redacted>".to_string(),
        reason: format!(
            "Token does not look like a GitHub token (expected prefix: {})",
            GITHUB_TOKEN_PREFIXES.join(", ")
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("gemini.base_url", "https://example.com").is_ok());
        assert!(validate_url("gemini.base_url", "http://example.com").is_ok());
        assert!(validate_url("gemini.base_url", "").is_err());
        assert!(validate_url("gemini.base_url", "invalid-url").is_err());
        assert!(validate_url("gemini.base_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("analysis.max_log_lines", 5, 1).is_ok());
        assert!(validate_positive_number("analysis.max_log_lines", 0, 1).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("gemini.temperature", 0.2, 0.0, 2.0).is_ok());
        assert!(validate_range("gemini.temperature", 2.5, 0.0, 2.0).is_err());
    }

    #[test]
    fn test_validate_repository() {
        assert!(validate_repository("repository", "acme/web").is_ok());
        assert!(validate_repository("repository", "acme").is_err());
        assert!(validate_repository("repository", "acme/web/extra").is_err());
        assert!(validate_repository("repository", "/web").is_err());
    }

    #[test]
    fn test_github_token_prefixes() {
        assert!(is_valid_github_token("ghp_abc123"));
        assert!(is_valid_github_token("github_pat_abc123"));
        assert!(is_valid_github_token("ghs_server"));
        assert!(!is_valid_github_token(""));
        assert!(!is_valid_github_token("GHP_abc"));
        assert!(!is_valid_github_token(" ghp_abc"));
    }

    #[test]
    fn test_token_error_does_not_leak_value() {
        let err = validate_github_token("github.token", "secret-value").unwrap_err();
        assert!(!err.to_string().contains("secret-value"));
    }
}
