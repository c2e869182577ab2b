use crate::core::detection::{detect_project_type, extract_file_locations};
use crate::domain::model::{ErrorType, FixSuggestion, ProjectType, RiskLevel, Severity, SuggestionSource};
use regex::Regex;
use std::sync::OnceLock;

pub const SPECIFIC_RULE_CONFIDENCE: f32 = 0.8;
pub const UNKNOWN_CONFIDENCE: f32 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub error_type: ErrorType,
    /// 觸發分類的關鍵字；未知錯誤為 None
    pub matched: Option<&'static str>,
    pub missing_module: Option<String>,
}

/// 規則順序即優先順序，第一個命中者勝出
const RULES: &[(ErrorType, &[&str])] = &[
    (
        ErrorType::Dependency,
        &[
            "cannot find module",
            "module not found",
            "modulenotfounderror",
            "no module named",
            "could not resolve dependency",
            "eresolve",
            "unresolved import",
            "cannot find package",
            "could not resolve dependencies",
            "no matching version",
            "no matching package",
            "package not found",
            "failed to select a version",
        ],
    ),
    (
        ErrorType::TypeCheck,
        &["error ts", "type error", "typeerror: ", "mismatched types", "incompatible types", "mypy"],
    ),
    (
        ErrorType::Compilation,
        &[
            "syntaxerror",
            "syntax error",
            "compilation failed",
            "could not compile",
            "cannot find symbol",
            "error[e",
            "undefined: ",
            "compilation error",
            "build failed",
        ],
    ),
    (
        ErrorType::OutOfMemory,
        &["out of memory", "heap out of memory", "oomkilled", "java.lang.outofmemoryerror", "memoryerror"],
    ),
    (
        ErrorType::Timeout,
        &["timed out", "timeout", "exceeded the maximum execution time", "deadline exceeded"],
    ),
    (
        ErrorType::Permission,
        &[
            "permission denied",
            "eacces",
            "403 forbidden",
            "401 unauthorized",
            "bad credentials",
            "authentication failed",
            "resource not accessible by integration",
        ],
    ),
    (
        ErrorType::Network,
        &[
            "econnrefused",
            "econnreset",
            "etimedout",
            "enotfound",
            "could not resolve host",
            "connection reset",
            "connection refused",
            "network is unreachable",
            "temporary failure in name resolution",
        ],
    ),
    (
        ErrorType::DockerBuild,
        &["failed to solve", "dockerfile", "docker build", "error building image"],
    ),
    (
        ErrorType::Configuration,
        &[
            "invalid workflow file",
            "unrecognized named-value",
            "yaml",
            "is not set",
            "missing required environment variable",
            "missing script",
            "invalid configuration",
        ],
    ),
    (
        ErrorType::Lint,
        &["eslint", "prettier", "clippy", "flake8", "rubocop", "golangci-lint", "lint"],
    ),
    (
        ErrorType::TestFailure,
        &[
            "test result: failed",
            "tests failed",
            "test failed",
            "assertionerror",
            "assertion failed",
            "--- fail",
            "failed tests",
            "failures:",
            "expected:",
            "✕",
        ],
    ),
];

fn missing_module_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)(?:cannot find module|no module named|unresolved import|cannot find package|module not found: (?:error: )?can't resolve)\s+[`'"]?([\w@./\-:]+?)[`'"]?(?:\s|$|;|,)"#,
        )
        .expect("missing module pattern is valid")
    })
}

/// 依序檢查規則，回傳第一個命中的錯誤類型
pub fn classify(log: &str) -> Classification {
    let lower = log.to_lowercase();

    for (error_type, keywords) in RULES {
        if let Some(keyword) = keywords.iter().find(|k| lower.contains(*k)) {
            let missing_module = if *error_type == ErrorType::Dependency {
                extract_missing_module(log)
            } else {
                None
            };
            return Classification {
                error_type: *error_type,
                matched: Some(*keyword),
                missing_module,
            };
        }
    }

    Classification {
        error_type: ErrorType::Unknown,
        matched: None,
        missing_module: None,
    }
}

pub fn extract_missing_module(log: &str) -> Option<String> {
    let raw = missing_module_regex()
        .captures(log)
        .map(|caps| caps[1].trim_end_matches(['.', ':']).to_string())?;

    // Rust 路徑只取第一段 crate 名稱；crate/self/super 是專案內的路徑
    let module = match raw.split_once("::") {
        Some((head, _)) => head.to_string(),
        None => raw,
    };
    if module.is_empty() || matches!(module.as_str(), "crate" | "self" | "super") {
        return None;
    }
    Some(module)
}

/// 規則式分析：不需要 AI 也能產出完整建議
pub fn fallback_suggestion(log: &str) -> FixSuggestion {
    let affected_files = extract_file_locations(log);
    let project_type = detect_project_type(log, &affected_files);
    let classification = classify(log);
    let template = template_for(classification.error_type);

    let module = classification.missing_module.as_deref();
    let root_cause = match (classification.error_type, module) {
        (ErrorType::Dependency, Some(m)) => {
            format!("{} Missing module: '{}'.", template.root_cause, m)
        }
        _ => template.root_cause.to_string(),
    };

    let mut suggested_steps = project_steps(classification.error_type, project_type, module);
    suggested_steps.extend(template.steps.iter().map(|s| s.to_string()));

    let confidence = if classification.error_type == ErrorType::Unknown {
        UNKNOWN_CONFIDENCE
    } else {
        SPECIFIC_RULE_CONFIDENCE
    };

    tracing::debug!(
        "Heuristic classification: {} / {} (matched {:?})",
        classification.error_type,
        project_type,
        classification.matched
    );

    FixSuggestion {
        error_type: classification.error_type,
        project_type,
        root_cause,
        severity: template.severity,
        suggested_steps,
        risk_level: template.risk_level,
        confidence,
        affected_files,
        file_changes: Vec::new(),
        source: SuggestionSource::Heuristic,
    }
}

pub(crate) struct Template {
    pub root_cause: &'static str,
    pub severity: Severity,
    pub risk_level: RiskLevel,
    pub steps: &'static [&'static str],
}

pub(crate) fn template_for(error_type: ErrorType) -> Template {
    match error_type {
        ErrorType::Dependency => Template {
            root_cause: "A required dependency is missing or could not be resolved.",
            severity: Severity::High,
            risk_level: RiskLevel::Low,
            steps: &[
                "Commit the updated lockfile together with the manifest change",
                "Re-run the pipeline with a clean dependency cache",
            ],
        },
        ErrorType::TypeCheck => Template {
            root_cause: "Static type checking failed because of incompatible or undefined types.",
            severity: Severity::High,
            risk_level: RiskLevel::Medium,
            steps: &[
                "Open the reported files and fix the type mismatches",
                "Check recent interface or signature changes in shared code",
            ],
        },
        ErrorType::Compilation => Template {
            root_cause: "The code failed to compile.",
            severity: Severity::High,
            risk_level: RiskLevel::Medium,
            steps: &[
                "Fix the first reported compiler error; later errors are often consequences",
                "Make sure the branch is rebased on the latest base branch",
            ],
        },
        ErrorType::OutOfMemory => Template {
            root_cause: "The job ran out of memory.",
            severity: Severity::High,
            risk_level: RiskLevel::Medium,
            steps: &[
                "Increase the memory available to the job or use a larger runner",
                "Reduce parallelism of the build or test step",
            ],
        },
        ErrorType::Timeout => Template {
            root_cause: "A step exceeded its time limit.",
            severity: Severity::Medium,
            risk_level: RiskLevel::Low,
            steps: &[
                "Check whether the step hangs waiting on a service or input",
                "Raise the step timeout if the work legitimately takes longer",
                "Cache dependencies to shorten the job",
            ],
        },
        ErrorType::Permission => Template {
            root_cause: "The job lacks permissions or valid credentials for an operation.",
            severity: Severity::Critical,
            risk_level: RiskLevel::High,
            steps: &[
                "Verify the secrets referenced by the workflow exist and are not expired",
                "Check the workflow `permissions:` block and token scopes",
            ],
        },
        ErrorType::Network => Template {
            root_cause: "A network request from the job failed.",
            severity: Severity::Medium,
            risk_level: RiskLevel::Low,
            steps: &[
                "Re-run the job; transient registry or network outages are common",
                "Check that service containers are healthy before they are used",
            ],
        },
        ErrorType::DockerBuild => Template {
            root_cause: "The container image build failed.",
            severity: Severity::High,
            risk_level: RiskLevel::Medium,
            steps: &[
                "Run the failing Dockerfile instruction locally to reproduce",
                "Check that base image tags and build context paths exist",
            ],
        },
        ErrorType::Configuration => Template {
            root_cause: "The pipeline or project configuration is invalid or incomplete.",
            severity: Severity::Medium,
            risk_level: RiskLevel::Medium,
            steps: &[
                "Validate the workflow file syntax",
                "Check that all referenced environment variables and scripts are defined",
            ],
        },
        ErrorType::Lint => Template {
            root_cause: "Code style or lint checks reported violations.",
            severity: Severity::Low,
            risk_level: RiskLevel::Low,
            steps: &["Run the linter locally with autofix enabled and commit the result"],
        },
        ErrorType::TestFailure => Template {
            root_cause: "One or more tests failed.",
            severity: Severity::Medium,
            risk_level: RiskLevel::Medium,
            steps: &[
                "Run the failing tests locally to reproduce",
                "Check whether the test expectations or the implementation changed",
            ],
        },
        ErrorType::Unknown => Template {
            root_cause: "The failure could not be classified automatically.",
            severity: Severity::Medium,
            risk_level: RiskLevel::High,
            steps: &[
                "Read the full job log around the first error",
                "Re-run the job to rule out a flaky failure",
            ],
        },
    }
}

/// 針對專案類型給出具體指令
fn project_steps(error_type: ErrorType, project_type: ProjectType, missing: Option<&str>) -> Vec<String> {
    let module = missing.unwrap_or("<package>");
    let step = match (error_type, project_type) {
        (ErrorType::Dependency, ProjectType::Javascript | ProjectType::Typescript) => {
            format!("Run `npm install {}` and verify it is listed in package.json", module)
        }
        (ErrorType::Dependency, ProjectType::Python) => {
            format!("Run `pip install {}` and add it to requirements.txt", module)
        }
        (ErrorType::Dependency, ProjectType::Rust) => match missing {
            Some(krate) => format!("Run `cargo add {}` or fix the `use` path", krate),
            None => "Fix the `use` path or declare the crate in Cargo.toml".to_string(),
        },
        (ErrorType::Dependency, ProjectType::Go) => format!("Run `go get {}` then `go mod tidy`", module),
        (ErrorType::Dependency, ProjectType::Java) => {
            format!("Declare `{}` in pom.xml or build.gradle", module)
        }
        (ErrorType::Dependency, _) => format!("Add the missing dependency `{}`", module),
        (ErrorType::TypeCheck, _) => match project_type {
            ProjectType::Python => "Run `mypy` locally to list the type errors".to_string(),
            _ => "Run `npx tsc --noEmit` locally to list the type errors".to_string(),
        },
        (ErrorType::Compilation, ProjectType::Rust) => {
            "Run `cargo build` locally to reproduce".to_string()
        }
        (ErrorType::Compilation, ProjectType::Go) => "Run `go build ./...` locally to reproduce".to_string(),
        (ErrorType::Compilation, ProjectType::Java) => "Run `mvn compile` locally to reproduce".to_string(),
        (ErrorType::Compilation, ProjectType::Javascript | ProjectType::Typescript) => {
            "Run `npm run build` locally to reproduce".to_string()
        }
        (ErrorType::OutOfMemory, ProjectType::Javascript | ProjectType::Typescript) => {
            "Set `NODE_OPTIONS=--max-old-space-size=4096` for the build step".to_string()
        }
        (ErrorType::Lint, ProjectType::Javascript | ProjectType::Typescript) => {
            "Run `npx eslint . --fix`".to_string()
        }
        (ErrorType::Lint, ProjectType::Rust) => {
            "Run `cargo fmt` and `cargo clippy --fix`".to_string()
        }
        (ErrorType::Lint, ProjectType::Python) => "Run `black .` and fix remaining flake8 warnings".to_string(),
        (ErrorType::TestFailure, ProjectType::Javascript | ProjectType::Typescript) => {
            "Run `npm test` locally".to_string()
        }
        (ErrorType::TestFailure, ProjectType::Python) => "Run `pytest -x` locally".to_string(),
        (ErrorType::TestFailure, ProjectType::Rust) => "Run `cargo test` locally".to_string(),
        (ErrorType::TestFailure, ProjectType::Go) => "Run `go test ./...` locally".to_string(),
        (ErrorType::TestFailure, ProjectType::Java) => "Run `mvn test` locally".to_string(),
        _ => return Vec::new(),
    };
    vec![step]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_dependency_with_module() {
        let c = classify("Error: Cannot find module 'express'\nRequire stack:");
        assert_eq!(c.error_type, ErrorType::Dependency);
        assert_eq!(c.missing_module.as_deref(), Some("express"));
    }

    #[test]
    fn test_classify_python_missing_module() {
        let c = classify("ModuleNotFoundError: No module named 'requests'");
        assert_eq!(c.error_type, ErrorType::Dependency);
        assert_eq!(c.missing_module.as_deref(), Some("requests"));
    }

    #[test]
    fn test_rust_import_keeps_only_crate_name() {
        let log = "error[E0432]: unresolved import `serde_json::Value`\n --> src/main.rs:1:5";
        let c = classify(log);
        assert_eq!(c.error_type, ErrorType::Dependency);
        assert_eq!(c.missing_module.as_deref(), Some("serde_json"));

        let suggestion = fallback_suggestion(log);
        assert_eq!(suggestion.project_type, ProjectType::Rust);
        assert_eq!(
            suggestion.suggested_steps[0],
            "Run `cargo add serde_json` or fix the `use` path"
        );
    }

    #[test]
    fn test_local_rust_paths_are_not_crates() {
        for path in ["crate::config::Settings", "self::helpers", "super::Model"] {
            let log = format!("error[E0432]: unresolved import `{}`\n --> src/lib.rs:2:5", path);
            assert_eq!(extract_missing_module(&log), None, "path {}", path);
        }

        let suggestion = fallback_suggestion("error[E0432]: unresolved import `crate::db`\n --> src/lib.rs:2:5");
        assert_eq!(
            suggestion.suggested_steps[0],
            "Fix the `use` path or declare the crate in Cargo.toml"
        );
    }

    #[test]
    fn test_dependency_takes_priority_over_tests() {
        // Test runners often report a missing module as a failing suite.
        let log = "FAIL src/app.test.js\n  Cannot find module 'lodash' from 'app.js'\nTests failed";
        assert_eq!(classify(log).error_type, ErrorType::Dependency);
    }

    #[test]
    fn test_classify_each_category() {
        assert_eq!(classify("src/a.ts(3,1): error TS2322").error_type, ErrorType::TypeCheck);
        assert_eq!(classify("error[E0308]: oops").error_type, ErrorType::Compilation);
        assert_eq!(
            classify("FATAL ERROR: Reached heap limit Allocation failed - JavaScript heap out of memory").error_type,
            ErrorType::OutOfMemory
        );
        assert_eq!(
            classify("The job running on runner has exceeded the maximum execution time of 360 minutes.").error_type,
            ErrorType::Timeout
        );
        assert_eq!(classify("remote: Permission denied to bot").error_type, ErrorType::Permission);
        assert_eq!(classify("connect ECONNREFUSED 127.0.0.1:5432").error_type, ErrorType::Network);
        assert_eq!(
            classify("ERROR: failed to solve: process \"/bin/sh -c make\"").error_type,
            ErrorType::DockerBuild
        );
        assert_eq!(classify("npm ERR! Missing script: \"build\"").error_type, ErrorType::Configuration);
        assert_eq!(classify("✖ 3 problems (eslint)").error_type, ErrorType::Lint);
        assert_eq!(classify("test result: FAILED. 3 passed; 1 failed").error_type, ErrorType::TestFailure);
    }

    #[test]
    fn test_classify_unknown() {
        let c = classify("Process completed with exit code 1.");
        assert_eq!(c.error_type, ErrorType::Unknown);
        assert!(c.matched.is_none());
    }

    #[test]
    fn test_fallback_suggestion_node_dependency() {
        let log = "npm ERR! code 1\nError: Cannot find module 'express'\n    at node_modules/loader.js:10:15";
        let s = fallback_suggestion(log);
        assert_eq!(s.error_type, ErrorType::Dependency);
        assert_eq!(s.project_type, ProjectType::Javascript);
        assert_eq!(s.severity, Severity::High);
        assert_eq!(s.risk_level, RiskLevel::Low);
        assert_eq!(s.source, SuggestionSource::Heuristic);
        assert!(s.root_cause.contains("express"));
        assert_eq!(s.suggested_steps[0], "Run `npm install express` and verify it is listed in package.json");
        assert!((s.confidence - SPECIFIC_RULE_CONFIDENCE).abs() < f32::EPSILON);
        assert!(s.file_changes.is_empty());
    }

    #[test]
    fn test_fallback_suggestion_python_dependency() {
        let log = "Traceback (most recent call last):\nModuleNotFoundError: No module named 'yaml'";
        let s = fallback_suggestion(log);
        assert_eq!(s.project_type, ProjectType::Python);
        assert!(s.suggested_steps[0].contains("pip install yaml"));
    }

    #[test]
    fn test_fallback_for_empty_log_is_unknown_high_risk() {
        let s = fallback_suggestion("   ");
        assert_eq!(s.error_type, ErrorType::Unknown);
        assert_eq!(s.project_type, ProjectType::Unknown);
        assert_eq!(s.risk_level, RiskLevel::High);
        assert!((s.confidence - UNKNOWN_CONFIDENCE).abs() < f32::EPSILON);
        assert!(!s.suggested_steps.is_empty());
    }

    #[test]
    fn test_fallback_collects_affected_files() {
        let log = "src/main.rs:4:5 error[E0425]: cannot find value\nerror: could not compile `app`";
        let s = fallback_suggestion(log);
        assert_eq!(s.project_type, ProjectType::Rust);
        assert_eq!(s.error_type, ErrorType::Compilation);
        assert_eq!(s.affected_files, vec!["src/main.rs".to_string()]);
        assert_eq!(s.suggested_steps[0], "Run `cargo build` locally to reproduce");
    }
}
