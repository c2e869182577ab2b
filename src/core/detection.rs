use crate::domain::model::ProjectType;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const MAX_FILE_LOCATIONS: usize = 20;

/// 依宣告順序排列；同分時取先宣告者
const PROJECT_KEYWORDS: &[(ProjectType, &[&str])] = &[
    (
        ProjectType::Typescript,
        &["tsc", "error ts", "tsconfig", ".ts:", ".tsx", "ts-node", "ts-jest"],
    ),
    (
        ProjectType::Javascript,
        &[
            "npm err!",
            "npm error",
            "node_modules",
            "package.json",
            "yarn",
            "pnpm",
            "jest",
            "eslint",
            "webpack",
            "node:internal",
            ".js:",
        ],
    ),
    (
        ProjectType::Python,
        &[
            "traceback (most recent call last)",
            "pip install",
            "pip ",
            "pytest",
            "modulenotfounderror",
            "requirements.txt",
            "pyproject.toml",
            ".py\"",
            ".py:",
            "flake8",
            "mypy",
        ],
    ),
    (
        ProjectType::Rust,
        &["cargo", "rustc", "error[e", "cargo.toml", "clippy", ".rs:"],
    ),
    (
        ProjectType::Go,
        &["go build", "go test", "go: ", "go.mod", "go.sum", ".go:", "golangci"],
    ),
    (
        ProjectType::Java,
        &[
            "mvn",
            "maven",
            "gradle",
            "build failure",
            ".java:",
            "exception in thread",
            "pom.xml",
        ],
    ),
    (
        ProjectType::Docker,
        &["dockerfile", "docker build", "failed to solve", "buildkit", "docker compose"],
    ),
];

const EXTENSION_HINTS: &[(&str, ProjectType)] = &[
    (".tsx", ProjectType::Typescript),
    (".ts", ProjectType::Typescript),
    (".jsx", ProjectType::Javascript),
    (".mjs", ProjectType::Javascript),
    (".js", ProjectType::Javascript),
    (".py", ProjectType::Python),
    (".rs", ProjectType::Rust),
    (".go", ProjectType::Go),
    (".java", ProjectType::Java),
    (".kt", ProjectType::Java),
    ("dockerfile", ProjectType::Docker),
];

fn file_location_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[\s(\x22'])((?:[\w.\-]+/)*[\w.\-]+\.[A-Za-z]{1,5}):(\d+)(?::(\d+))?")
            .expect("file location pattern is valid")
    })
}

/// 以關鍵字計分判斷專案類型
pub fn detect_project_type(log: &str, files: &[String]) -> ProjectType {
    let lower = log.to_lowercase();
    let mut best = ProjectType::Unknown;
    let mut best_score = 0usize;

    for (project_type, keywords) in PROJECT_KEYWORDS {
        let mut score = keywords.iter().filter(|k| lower.contains(*k)).count();
        score += files
            .iter()
            .filter(|f| extension_hint(f) == Some(*project_type))
            .count();

        if score > best_score {
            best = *project_type;
            best_score = score;
        }
    }

    // TypeScript 專案的 log 通常也會有大量 npm/node 關鍵字
    if best == ProjectType::Javascript && has_typescript_markers(&lower, files) {
        return ProjectType::Typescript;
    }

    tracing::debug!("Detected project type {} (score {})", best, best_score);
    best
}

fn has_typescript_markers(lower_log: &str, files: &[String]) -> bool {
    lower_log.contains("error ts")
        || lower_log.contains("tsc")
        || lower_log.contains(".ts:")
        || files
            .iter()
            .any(|f| extension_hint(f) == Some(ProjectType::Typescript))
}

fn extension_hint(file: &str) -> Option<ProjectType> {
    let lower = file.to_lowercase();
    EXTENSION_HINTS
        .iter()
        .find(|(ext, _)| lower.ends_with(ext))
        .map(|(_, project_type)| *project_type)
}

/// 從 log 取出 `path:line[:col]` 形式的檔案路徑，保留第一次出現的順序
pub fn extract_file_locations(log: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for caps in file_location_regex().captures_iter(log) {
        let path = caps[1].to_string();
        // 排除 URL 與版本號之類的誤判
        if path.starts_with("http") || path.chars().all(|c| c.is_ascii_digit() || c == '.') {
            continue;
        }
        if seen.insert(path.clone()) {
            files.push(path);
            if files.len() >= MAX_FILE_LOCATIONS {
                break;
            }
        }
    }

    files
}
