use crate::domain::model::{AppliedFix, FileChange, FixRecord, FixSuggestion};
use crate::domain::ports::FixApplier;
use crate::utils::error::{KintsugiError, Result};
use crate::utils::validation::{validate_github_token, validate_repository};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const BRANCH_PREFIX: &str = "kintsugi/fix-";
const BRANCH_EXISTS_MESSAGE: &str = "Reference already exists";

#[derive(Debug, Clone)]
pub struct GitHubSettings {
    pub api_url: String,
    pub token: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
}

impl GitHubSettings {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_GITHUB_API_URL.to_string(),
            token: token.into(),
            user_agent: "kintsugi".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// 建立分支、寫入檔案、開 PR 所需的資料
#[derive(Debug, Clone)]
pub struct ApplyFixRequest {
    pub repository: String,
    pub base_branch: String,
    pub branch: String,
    pub commit_message: String,
    pub title: String,
    pub body: String,
    pub changes: Vec<FileChange>,
}

impl ApplyFixRequest {
    pub fn from_fix(fix: &FixRecord) -> Self {
        let s = &fix.suggestion;
        Self {
            repository: fix.repository.clone(),
            base_branch: fix.base_branch.clone(),
            branch: branch_name(&fix.id),
            commit_message: format!("fix(ci): resolve {} failure\n\n{}", s.error_type, s.root_cause),
            title: format!("[Kintsugi] Fix {} failure on {}", s.error_type, fix.base_branch),
            body: pull_request_body(fix.failure_id.as_str(), s),
            changes: s.file_changes.clone(),
        }
    }
}

pub fn branch_name(fix_id: &str) -> String {
    let short: String = fix_id.chars().filter(|c| *c != '-').take(8).collect();
    format!("{}{}", BRANCH_PREFIX, short)
}

pub fn pull_request_body(failure_id: &str, suggestion: &FixSuggestion) -> String {
    let mut body = String::new();
    body.push_str("## Automated fix suggested by Kintsugi\n\n");
    body.push_str(&format!("**Failure:** `{}`\n", failure_id));
    body.push_str(&format!(
        "**Error type:** {} ({} project)\n",
        suggestion.error_type, suggestion.project_type
    ));
    body.push_str(&format!(
        "**Severity:** {} | **Risk:** {} | **Confidence:** {:.0}%\n\n",
        suggestion.severity,
        suggestion.risk_level,
        suggestion.confidence * 100.0
    ));
    body.push_str("### Root cause\n\n");
    body.push_str(&suggestion.root_cause);
    body.push_str("\n\n### Suggested steps\n\n");
    for (i, step) in suggestion.suggested_steps.iter().enumerate() {
        body.push_str(&format!("{}. {}\n", i + 1, step));
    }
    body.push_str("\n### Changed files\n\n");
    for change in &suggestion.file_changes {
        body.push_str(&format!("- `{}`\n", change.path));
    }
    body
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitCommit {
    tree: GitObject,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct GitHubErrorBody {
    message: Option<String>,
}

pub struct GitHubClient {
    settings: GitHubSettings,
    client: Client,
}

impl GitHubClient {
    pub fn new(settings: GitHubSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self { settings, client })
    }

    fn url(&self, repository: &str, path: &str) -> String {
        format!(
            "{}/repos/{}/{}",
            self.settings.api_url.trim_end_matches('/'),
            repository,
            path
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.settings.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// 送出請求並把非 2xx 轉成帶步驟名稱的錯誤
    async fn send<T: DeserializeOwned>(&self, step: &str, builder: RequestBuilder) -> Result<T> {
        let step_error = |status: u16, message: String| KintsugiError::GitHubStepError {
            step: step.to_string(),
            status,
            message,
        };

        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| step_error(0, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GitHubErrorBody>(&text)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or(text);
            return Err(step_error(status.as_u16(), message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| step_error(status.as_u16(), format!("unexpected response: {}", e)))
    }

    fn validate_request(&self, request: &ApplyFixRequest) -> Result<()> {
        validate_repository("repository", &request.repository)?;
        validate_github_token("github.token", &self.settings.token)?;
        if request.base_branch.trim().is_empty() {
            return Err(KintsugiError::validation("base branch cannot be empty"));
        }
        if request.changes.is_empty() {
            return Err(KintsugiError::validation(
                "fix has no file changes to apply",
            ));
        }
        if let Some(bad) = request
            .changes
            .iter()
            .find(|c| c.path.trim().is_empty() || c.path.starts_with('/') || c.path.contains(".."))
        {
            return Err(KintsugiError::validation(format!(
                "invalid file path in change set: '{}'",
                bad.path
            )));
        }
        Ok(())
    }

    /// 依序：取得 base commit、建立分支、寫入檔案、開 PR。不重試也不回滾
    pub async fn apply_fix(&self, request: &ApplyFixRequest) -> Result<AppliedFix> {
        self.validate_request(request)?;
        let repo = request.repository.as_str();

        tracing::info!(
            "🔧 Applying fix to {} ({} file(s)) on branch {}",
            repo,
            request.changes.len(),
            request.branch
        );

        // 1. base branch
        let base_ref: GitRef = self
            .send(
                "get_base_ref",
                self.client
                    .get(self.url(repo, &format!("git/ref/heads/{}", request.base_branch))),
            )
            .await?;
        let base_sha = base_ref.object.sha;
        let base_commit: GitCommit = self
            .send(
                "get_base_commit",
                self.client
                    .get(self.url(repo, &format!("git/commits/{}", base_sha))),
            )
            .await?;
        tracing::debug!("Base {} at {}", request.base_branch, base_sha);

        // 2. branch
        let created: Result<serde_json::Value> = self
            .send(
                "create_branch",
                self.client.post(self.url(repo, "git/refs")).json(&json!({
                    "ref": format!("refs/heads/{}", request.branch),
                    "sha": base_sha,
                })),
            )
            .await;
        match created {
            Ok(_) => {}
            // 上一次套用失敗時留下的分支，沿用後以 force 更新
            Err(KintsugiError::GitHubStepError { status: 422, message, .. })
                if message.contains(BRANCH_EXISTS_MESSAGE) =>
            {
                tracing::warn!("⚠️ Branch {} already exists, reusing it", request.branch);
            }
            Err(e) => return Err(e),
        }

        // 3. files
        let mut tree_entries = Vec::with_capacity(request.changes.len());
        for change in &request.changes {
            let blob: GitObject = self
                .send(
                    "create_blob",
                    self.client.post(self.url(repo, "git/blobs")).json(&json!({
                        "content": change.content,
                        "encoding": "utf-8",
                    })),
                )
                .await?;
            tree_entries.push(json!({
                "path": change.path,
                "mode": "100644",
                "type": "blob",
                "sha": blob.sha,
            }));
        }

        let tree: GitObject = self
            .send(
                "create_tree",
                self.client.post(self.url(repo, "git/trees")).json(&json!({
                    "base_tree": base_commit.tree.sha,
                    "tree": tree_entries,
                })),
            )
            .await?;

        let commit: GitObject = self
            .send(
                "create_commit",
                self.client.post(self.url(repo, "git/commits")).json(&json!({
                    "message": request.commit_message,
                    "tree": tree.sha,
                    "parents": [base_sha],
                })),
            )
            .await?;

        let _: serde_json::Value = self
            .send(
                "update_branch",
                self.client
                    .patch(self.url(repo, &format!("git/refs/heads/{}", request.branch)))
                    .json(&json!({ "sha": commit.sha, "force": true })),
            )
            .await?;

        // 4. pull request
        let pr: PullRequest = self
            .send(
                "create_pull_request",
                self.client.post(self.url(repo, "pulls")).json(&json!({
                    "title": request.title,
                    "head": request.branch,
                    "base": request.base_branch,
                    "body": request.body,
                })),
            )
            .await?;

        tracing::info!("✅ Opened pull request #{}: {}", pr.number, pr.html_url);

        Ok(AppliedFix {
            branch: request.branch.clone(),
            commit_sha: commit.sha,
            pull_request_number: pr.number,
            pull_request_url: pr.html_url,
        })
    }
}

#[async_trait]
impl FixApplier for GitHubClient {
    async fn apply(&self, fix: &FixRecord) -> Result<AppliedFix> {
        self.apply_fix(&ApplyFixRequest::from_fix(fix)).await
    }
}
