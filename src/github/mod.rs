pub mod types;

pub use types::{Issue, IssueState, Label, PullRequest, RepoId, StateFilter};

#[cfg(test)]
pub use types::fixtures;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

const GITHUB_API_URL: &str = "https://api.github.com";

/// Branch that new branches and pull requests are based on.
pub const DEFAULT_BASE_BRANCH: &str = "main";

#[derive(Debug, Error)]
pub enum OpsError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("GitHub API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("MCP server error: {0}")]
    Server(String),

    #[error("malformed payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for OpsError {
    fn from(err: reqwest::Error) -> Self {
        OpsError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for OpsError {
    fn from(err: serde_json::Error) -> Self {
        OpsError::Decode(err.to_string())
    }
}

/// The seven GitHub operations the rest of the system is allowed to perform.
///
/// Implemented by both the REST gateway ([`GitHubClient`]) and the protocol
/// client ([`crate::mcp::McpClient`]), so decision logic can run against
/// either side of the proxy, or an in-memory fake in tests.
#[async_trait]
pub trait GitHubOps: Send + Sync {
    async fn list_issues(
        &self,
        repo: &RepoId,
        labels: &[String],
        state: StateFilter,
    ) -> Result<Vec<Issue>, OpsError>;

    async fn get_issue(&self, repo: &RepoId, number: u64) -> Result<Option<Issue>, OpsError>;

    /// Close an issue, optionally adding a comment after the close succeeds.
    /// A failed follow-up comment does not undo the close.
    async fn close_issue(
        &self,
        repo: &RepoId,
        number: u64,
        comment: Option<&str>,
    ) -> Result<bool, OpsError>;

    async fn add_issue_comment(
        &self,
        repo: &RepoId,
        number: u64,
        comment: &str,
    ) -> Result<bool, OpsError>;

    /// Create `branch_name` from the head of `base_branch`. The base ref is
    /// resolved first; creation is not attempted if that lookup fails.
    async fn create_branch(
        &self,
        repo: &RepoId,
        branch_name: &str,
        base_branch: &str,
    ) -> Result<bool, OpsError>;

    async fn create_file(
        &self,
        repo: &RepoId,
        path: &str,
        content: &str,
        branch: &str,
        message: &str,
    ) -> Result<bool, OpsError>;

    async fn create_pull_request(
        &self,
        repo: &RepoId,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequest>, OpsError>;
}

/// Direct GitHub REST gateway. One API mutation/query per call; holds a single
/// connection pool for the lifetime of the client.
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
}

impl GitHubClient {
    pub fn new(token: &str) -> Result<Self, OpsError> {
        Self::with_base_url(token, GITHUB_API_URL)
    }

    /// Point the gateway at a different API root (used against test servers).
    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self, OpsError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("token {token}"))
            .map_err(|_| OpsError::Decode("GitHub token contains invalid header characters".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.v3+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("ai-task-agent"));
        let http = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// GitHub's documented success code is the sole success signal per operation;
/// anything else is an API failure carrying the response body.
async fn expect_status(
    response: reqwest::Response,
    expected: StatusCode,
) -> Result<reqwest::Response, OpsError> {
    let status = response.status();
    if status == expected {
        Ok(response)
    } else {
        let message = response.text().await.unwrap_or_default();
        Err(OpsError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn extract_ref_sha(ref_data: &Value) -> Result<String, OpsError> {
    ref_data
        .pointer("/object/sha")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| OpsError::Decode("git ref response missing object.sha".to_string()))
}

#[async_trait]
impl GitHubOps for GitHubClient {
    async fn list_issues(
        &self,
        repo: &RepoId,
        labels: &[String],
        state: StateFilter,
    ) -> Result<Vec<Issue>, OpsError> {
        let url = self.url(&format!("/repos/{}/{}/issues", repo.owner, repo.repo));
        let mut request = self.http.get(&url).query(&[("state", state.as_str())]);
        if !labels.is_empty() {
            request = request.query(&[("labels", labels.join(","))]);
        }
        debug!(%repo, state = state.as_str(), ?labels, "listing issues");
        let response = expect_status(request.send().await?, StatusCode::OK).await?;
        let values: Vec<Value> = response.json().await?;
        let issues = types::parse_issues(values);
        info!(%repo, count = issues.len(), "listed issues");
        Ok(issues)
    }

    async fn get_issue(&self, repo: &RepoId, number: u64) -> Result<Option<Issue>, OpsError> {
        let url = self.url(&format!("/repos/{}/{}/issues/{number}", repo.owner, repo.repo));
        debug!(%repo, issue = number, "fetching issue");
        let response = self.http.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = expect_status(response, StatusCode::OK).await?;
        let value: Value = response.json().await?;
        let issue = serde_json::from_value::<Issue>(value)?;
        Ok(Some(issue))
    }

    async fn close_issue(
        &self,
        repo: &RepoId,
        number: u64,
        comment: Option<&str>,
    ) -> Result<bool, OpsError> {
        let url = self.url(&format!("/repos/{}/{}/issues/{number}", repo.owner, repo.repo));
        info!(%repo, issue = number, "closing issue");
        let response = self
            .http
            .patch(&url)
            .json(&json!({"state": "closed"}))
            .send()
            .await?;
        expect_status(response, StatusCode::OK).await?;
        if let Some(comment) = comment {
            if let Err(err) = self.add_issue_comment(repo, number, comment).await {
                warn!(%repo, issue = number, %err, "issue closed but follow-up comment failed");
            }
        }
        Ok(true)
    }

    async fn add_issue_comment(
        &self,
        repo: &RepoId,
        number: u64,
        comment: &str,
    ) -> Result<bool, OpsError> {
        let url = self.url(&format!(
            "/repos/{}/{}/issues/{number}/comments",
            repo.owner, repo.repo
        ));
        info!(%repo, issue = number, "adding issue comment");
        let response = self.http.post(&url).json(&json!({"body": comment})).send().await?;
        expect_status(response, StatusCode::CREATED).await?;
        Ok(true)
    }

    async fn create_branch(
        &self,
        repo: &RepoId,
        branch_name: &str,
        base_branch: &str,
    ) -> Result<bool, OpsError> {
        let ref_url = self.url(&format!(
            "/repos/{}/{}/git/ref/heads/{base_branch}",
            repo.owner, repo.repo
        ));
        info!(%repo, branch = branch_name, base = base_branch, "creating branch");
        let response = expect_status(self.http.get(&ref_url).send().await?, StatusCode::OK).await?;
        let ref_data: Value = response.json().await?;
        let sha = extract_ref_sha(&ref_data)?;

        let create_url = self.url(&format!("/repos/{}/{}/git/refs", repo.owner, repo.repo));
        let body = json!({
            "ref": format!("refs/heads/{branch_name}"),
            "sha": sha,
        });
        let response = self.http.post(&create_url).json(&body).send().await?;
        expect_status(response, StatusCode::CREATED).await?;
        Ok(true)
    }

    async fn create_file(
        &self,
        repo: &RepoId,
        path: &str,
        content: &str,
        branch: &str,
        message: &str,
    ) -> Result<bool, OpsError> {
        let url = self.url(&format!("/repos/{}/{}/contents/{path}", repo.owner, repo.repo));
        info!(%repo, path, branch, "creating file");
        // The contents API only accepts base64-encoded content.
        let body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "branch": branch,
        });
        let response = self.http.put(&url).json(&body).send().await?;
        expect_status(response, StatusCode::CREATED).await?;
        Ok(true)
    }

    async fn create_pull_request(
        &self,
        repo: &RepoId,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequest>, OpsError> {
        let url = self.url(&format!("/repos/{}/{}/pulls", repo.owner, repo.repo));
        info!(%repo, head, base, "creating pull request");
        let payload = json!({
            "title": title,
            "body": body,
            "head": head,
            "base": base,
        });
        let response = self.http.post(&url).json(&payload).send().await?;
        let response = expect_status(response, StatusCode::CREATED).await?;
        let pr: PullRequest = response.json().await?;
        info!(%repo, pr = pr.number, "created pull request");
        Ok(Some(pr))
    }
}
