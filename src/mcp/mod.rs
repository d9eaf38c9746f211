pub mod types;

pub use types::{McpRequest, McpResponse};

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::github::types::parse_issues;
use crate::github::{GitHubOps, Issue, OpsError, PullRequest, RepoId, StateFilter};
use types::{
    methods, AddCommentParams, CloseIssueParams, CreateBranchParams, CreateFileParams,
    CreatePullRequestParams, GetIssueParams, IssueResult, IssuesResult, ListIssuesParams,
    PullRequestResult, SuccessResult,
};

/// Retry strategy for protocol calls. The default performs no retries: every
/// failure is terminal for that operation and reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_backoff: Duration,
}

const BACKOFF_CAP: Duration = Duration::from_secs(30);

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
        }
    }

    /// Retry transport failures up to `max_attempts` total tries, doubling the
    /// backoff after each failed attempt.
    pub fn exponential(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff after the given failed attempt (1-based), capped at 30 seconds.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor).min(BACKOFF_CAP)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Client side of the MCP protocol: wraps every GitHub operation as a named
/// remote call with a uniform request/response envelope. The decision layer
/// only ever talks to GitHub through this.
pub struct McpClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl McpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Issue one `method(params)` round trip against the proxy. Only transport
    /// failures are retried; errors reported by the server are terminal.
    pub async fn call<P: Serialize>(&self, method: &str, params: &P) -> Result<Value, OpsError> {
        let params = serde_json::to_value(params)?;
        let mut attempt = 1;
        loop {
            debug!(method, attempt, "mcp call");
            match self.send(method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(err @ OpsError::Transport(_)) if attempt < self.retry.max_attempts() => {
                    let backoff = self.retry.backoff_for(attempt);
                    warn!(method, attempt, %err, ?backoff, "transport failure, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(method, %err, "mcp call failed");
                    return Err(err);
                }
            }
        }
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, OpsError> {
        let request = McpRequest {
            method: method.to_string(),
            params,
        };
        let response = self
            .http
            .post(format!("{}/call", self.base_url))
            .json(&request)
            .send()
            .await?;
        let envelope: McpResponse = response.error_for_status()?.json().await?;
        match (envelope.result, envelope.error) {
            (_, Some(error)) => Err(OpsError::Server(error)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(OpsError::Decode(
                "response carried neither result nor error".to_string(),
            )),
        }
    }

    fn decode<T: DeserializeOwned>(value: Value) -> Result<T, OpsError> {
        serde_json::from_value(value).map_err(Into::into)
    }
}

#[async_trait]
impl GitHubOps for McpClient {
    async fn list_issues(
        &self,
        repo: &RepoId,
        labels: &[String],
        state: StateFilter,
    ) -> Result<Vec<Issue>, OpsError> {
        let params = ListIssuesParams {
            owner: repo.owner.clone(),
            repo: repo.repo.clone(),
            labels: labels.to_vec(),
            state,
        };
        let result = self.call(methods::LIST_ISSUES, &params).await?;
        let decoded: IssuesResult = Self::decode(result)?;
        let issues = parse_issues(decoded.issues);
        info!(%repo, count = issues.len(), "listed issues via proxy");
        Ok(issues)
    }

    async fn get_issue(&self, repo: &RepoId, number: u64) -> Result<Option<Issue>, OpsError> {
        let params = GetIssueParams {
            owner: repo.owner.clone(),
            repo: repo.repo.clone(),
            issue_number: number,
        };
        let result = self.call(methods::GET_ISSUE, &params).await?;
        let decoded: IssueResult = Self::decode(result)?;
        Ok(decoded.issue)
    }

    async fn close_issue(
        &self,
        repo: &RepoId,
        number: u64,
        comment: Option<&str>,
    ) -> Result<bool, OpsError> {
        info!(%repo, issue = number, "closing issue via proxy");
        let params = CloseIssueParams {
            owner: repo.owner.clone(),
            repo: repo.repo.clone(),
            issue_number: number,
            comment: comment.map(str::to_string),
        };
        let decoded: SuccessResult = Self::decode(self.call(methods::CLOSE_ISSUE, &params).await?)?;
        Ok(decoded.success)
    }

    async fn add_issue_comment(
        &self,
        repo: &RepoId,
        number: u64,
        comment: &str,
    ) -> Result<bool, OpsError> {
        info!(%repo, issue = number, "adding comment via proxy");
        let params = AddCommentParams {
            owner: repo.owner.clone(),
            repo: repo.repo.clone(),
            issue_number: number,
            comment: comment.to_string(),
        };
        let decoded: SuccessResult =
            Self::decode(self.call(methods::ADD_ISSUE_COMMENT, &params).await?)?;
        Ok(decoded.success)
    }

    async fn create_branch(
        &self,
        repo: &RepoId,
        branch_name: &str,
        base_branch: &str,
    ) -> Result<bool, OpsError> {
        info!(%repo, branch = branch_name, base = base_branch, "creating branch via proxy");
        let params = CreateBranchParams {
            owner: repo.owner.clone(),
            repo: repo.repo.clone(),
            branch_name: branch_name.to_string(),
            base_branch: base_branch.to_string(),
        };
        let decoded: SuccessResult =
            Self::decode(self.call(methods::CREATE_BRANCH, &params).await?)?;
        Ok(decoded.success)
    }

    async fn create_file(
        &self,
        repo: &RepoId,
        path: &str,
        content: &str,
        branch: &str,
        message: &str,
    ) -> Result<bool, OpsError> {
        info!(%repo, path, branch, "creating file via proxy");
        let params = CreateFileParams {
            owner: repo.owner.clone(),
            repo: repo.repo.clone(),
            path: path.to_string(),
            content: content.to_string(),
            branch: branch.to_string(),
            message: message.to_string(),
        };
        let decoded: SuccessResult = Self::decode(self.call(methods::CREATE_FILE, &params).await?)?;
        Ok(decoded.success)
    }

    async fn create_pull_request(
        &self,
        repo: &RepoId,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequest>, OpsError> {
        info!(%repo, head, base, "creating pull request via proxy");
        let params = CreatePullRequestParams {
            owner: repo.owner.clone(),
            repo: repo.repo.clone(),
            title: title.to_string(),
            body: body.to_string(),
            head: head.to_string(),
            base: base.to_string(),
        };
        let decoded: PullRequestResult =
            Self::decode(self.call(methods::CREATE_PULL_REQUEST, &params).await?)?;
        Ok(decoded.pull_request)
    }
}
