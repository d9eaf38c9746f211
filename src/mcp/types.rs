//! Wire types for the call envelope shared by the protocol client and the
//! MCP server. Both sides use the same param structs so the shapes cannot
//! drift apart.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::github::{Issue, PullRequest, StateFilter, DEFAULT_BASE_BRANCH};

/// A single remote call: a namespaced method name plus its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Response envelope. Exactly one of `result` and `error` is populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl McpResponse {
    pub fn result(value: Value) -> Self {
        Self {
            result: Some(value),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(message.into()),
        }
    }
}

/// The recognized method names.
pub mod methods {
    pub const LIST_ISSUES: &str = "github.list_issues";
    pub const GET_ISSUE: &str = "github.get_issue";
    pub const CLOSE_ISSUE: &str = "github.close_issue";
    pub const ADD_ISSUE_COMMENT: &str = "github.add_issue_comment";
    pub const CREATE_PULL_REQUEST: &str = "github.create_pull_request";
    pub const CREATE_BRANCH: &str = "github.create_branch";
    pub const CREATE_FILE: &str = "github.create_file";
}

fn default_base_branch() -> String {
    DEFAULT_BASE_BRANCH.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListIssuesParams {
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub state: StateFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetIssueParams {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseIssueParams {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCommentParams {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePullRequestParams {
    pub owner: String,
    pub repo: String,
    pub title: String,
    pub body: String,
    pub head: String,
    #[serde(default = "default_base_branch")]
    pub base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBranchParams {
    pub owner: String,
    pub repo: String,
    pub branch_name: String,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFileParams {
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub content: String,
    pub branch: String,
    pub message: String,
}

/// `result` payload of `github.list_issues`. Elements stay raw so a malformed
/// issue can be skipped without discarding the rest of the batch.
#[derive(Debug, Serialize, Deserialize)]
pub struct IssuesResult {
    #[serde(default)]
    pub issues: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssueResult {
    #[serde(default)]
    pub issue: Option<Issue>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResult {
    #[serde(default)]
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PullRequestResult {
    #[serde(default)]
    pub pull_request: Option<PullRequest>,
}
