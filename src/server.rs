//! MCP server: hosts the operations gateway behind the `/call` envelope so
//! the agent side never needs GitHub credentials of its own.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::github::{GitHubOps, RepoId};
use crate::mcp::types::{
    methods, AddCommentParams, CloseIssueParams, CreateBranchParams, CreateFileParams,
    CreatePullRequestParams, GetIssueParams, ListIssuesParams,
};
use crate::mcp::{McpRequest, McpResponse};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Serve the `/call` endpoint until the process is stopped.
pub async fn run<O: GitHubOps + 'static>(ops: O, host: &str, port: u16) -> Result<(), ServerError> {
    let app = router(Arc::new(ops));
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;
    info!("MCP server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router<O: GitHubOps + 'static>(ops: Arc<O>) -> Router {
    Router::new()
        .route("/call", post(handle_call::<O>))
        .with_state(ops)
}

async fn handle_call<O: GitHubOps>(
    State(ops): State<Arc<O>>,
    Json(request): Json<McpRequest>,
) -> Json<McpResponse> {
    Json(dispatch(ops.as_ref(), request).await)
}

/// Route one envelope request to the matching gateway operation.
///
/// Gateway failures map to each operation's documented soft value inside
/// `result` (empty list, `false`, `null`) and are logged; the `error` field is
/// reserved for unrecognized methods and undecodable parameters.
pub async fn dispatch<O: GitHubOps>(ops: &O, request: McpRequest) -> McpResponse {
    match request.method.as_str() {
        methods::LIST_ISSUES => match decode_params::<ListIssuesParams>(request.params) {
            Ok(p) => {
                let repo = RepoId { owner: p.owner, repo: p.repo };
                let issues = match ops.list_issues(&repo, &p.labels, p.state).await {
                    Ok(issues) => issues,
                    Err(err) => {
                        warn!(%repo, %err, "list_issues failed");
                        Vec::new()
                    }
                };
                McpResponse::result(json!({ "issues": issues }))
            }
            Err(message) => McpResponse::error(message),
        },

        methods::GET_ISSUE => match decode_params::<GetIssueParams>(request.params) {
            Ok(p) => {
                let repo = RepoId { owner: p.owner, repo: p.repo };
                let issue = match ops.get_issue(&repo, p.issue_number).await {
                    Ok(issue) => issue,
                    Err(err) => {
                        warn!(%repo, issue = p.issue_number, %err, "get_issue failed");
                        None
                    }
                };
                McpResponse::result(json!({ "issue": issue }))
            }
            Err(message) => McpResponse::error(message),
        },

        methods::CLOSE_ISSUE => match decode_params::<CloseIssueParams>(request.params) {
            Ok(p) => {
                let repo = RepoId { owner: p.owner, repo: p.repo };
                let success = match ops.close_issue(&repo, p.issue_number, p.comment.as_deref()).await
                {
                    Ok(success) => success,
                    Err(err) => {
                        warn!(%repo, issue = p.issue_number, %err, "close_issue failed");
                        false
                    }
                };
                McpResponse::result(json!({ "success": success }))
            }
            Err(message) => McpResponse::error(message),
        },

        methods::ADD_ISSUE_COMMENT => match decode_params::<AddCommentParams>(request.params) {
            Ok(p) => {
                let repo = RepoId { owner: p.owner, repo: p.repo };
                let success = match ops.add_issue_comment(&repo, p.issue_number, &p.comment).await {
                    Ok(success) => success,
                    Err(err) => {
                        warn!(%repo, issue = p.issue_number, %err, "add_issue_comment failed");
                        false
                    }
                };
                McpResponse::result(json!({ "success": success }))
            }
            Err(message) => McpResponse::error(message),
        },

        methods::CREATE_PULL_REQUEST => {
            match decode_params::<CreatePullRequestParams>(request.params) {
                Ok(p) => {
                    let repo = RepoId { owner: p.owner, repo: p.repo };
                    let pull_request = match ops
                        .create_pull_request(&repo, &p.title, &p.body, &p.head, &p.base)
                        .await
                    {
                        Ok(pr) => pr,
                        Err(err) => {
                            warn!(%repo, head = %p.head, %err, "create_pull_request failed");
                            None
                        }
                    };
                    McpResponse::result(json!({ "pull_request": pull_request }))
                }
                Err(message) => McpResponse::error(message),
            }
        }

        methods::CREATE_BRANCH => match decode_params::<CreateBranchParams>(request.params) {
            Ok(p) => {
                let repo = RepoId { owner: p.owner, repo: p.repo };
                let success = match ops.create_branch(&repo, &p.branch_name, &p.base_branch).await {
                    Ok(success) => success,
                    Err(err) => {
                        warn!(%repo, branch = %p.branch_name, %err, "create_branch failed");
                        false
                    }
                };
                McpResponse::result(json!({ "success": success }))
            }
            Err(message) => McpResponse::error(message),
        },

        methods::CREATE_FILE => match decode_params::<CreateFileParams>(request.params) {
            Ok(p) => {
                let repo = RepoId { owner: p.owner, repo: p.repo };
                let success = match ops
                    .create_file(&repo, &p.path, &p.content, &p.branch, &p.message)
                    .await
                {
                    Ok(success) => success,
                    Err(err) => {
                        warn!(%repo, path = %p.path, %err, "create_file failed");
                        false
                    }
                };
                McpResponse::result(json!({ "success": success }))
            }
            Err(message) => McpResponse::error(message),
        },

        other => McpResponse::error(format!("Unknown method: {other}")),
    }
}

fn decode_params<P: DeserializeOwned>(params: Value) -> Result<P, String> {
    serde_json::from_value(params).map_err(|err| format!("invalid params: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::tests::MockOps;
    use crate::github::fixtures::issue;
    use crate::github::StateFilter;
    use crate::mcp::McpClient;
    use std::str::FromStr;

    fn request(method: &str, params: Value) -> McpRequest {
        McpRequest { method: method.to_string(), params }
    }

    #[tokio::test]
    async fn test_unknown_method_reports_the_literal_name() {
        let ops = MockOps::new();
        let response = dispatch(&ops, request("github.delete_repo", json!({}))).await;
        assert!(response.result.is_none());
        assert_eq!(response.error.as_deref(), Some("Unknown method: github.delete_repo"));
    }

    #[tokio::test]
    async fn test_list_issues_round_trip() {
        let ops = MockOps::with_issues(vec![issue(1, "Implement parser", "body")]);
        let response = dispatch(
            &ops,
            request(
                methods::LIST_ISSUES,
                json!({"owner": "octo", "repo": "demo", "labels": ["ai-task"]}),
            ),
        )
        .await;
        let result = response.result.unwrap();
        assert_eq!(result["issues"].as_array().unwrap().len(), 1);
        assert_eq!(result["issues"][0]["number"], 1);
        // state defaults to "all" when omitted
        assert!(ops.recorded().iter().any(|c| c.ends_with("state=all")));
    }

    #[tokio::test]
    async fn test_close_issue_with_comment() {
        let ops = MockOps::new();
        let response = dispatch(
            &ops,
            request(
                methods::CLOSE_ISSUE,
                json!({"owner": "octo", "repo": "demo", "issue_number": 9, "comment": "done"}),
            ),
        )
        .await;
        assert_eq!(response.result.unwrap()["success"], true);
        assert!(ops.recorded().contains(&"close_issue #9 comment=true".to_string()));
    }

    #[tokio::test]
    async fn test_gateway_failure_maps_to_soft_value() {
        let ops = MockOps { fail_close: true, ..MockOps::new() };
        let response = dispatch(
            &ops,
            request(
                methods::CLOSE_ISSUE,
                json!({"owner": "octo", "repo": "demo", "issue_number": 9}),
            ),
        )
        .await;
        // a failed close is reported inside result, not as an envelope error
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["success"], false);
    }

    #[tokio::test]
    async fn test_invalid_params_reported_in_error_field() {
        let ops = MockOps::new();
        let response = dispatch(
            &ops,
            request(methods::GET_ISSUE, json!({"owner": "octo"})),
        )
        .await;
        assert!(response.result.is_none());
        assert!(response.error.unwrap().starts_with("invalid params"));
    }

    #[tokio::test]
    async fn test_create_branch_defaults_base_to_main() {
        let ops = MockOps::new();
        dispatch(
            &ops,
            request(
                methods::CREATE_BRANCH,
                json!({"owner": "octo", "repo": "demo", "branch_name": "ai-task-1-fix"}),
            ),
        )
        .await;
        assert!(ops.recorded().contains(&"create_branch ai-task-1-fix from main".to_string()));
    }

    #[tokio::test]
    async fn test_protocol_client_round_trip_through_server() {
        let ops = MockOps::with_issues(vec![issue(21, "Implement exporter", "details")]);
        let app = router(Arc::new(ops));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = McpClient::new(format!("http://{addr}"));
        let repo = RepoId::from_str("octo/demo").unwrap();

        let issues = client
            .list_issues(&repo, &["ai-task".to_string()], StateFilter::All)
            .await
            .unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].number, 21);

        let fetched = client.get_issue(&repo, 21).await.unwrap();
        assert_eq!(fetched.unwrap().title, "Implement exporter");

        assert!(client.close_issue(&repo, 21, Some("wrapping up")).await.unwrap());

        let unknown = client.call("github.delete_repo", &json!({})).await;
        assert!(matches!(unknown, Err(crate::github::OpsError::Server(_))));
    }
}
