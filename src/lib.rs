//! Automated triage and implementation of GitHub issues.
//!
//! Issues labeled `ai-task` are fetched through a local MCP-style proxy,
//! classified by keyword, and acted on: generated implementations become a
//! branch, files, and a pull request; invalid or completed issues are closed;
//! everything else receives an analysis comment.

pub mod agent;
pub mod config;
pub mod executor;
pub mod extract;
pub mod github;
pub mod llm;
pub mod mcp;
pub mod server;
pub mod triage;
