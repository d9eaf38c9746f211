//! Keyword classification deciding what action an issue warrants.

use crate::github::Issue;

/// Keywords whose presence marks an issue as asking for a code change.
pub const CODE_CHANGE_KEYWORDS: &[&str] = &[
    "implement",
    "create",
    "add",
    "fix",
    "update",
    "modify",
    "change",
    "function",
    "class",
    "method",
    "api",
    "endpoint",
    "file",
    "code",
    "script",
    "module",
    "library",
    "package",
    "component",
];

/// Keywords marking an issue as invalid or unclear.
pub const INVALID_KEYWORDS: &[&str] = &[
    "invalid",
    "unclear",
    "not clear",
    "confusing",
    "wrong",
    "error",
    "duplicate",
    "spam",
    "test",
    "example",
    "sample",
];

/// Keywords marking an issue as already completed.
pub const COMPLETED_KEYWORDS: &[&str] = &[
    "done",
    "completed",
    "finished",
    "resolved",
    "fixed",
    "closed",
    "implemented",
    "added",
    "created",
];

/// What the pipeline should do with an issue. Every issue maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueAction {
    /// Open a branch, commit the generated implementation, raise a PR.
    OpenPullRequest,
    /// Close with a fixed "invalid or unclear" comment.
    CloseAsInvalid,
    /// Close with a fixed "completed" comment.
    CloseAsCompleted,
    /// Post an excerpt of the generated analysis as a comment.
    PostAnalysis,
}

/// Classification rules in priority order; the first matching keyword set
/// wins. An issue mentioning both "fix" and "invalid" is a code change, not
/// an invalid issue, because the code-change set is checked first.
const RULES: &[(&[&str], IssueAction)] = &[
    (CODE_CHANGE_KEYWORDS, IssueAction::OpenPullRequest),
    (INVALID_KEYWORDS, IssueAction::CloseAsInvalid),
    (COMPLETED_KEYWORDS, IssueAction::CloseAsCompleted),
];

/// Decide the action for an issue. Total: anything no rule matches falls back
/// to posting an analysis comment.
pub fn classify(issue: &Issue) -> IssueAction {
    let text = issue_text(issue);
    RULES
        .iter()
        .find(|(keywords, _)| contains_any(&text, keywords))
        .map_or(IssueAction::PostAnalysis, |(_, action)| *action)
}

pub fn requires_code_change(issue: &Issue) -> bool {
    contains_any(&issue_text(issue), CODE_CHANGE_KEYWORDS)
}

pub fn is_invalid(issue: &Issue) -> bool {
    contains_any(&issue_text(issue), INVALID_KEYWORDS)
}

pub fn is_completed(issue: &Issue) -> bool {
    contains_any(&issue_text(issue), COMPLETED_KEYWORDS)
}

fn issue_text(issue: &Issue) -> String {
    format!("{} {}", issue.title, issue.body_text()).to_lowercase()
}

/// Plain substring containment, no word boundaries: "implementation" matches
/// "implement".
fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}
