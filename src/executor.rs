//! Drives the category-appropriate mutation sequence for each classified
//! issue and accumulates a human-readable action log.

use tracing::warn;

use crate::extract::{extract_code_blocks, implementation_file_name, CodeBlock, IMPLEMENTATIONS_DIR};
use crate::github::{GitHubOps, Issue, OpsError, RepoId, DEFAULT_BASE_BRANCH};
use crate::triage::{classify, IssueAction};

/// Longest slug the issue title contributes to a branch name.
const BRANCH_SLUG_LIMIT: usize = 30;

/// How much of the generated analysis a fallback comment quotes.
const ANALYSIS_EXCERPT_CHARS: usize = 500;

const INVALID_CLOSE_COMMENT: &str =
    "🤖 AI Agent: This issue appears to be invalid or unclear. Closing as requested.";
const COMPLETED_CLOSE_COMMENT: &str =
    "🤖 AI Agent: This issue has been completed. Closing as requested.";

/// Executes issue actions against a single repository through any
/// [`GitHubOps`] implementation.
pub struct ActionExecutor<'a, O: GitHubOps> {
    ops: &'a O,
    repo: RepoId,
}

impl<'a, O: GitHubOps> ActionExecutor<'a, O> {
    pub fn new(ops: &'a O, repo: RepoId) -> Self {
        Self { ops, repo }
    }

    /// Process issues strictly in order, one full action sequence per issue.
    /// Never fails: expected per-issue errors become ❌ lines in the log, and
    /// a failure on one issue does not prevent processing the next.
    pub async fn process_issues(&self, issues: &[Issue], analysis: &str) -> Vec<String> {
        let mut log = Vec::new();
        log.push("=".repeat(50));
        log.push("ACTIONS TAKEN ON ISSUES".to_string());
        log.push("=".repeat(50));

        for issue in issues {
            log.push(format!("\nProcessing Issue #{}: {}", issue.number, issue.title));
            match classify(issue) {
                IssueAction::OpenPullRequest => self.open_pull_request(issue, analysis, &mut log).await,
                IssueAction::CloseAsInvalid => {
                    self.close_with_comment(issue, INVALID_CLOSE_COMMENT, "invalid", &mut log).await;
                }
                IssueAction::CloseAsCompleted => {
                    self.close_with_comment(issue, COMPLETED_CLOSE_COMMENT, "completed", &mut log).await;
                }
                IssueAction::PostAnalysis => self.post_analysis(issue, analysis, &mut log).await,
            }
        }
        log
    }

    async fn open_pull_request(&self, issue: &Issue, analysis: &str, log: &mut Vec<String>) {
        let outcome = self.run_pull_request_sequence(issue, analysis).await;
        log.push(outcome.log_line(issue));

        // The issue always receives exactly one follow-up comment: the PR
        // link on success, a failure description otherwise.
        let comment = outcome.follow_up_comment(issue);
        if succeeded(self.ops.add_issue_comment(&self.repo, issue.number, &comment).await, "add_issue_comment") {
            log.push(format!("✅ Added comment to issue #{}", issue.number));
        } else {
            log.push(format!("❌ Failed to add comment to issue #{}", issue.number));
        }
    }

    /// Branch → files → pull request. Earlier completed steps are not rolled
    /// back on a later failure; the log records which step failed and the
    /// branch (and any files) stay behind.
    async fn run_pull_request_sequence(&self, issue: &Issue, analysis: &str) -> PrOutcome {
        let blocks = extract_code_blocks(analysis);
        if blocks.is_empty() {
            return PrOutcome::NoImplementation;
        }

        let branch = branch_name(issue);
        if !succeeded(
            self.ops.create_branch(&self.repo, &branch, DEFAULT_BASE_BRANCH).await,
            "create_branch",
        ) {
            return PrOutcome::BranchFailed { branch };
        }

        let message = format!("Add implementation for issue #{}", issue.number);
        let mut files_created = 0usize;
        for (index, block) in blocks.iter().enumerate() {
            let Some(name) = implementation_file_name(index, &block.language) else {
                continue;
            };
            let path = format!("{IMPLEMENTATIONS_DIR}/{name}");
            if succeeded(
                self.ops.create_file(&self.repo, &path, &block.code, &branch, &message).await,
                "create_file",
            ) {
                files_created += 1;
            }
        }
        if files_created == 0 {
            return PrOutcome::NoFilesCreated;
        }

        let title = format!("🤖 AI Agent: Implement {}", issue.title);
        let body = pull_request_body(issue, &blocks);
        match self
            .ops
            .create_pull_request(&self.repo, &title, &body, &branch, DEFAULT_BASE_BRANCH)
            .await
        {
            Ok(Some(pr)) => PrOutcome::Created { number: pr.number, url: pr.html_url },
            Ok(None) => PrOutcome::PrFailed,
            Err(err) => {
                warn!(issue = issue.number, %err, "create_pull_request failed");
                PrOutcome::PrFailed
            }
        }
    }

    async fn close_with_comment(&self, issue: &Issue, comment: &str, kind: &str, log: &mut Vec<String>) {
        if succeeded(
            self.ops.close_issue(&self.repo, issue.number, Some(comment)).await,
            "close_issue",
        ) {
            log.push(format!("✅ Closed {kind} issue #{}", issue.number));
        } else {
            log.push(format!("❌ Failed to close {kind} issue #{}", issue.number));
        }
    }

    async fn post_analysis(&self, issue: &Issue, analysis: &str, log: &mut Vec<String>) {
        let comment = analysis_comment(analysis);
        if succeeded(
            self.ops.add_issue_comment(&self.repo, issue.number, &comment).await,
            "add_issue_comment",
        ) {
            log.push(format!("✅ Added analysis comment to issue #{}", issue.number));
        } else {
            log.push(format!("❌ Failed to add analysis comment to issue #{}", issue.number));
        }
    }
}

/// Terminal state of the branch → files → pull request sequence.
enum PrOutcome {
    Created { number: u64, url: String },
    NoImplementation,
    BranchFailed { branch: String },
    NoFilesCreated,
    PrFailed,
}

impl PrOutcome {
    fn log_line(&self, issue: &Issue) -> String {
        match self {
            PrOutcome::Created { number, url } => {
                format!("✅ Successfully created pull request #{number}: {url}")
            }
            PrOutcome::NoImplementation => "No code implementation found in analysis".to_string(),
            PrOutcome::BranchFailed { branch } => {
                format!("❌ Failed to create branch {branch} for issue #{}", issue.number)
            }
            PrOutcome::NoFilesCreated => {
                format!("❌ No implementation files were created for issue #{}", issue.number)
            }
            PrOutcome::PrFailed => {
                format!("❌ Failed to create pull request for issue #{}", issue.number)
            }
        }
    }

    fn follow_up_comment(&self, issue: &Issue) -> String {
        match self {
            PrOutcome::Created { url, .. } => format!(
                "🤖 AI Agent has created a pull request to address this issue: {url}\n\nPlease review the implementation."
            ),
            other => format!(
                "🤖 AI Agent attempted to create a pull request but encountered an issue: {}",
                other.log_line(issue)
            ),
        }
    }
}

/// Collapse an operation result into success/failure, logging the error.
fn succeeded(result: Result<bool, OpsError>, operation: &str) -> bool {
    match result {
        Ok(success) => success,
        Err(err) => {
            warn!(%err, "{operation} failed");
            false
        }
    }
}

/// Deterministic branch name for an issue: `ai-task-<number>-<slug>`. The slug
/// is the lowercased title with spaces as hyphens, capped at
/// [`BRANCH_SLUG_LIMIT`] characters; the whole name is then stripped to
/// alphanumerics and hyphens. Re-running on the same issue yields the same
/// name.
pub fn branch_name(issue: &Issue) -> String {
    let slug: String = issue
        .title
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .take(BRANCH_SLUG_LIMIT)
        .collect();
    format!("ai-task-{}-{}", issue.number, slug)
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect()
}

/// PR description: the issue requirements plus the first extracted block
/// verbatim.
fn pull_request_body(issue: &Issue, blocks: &[CodeBlock]) -> String {
    let first = blocks
        .first()
        .map_or("Implementation details in analysis", |block| block.code.as_str());
    format!(
        "## AI Agent Implementation\n\n\
         This pull request implements the requirements from Issue #{number}: {title}\n\n\
         ### Changes Made:\n\
         {body}\n\n\
         ### Implementation:\n\
         The AI agent has analyzed the requirements and provided the following implementation:\n\n\
         ```python\n{first}\n```\n\n\
         ### Files Created/Modified:\n\
         - Generated implementation files saved to `{dir}/`\n\n\
         ### Review Notes:\n\
         - This implementation follows the exact requirements from the GitHub issue\n\
         - No extra features were added beyond what was requested\n\n\
         ---\n\
         *This PR was automatically generated by the AI Dev Agents system.*",
        number = issue.number,
        title = issue.title,
        body = issue.body_text(),
        first = first,
        dir = IMPLEMENTATIONS_DIR,
    )
}

/// First ~500 characters of the generated analysis. The ellipsis is appended
/// whether or not anything was actually cut.
fn analysis_comment(analysis: &str) -> String {
    let excerpt: String = analysis.chars().take(ANALYSIS_EXCERPT_CHARS).collect();
    format!("🤖 AI Agent Analysis:\n\n{excerpt}...")
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::github::fixtures::issue;
    use crate::github::{PullRequest, StateFilter};
    use async_trait::async_trait;
    use std::str::FromStr;
    use std::sync::Mutex;

    /// In-memory [`GitHubOps`] with call recording and programmable failures.
    pub struct MockOps {
        pub issues: Vec<Issue>,
        pub calls: Mutex<Vec<String>>,
        pub fail_close: bool,
        pub fail_comment: bool,
        pub fail_branch: bool,
        pub fail_file: bool,
        pub fail_pr: bool,
    }

    impl MockOps {
        pub fn new() -> Self {
            Self {
                issues: Vec::new(),
                calls: Mutex::new(Vec::new()),
                fail_close: false,
                fail_comment: false,
                fail_branch: false,
                fail_file: false,
                fail_pr: false,
            }
        }

        pub fn with_issues(issues: Vec<Issue>) -> Self {
            Self { issues, ..Self::new() }
        }

        pub fn recorded(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl GitHubOps for MockOps {
        async fn list_issues(
            &self,
            _repo: &RepoId,
            labels: &[String],
            state: StateFilter,
        ) -> Result<Vec<Issue>, OpsError> {
            self.record(format!("list_issues labels={labels:?} state={}", state.as_str()));
            Ok(self.issues.clone())
        }

        async fn get_issue(&self, _repo: &RepoId, number: u64) -> Result<Option<Issue>, OpsError> {
            self.record(format!("get_issue #{number}"));
            Ok(self.issues.iter().find(|i| i.number == number).cloned())
        }

        async fn close_issue(
            &self,
            _repo: &RepoId,
            number: u64,
            comment: Option<&str>,
        ) -> Result<bool, OpsError> {
            self.record(format!("close_issue #{number} comment={}", comment.is_some()));
            Ok(!self.fail_close)
        }

        async fn add_issue_comment(
            &self,
            _repo: &RepoId,
            number: u64,
            comment: &str,
        ) -> Result<bool, OpsError> {
            self.record(format!("add_issue_comment #{number}: {comment}"));
            Ok(!self.fail_comment)
        }

        async fn create_branch(
            &self,
            _repo: &RepoId,
            branch_name: &str,
            base_branch: &str,
        ) -> Result<bool, OpsError> {
            self.record(format!("create_branch {branch_name} from {base_branch}"));
            Ok(!self.fail_branch)
        }

        async fn create_file(
            &self,
            _repo: &RepoId,
            path: &str,
            _content: &str,
            branch: &str,
            _message: &str,
        ) -> Result<bool, OpsError> {
            self.record(format!("create_file {path} on {branch}"));
            Ok(!self.fail_file)
        }

        async fn create_pull_request(
            &self,
            _repo: &RepoId,
            title: &str,
            _body: &str,
            head: &str,
            base: &str,
        ) -> Result<Option<PullRequest>, OpsError> {
            self.record(format!("create_pull_request {head} -> {base}"));
            if self.fail_pr {
                Ok(None)
            } else {
                Ok(Some(PullRequest {
                    number: 7,
                    html_url: "https://github.com/octo/demo/pull/7".to_string(),
                    title: title.to_string(),
                }))
            }
        }
    }

    pub fn repo() -> RepoId {
        RepoId::from_str("octo/demo").unwrap()
    }

    const ANALYSIS_WITH_CODE: &str =
        "Here is the implementation:\n```python\ndef f():\n    return 1\n```\n";

    #[test]
    fn test_branch_name_is_deterministic() {
        let task = issue(123, "Implement sentiment analysis API", "");
        let first = branch_name(&task);
        let second = branch_name(&task);
        assert_eq!(first, second);
        assert_eq!(first, "ai-task-123-implement-sentiment-analysis-a");
    }

    #[test]
    fn test_branch_name_charset_and_length() {
        let task = issue(5, "Fix: crash! (on startup) with a very long descriptive title", "");
        let name = branch_name(&task);
        assert!(name.chars().all(|c| c.is_alphanumeric() || c == '-'));
        assert!(name.len() <= "ai-task-5-".len() + BRANCH_SLUG_LIMIT);
        assert!(name.starts_with("ai-task-5-fix-crash"));
    }

    #[tokio::test]
    async fn test_no_code_blocks_short_circuits_before_branch() {
        let ops = MockOps::new();
        let executor = ActionExecutor::new(&ops, repo());
        let tasks = vec![issue(30, "Implement the widget", "please add it")];

        let log = executor.process_issues(&tasks, "analysis with no fenced code").await;
        let joined = log.join("\n");
        assert!(joined.contains("No code implementation found in analysis"));

        let calls = ops.recorded();
        assert!(calls.iter().all(|c| !c.starts_with("create_branch")));
        assert!(calls.iter().all(|c| !c.starts_with("create_file")));
        assert!(calls.iter().all(|c| !c.starts_with("create_pull_request")));
        // still exactly one follow-up comment
        assert_eq!(calls.iter().filter(|c| c.starts_with("add_issue_comment")).count(), 1);
    }

    #[tokio::test]
    async fn test_code_change_happy_path() {
        let ops = MockOps::new();
        let executor = ActionExecutor::new(&ops, repo());
        let tasks = vec![issue(123, "Implement sentiment analysis API", "Requirements")];

        let log = executor.process_issues(&tasks, ANALYSIS_WITH_CODE).await;
        let joined = log.join("\n");
        assert!(joined.contains("✅ Successfully created pull request #7"));
        assert!(joined.contains("✅ Added comment to issue #123"));

        let calls = ops.recorded();
        assert!(calls
            .iter()
            .any(|c| c == "create_branch ai-task-123-implement-sentiment-analysis-a from main"));
        assert!(calls.iter().any(|c| {
            c == "create_file ai_task_implementations/ai_task_implementation_1.py on ai-task-123-implement-sentiment-analysis-a"
        }));
        assert!(calls
            .iter()
            .any(|c| c.starts_with("create_pull_request ai-task-123-") && c.ends_with("-> main")));
        assert!(calls
            .iter()
            .any(|c| c.contains("https://github.com/octo/demo/pull/7")));
    }

    #[tokio::test]
    async fn test_unsupported_languages_skipped_but_keep_numbering() {
        let ops = MockOps::new();
        let executor = ActionExecutor::new(&ops, repo());
        let tasks = vec![issue(8, "Add exporter module", "")];
        let analysis = "```python\na = 1\n```\n```html\n<p>no</p>\n```\n```rust\nfn main() {}\n```\n";

        executor.process_issues(&tasks, analysis).await;

        let files: Vec<String> = ops
            .recorded()
            .into_iter()
            .filter(|c| c.starts_with("create_file"))
            .collect();
        assert_eq!(files.len(), 2);
        assert!(files[0].contains("ai_task_implementation_1.py"));
        assert!(files[1].contains("ai_task_implementation_3.rs"));
    }

    #[tokio::test]
    async fn test_branch_failure_aborts_sequence() {
        let ops = MockOps { fail_branch: true, ..MockOps::new() };
        let executor = ActionExecutor::new(&ops, repo());
        let tasks = vec![issue(31, "Implement the widget", "")];

        let log = executor.process_issues(&tasks, ANALYSIS_WITH_CODE).await;
        let joined = log.join("\n");
        assert!(joined.contains("❌ Failed to create branch"));
        assert!(joined.contains("for issue #31"));

        let calls = ops.recorded();
        assert!(calls.iter().all(|c| !c.starts_with("create_file")));
        assert!(calls.iter().all(|c| !c.starts_with("create_pull_request")));
        // failure is still reported back on the issue
        assert!(calls.iter().any(|c| c.starts_with("add_issue_comment #31")
            && c.contains("encountered an issue")));
    }

    #[tokio::test]
    async fn test_pr_failure_leaves_branch_and_files() {
        let ops = MockOps { fail_pr: true, ..MockOps::new() };
        let executor = ActionExecutor::new(&ops, repo());
        let tasks = vec![issue(32, "Implement the widget", "")];

        let log = executor.process_issues(&tasks, ANALYSIS_WITH_CODE).await;
        let joined = log.join("\n");
        assert!(joined.contains("❌ Failed to create pull request for issue #32"));

        let calls = ops.recorded();
        assert!(calls.iter().any(|c| c.starts_with("create_branch")));
        assert!(calls.iter().any(|c| c.starts_with("create_file")));
        // no compensation: nothing resembling a cleanup call is issued
        assert!(calls.iter().all(|c| !c.contains("delete")));
    }

    #[tokio::test]
    async fn test_invalid_issue_closed_with_comment() {
        let ops = MockOps::new();
        let executor = ActionExecutor::new(&ops, repo());
        let tasks = vec![issue(124, "Spam", "This is an invalid test issue that should be closed.")];

        let log = executor.process_issues(&tasks, "no analysis needed").await;
        assert!(log.join("\n").contains("✅ Closed invalid issue #124"));
        assert!(ops.recorded().iter().any(|c| c == "close_issue #124 comment=true"));
    }

    #[tokio::test]
    async fn test_completed_issue_closed() {
        let ops = MockOps::new();
        let executor = ActionExecutor::new(&ops, repo());
        let tasks = vec![issue(40, "Ticket resolved", "finished last week")];

        let log = executor.process_issues(&tasks, "").await;
        assert!(log.join("\n").contains("✅ Closed completed issue #40"));
    }

    #[tokio::test]
    async fn test_default_action_posts_truncated_analysis() {
        let ops = MockOps::new();
        let executor = ActionExecutor::new(&ops, repo());
        let tasks = vec![issue(41, "Question about roadmap", "When is the next milestone due?")];
        let analysis = "y".repeat(800);

        let log = executor.process_issues(&tasks, &analysis).await;
        assert!(log.join("\n").contains("✅ Added analysis comment to issue #41"));

        let comment = ops
            .recorded()
            .into_iter()
            .find(|c| c.starts_with("add_issue_comment #41"))
            .unwrap();
        assert!(comment.contains("🤖 AI Agent Analysis:"));
        assert!(comment.contains(&format!("{}...", "y".repeat(500))));
        assert!(!comment.contains(&"y".repeat(501)));
    }

    #[tokio::test]
    async fn test_failure_on_one_issue_does_not_stop_the_batch() {
        let ops = MockOps { fail_close: true, ..MockOps::new() };
        let executor = ActionExecutor::new(&ops, repo());
        let tasks = vec![
            issue(50, "Duplicate report", "This looks done already"),
            issue(51, "Question about roadmap", "When is the next milestone due?"),
        ];

        let log = executor.process_issues(&tasks, "analysis").await;
        let joined = log.join("\n");
        assert!(joined.contains("❌ Failed to close invalid issue #50"));
        assert!(joined.contains("Processing Issue #51"));
        assert!(joined.contains("✅ Added analysis comment to issue #51"));
    }

    #[test]
    fn test_analysis_comment_always_carries_ellipsis() {
        let comment = analysis_comment("short");
        assert!(comment.ends_with("short..."));
    }

    #[test]
    fn test_pull_request_body_embeds_issue_and_first_block() {
        let task = issue(9, "Implement parser", "Parse the thing");
        let blocks = extract_code_blocks("```python\nfirst = True\n```\n```rust\nlet second = true;\n```");
        let body = pull_request_body(&task, &blocks);
        assert!(body.contains("Issue #9: Implement parser"));
        assert!(body.contains("Parse the thing"));
        assert!(body.contains("first = True"));
        assert!(!body.contains("let second = true;"));
    }
}
