//! Tools module for the Xray MCP Server
//!
//! Tools are grouped in families: tests, test executions, test plans and
//! test sets talk to Jira; imports and exports talk to Xray Cloud. Shared
//! argument normalization and rendering live here.

pub mod exports;
pub mod imports;
pub mod test_cases;
pub mod test_executions;
pub mod test_plans;
pub mod test_sets;

pub use exports::*;
pub use imports::*;
pub use test_cases::*;
pub use test_executions::*;
pub use test_plans::*;
pub use test_sets::*;

use crate::error::{XrayMcpError, XrayMcpResult};
use crate::formatting::{description_text, format_date, format_timestamp, join_or};
use crate::jira_client::JiraIssue;
use tracing::warn;

pub const DEFAULT_MAX_RESULTS: u32 = 50;
pub const MAX_RESULTS_LIMIT: u32 = 100;

/// Requested page size, defaulted and clamped to 1..=100
pub fn clamp_max_results(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(DEFAULT_MAX_RESULTS)
        .clamp(1, MAX_RESULTS_LIMIT)
}

/// `PROJ`: a letter followed by letters, digits or underscores
fn is_project_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// `PROJ-123`
fn is_issue_key(key: &str) -> bool {
    match key.rsplit_once('-') {
        Some((project, number)) => {
            is_project_key(project)
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

fn upper_trimmed(parameter: &str, key: &str) -> XrayMcpResult<String> {
    let key = key.trim();
    if key.is_empty() {
        return Err(XrayMcpError::invalid_param(parameter, "must not be empty"));
    }
    Ok(key.to_uppercase())
}

/// Trimmed, upper-cased issue key such as `PROJ-123`
///
/// Keys end up in request paths and JQL, so anything else is rejected.
pub fn normalize_issue_key(parameter: &str, key: &str) -> XrayMcpResult<String> {
    let key = upper_trimmed(parameter, key)?;
    if !is_issue_key(&key) {
        return Err(XrayMcpError::invalid_param(
            parameter,
            format!("'{}' is not an issue key like PROJ-123", key),
        ));
    }
    Ok(key)
}

/// Trimmed, upper-cased project key such as `PROJ`
pub fn normalize_project_key(parameter: &str, key: &str) -> XrayMcpResult<String> {
    let key = upper_trimmed(parameter, key)?;
    if !is_project_key(&key) {
        return Err(XrayMcpError::invalid_param(
            parameter,
            format!("'{}' is not a project key like PROJ", key),
        ));
    }
    Ok(key)
}

/// Optional issue key; blank counts as absent
pub fn optional_issue_key(parameter: &str, key: Option<&str>) -> XrayMcpResult<Option<String>> {
    optional_text(key)
        .map(|key| normalize_issue_key(parameter, &key))
        .transpose()
}

/// Trimmed text that must not be empty
pub fn require_text(parameter: &str, value: &str) -> XrayMcpResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(XrayMcpError::invalid_param(parameter, "must not be empty"));
    }
    Ok(value.to_string())
}

/// Split a comma-separated argument, dropping empty entries
pub fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a comma-separated list of issue keys, validating each
pub fn split_keys(parameter: &str, value: Option<&str>) -> XrayMcpResult<Vec<String>> {
    split_list(value)
        .iter()
        .map(|key| normalize_issue_key(parameter, key))
        .collect()
}

/// Non-empty optional text argument
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Outcome of a follow-up step that runs after the main write succeeded
#[derive(Debug)]
pub enum StepOutcome {
    Applied,
    Failed(XrayMcpError),
}

impl StepOutcome {
    /// Record a step result, logging the failure
    pub fn record(step: &str, result: XrayMcpResult<()>) -> Self {
        match result {
            Ok(()) => StepOutcome::Applied,
            Err(err) => {
                warn!("Could not {}: {}", step, err);
                StepOutcome::Failed(err)
            }
        }
    }

    /// `applied` on success, a warning line naming the step otherwise
    pub fn render(&self, applied: String, step: &str) -> String {
        match self {
            StepOutcome::Applied => applied,
            StepOutcome::Failed(err) => {
                format!("⚠️ Could not {}: {}", step, err.user_message())
            }
        }
    }
}

/// How much of an issue a listing or detail view shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueView {
    /// Tests: priority, labels and components included
    Test,
    /// Executions, plans and sets
    Basic,
}

pub(crate) fn render_list_entry(issue: &JiraIssue, view: IssueView) -> String {
    let fields = &issue.fields;
    let mut lines = vec![
        format!("**{}: {}**", issue.key, fields.summary()),
        format!("- Status: {}", fields.status_name()),
    ];
    if view == IssueView::Test {
        lines.push(format!("- Priority: {}", fields.priority_name()));
    }
    lines.push(format!("- Assignee: {}", fields.assignee_name()));
    if view == IssueView::Test {
        lines.push(format!("- Labels: {}", join_or(fields.labels(), "None")));
        lines.push(format!(
            "- Components: {}",
            join_or(&fields.component_names(), "None")
        ));
    }
    lines.push(format!(
        "- Created: {}",
        fields.created.as_deref().map_or("Unknown".to_string(), format_date)
    ));
    lines.push(format!(
        "- Updated: {}",
        fields.updated.as_deref().map_or("Unknown".to_string(), format_date)
    ));
    lines.join("\n")
}

/// `Found N <noun>(s) in project "P"` followed by one entry per issue
pub(crate) fn render_issue_list(
    issues: &[JiraIssue],
    noun: &str,
    project_key: &str,
    view: IssueView,
) -> String {
    let entries: Vec<String> = issues
        .iter()
        .map(|issue| render_list_entry(issue, view))
        .collect();
    format!(
        "Found {} {}(s) in project \"{}\"\n\n{}",
        issues.len(),
        noun,
        project_key,
        entries.join("\n\n")
    )
}

/// Header, summary, description and details block of a single issue
pub(crate) fn render_issue_details(
    kind: &str,
    issue: &JiraIssue,
    view: IssueView,
    test_type: Option<&str>,
) -> String {
    let fields = &issue.fields;
    let mut out = format!(
        "**{}: {}**\n\n**Summary:** {}\n\n",
        kind,
        issue.key,
        fields.summary()
    );
    if let Some(test_type) = test_type {
        out.push_str(&format!("**Test Type:** {}\n\n", test_type));
    }
    out.push_str(&format!(
        "**Description:**\n{}\n\n",
        description_text(fields.description.as_ref()).unwrap_or_else(|| "No description".to_string())
    ));

    let mut details = vec![format!("- Status: {}", fields.status_name())];
    if view == IssueView::Test {
        details.push(format!("- Priority: {}", fields.priority_name()));
    }
    details.push(format!("- Assignee: {}", fields.assignee_name()));
    details.push(format!("- Reporter: {}", fields.reporter_name()));
    if view == IssueView::Test {
        details.push(format!("- Labels: {}", join_or(fields.labels(), "None")));
        details.push(format!(
            "- Components: {}",
            join_or(&fields.component_names(), "None")
        ));
    }
    details.push(format!(
        "- Created: {}",
        fields
            .created
            .as_deref()
            .map_or("Unknown".to_string(), format_timestamp)
    ));
    details.push(format!(
        "- Updated: {}",
        fields
            .updated
            .as_deref()
            .map_or("Unknown".to_string(), format_timestamp)
    ));

    out.push_str("**Details:**\n");
    out.push_str(&details.join("\n"));
    out
}

/// Lines of a write confirmation, skipping absent optional lines
pub(crate) fn confirmation<I>(headline: String, lines: I, browse_url: String) -> String
where
    I: IntoIterator<Item = Option<String>>,
{
    let body: Vec<String> = lines.into_iter().flatten().collect();
    if body.is_empty() {
        format!("{}\n\nView at: {}", headline, browse_url)
    } else {
        format!("{}\n\n{}\n\nView at: {}", headline, body.join("\n"), browse_url)
    }
}
