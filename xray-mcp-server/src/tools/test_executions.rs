//! Test execution tools

use crate::config::{IssueTypeNames, XrayConfig};
use crate::error::XrayMcpResult;
use crate::formatting::adf_document;
use crate::jira_client::{jql_string, JiraClient, TestRun, TestRunUpdate, ISSUE_LIST_FIELDS};
use crate::tools::{
    clamp_max_results, confirmation, normalize_issue_key, normalize_project_key, optional_issue_key,
    optional_text, render_issue_details, render_issue_list, require_text, split_keys, split_list,
    IssueView, StepOutcome,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const EXECUTION_DETAIL_FIELDS: &[&str] = &[
    "summary",
    "description",
    "status",
    "created",
    "updated",
    "assignee",
    "reporter",
];

/// Parameters for the list_test_executions tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListTestExecutionsParams {
    /// Jira project key (e.g., "PROJ")
    pub project_key: String,

    /// Filter by test plan key (optional)
    #[serde(default)]
    pub test_plan_key: Option<String>,

    /// Filter by test key (optional)
    #[serde(default)]
    pub test_key: Option<String>,

    /// Maximum number of results (default: 50, max: 100)
    #[serde(default)]
    pub max_results: Option<u32>,
}

/// Parameters for the get_test_execution tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetTestExecutionParams {
    /// Test Execution issue key (e.g., "PROJ-456")
    pub test_execution_key: String,
}

/// Parameters for the create_test_execution tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateTestExecutionParams {
    /// Jira project key (e.g., "PROJ")
    pub project_key: String,

    /// Test execution summary/title
    pub summary: String,

    /// Test execution description (optional)
    #[serde(default)]
    pub description: Option<String>,

    /// Test plan key to associate with (optional)
    #[serde(default)]
    pub test_plan_key: Option<String>,

    /// Comma-separated test environments (optional)
    #[serde(default)]
    pub test_environments: Option<String>,

    /// Comma-separated test keys to add to the execution (optional)
    #[serde(default)]
    pub tests: Option<String>,
}

/// Result of a single test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestRunStatus {
    Pass,
    Fail,
    Todo,
    Executing,
    Aborted,
}

impl TestRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestRunStatus::Pass => "PASS",
            TestRunStatus::Fail => "FAIL",
            TestRunStatus::Todo => "TODO",
            TestRunStatus::Executing => "EXECUTING",
            TestRunStatus::Aborted => "ABORTED",
        }
    }
}

/// Parameters for the update_test_run tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateTestRunParams {
    /// Test Execution issue key (e.g., "PROJ-456")
    pub test_execution_key: String,

    /// Test issue key (e.g., "PROJ-123")
    pub test_key: String,

    /// Test run status: PASS, FAIL, TODO, EXECUTING or ABORTED
    pub status: TestRunStatus,

    /// Comment about the test run (optional)
    #[serde(default)]
    pub comment: Option<String>,

    /// Comma-separated defect keys (optional)
    #[serde(default)]
    pub defects: Option<String>,
}

/// JQL for the executions of a project, newest first
pub fn list_executions_jql(
    issue_type: &str,
    project_key: &str,
    test_plan_key: Option<&str>,
    test_key: Option<&str>,
) -> String {
    let mut jql = format!(
        "project = {} AND issuetype = {}",
        jql_string(project_key),
        jql_string(issue_type)
    );
    if let Some(plan) = test_plan_key {
        jql.push_str(&format!(" AND issue in testPlanTests({})", jql_string(plan)));
    }
    if let Some(test) = test_key {
        jql.push_str(&format!(" AND issue in testExecTests({})", jql_string(test)));
    }
    jql.push_str(" ORDER BY created DESC");
    jql
}

fn render_test_runs(runs: &[TestRun]) -> String {
    if runs.is_empty() {
        return "**Test Runs:** No test runs found".to_string();
    }

    let mut out = String::from("**Test Runs:**\n");
    for run in runs {
        out.push_str(&format!(
            "\n- **Test:** {}\n  - **Status:** {}\n  - **Executed By:** {}",
            run.test_key(),
            run.status(),
            run.executed_by.as_deref().unwrap_or("Not specified"),
        ));
        if let Some(comment) = run.comment.as_deref().filter(|c| !c.is_empty()) {
            out.push_str(&format!("\n  - **Comment:** {}", comment));
        }
        let defects = run.defect_keys();
        if !defects.is_empty() {
            out.push_str(&format!("\n  - **Defects:** {}", defects.join(", ")));
        }
    }
    out
}

/// Tool family for Xray test executions
pub struct TestExecutionTools {
    jira: Arc<JiraClient>,
    config: Arc<XrayConfig>,
}

impl TestExecutionTools {
    pub fn new(jira: Arc<JiraClient>, config: Arc<XrayConfig>) -> Self {
        Self { jira, config }
    }

    #[instrument(skip(self))]
    pub async fn list_test_executions(
        &self,
        params: ListTestExecutionsParams,
    ) -> XrayMcpResult<String> {
        let project_key = normalize_project_key("project_key", &params.project_key)?;
        let test_plan_key = optional_issue_key("test_plan_key", params.test_plan_key.as_deref())?;
        let test_key = optional_issue_key("test_key", params.test_key.as_deref())?;
        info!("Fetching test executions for project: {}", project_key);

        let jql = list_executions_jql(
            IssueTypeNames::search_name(&self.config.issue_types.test_execution),
            &project_key,
            test_plan_key.as_deref(),
            test_key.as_deref(),
        );
        let result = self
            .jira
            .search(&jql, clamp_max_results(params.max_results), ISSUE_LIST_FIELDS)
            .await?;

        if result.issues.is_empty() {
            let mut message = format!("No test executions found in project \"{}\"", project_key);
            if let Some(plan) = &test_plan_key {
                message.push_str(&format!(" for test plan: {}", plan));
            }
            if let Some(test) = &test_key {
                message.push_str(&format!(" for test: {}", test));
            }
            return Ok(message);
        }

        Ok(render_issue_list(
            &result.issues,
            "test execution",
            &project_key,
            IssueView::Basic,
        ))
    }

    /// Execution details with its test runs; runs are best-effort
    #[instrument(skip(self))]
    pub async fn get_test_execution(&self, params: GetTestExecutionParams) -> XrayMcpResult<String> {
        let key = normalize_issue_key("test_execution_key", &params.test_execution_key)?;
        info!("Fetching test execution details for: {}", key);

        let issue = self.jira.get_issue(&key, EXECUTION_DETAIL_FIELDS).await?;
        let runs = match self.jira.test_execution_runs(&key).await {
            Ok(runs) => runs,
            Err(err) => {
                warn!("Could not fetch test runs for {}: {}", key, err);
                Vec::new()
            }
        };

        let mut out = render_issue_details("Test Execution", &issue, IssueView::Basic, None);
        out.push_str("\n\n");
        out.push_str(&render_test_runs(&runs));
        Ok(out)
    }

    /// Create the execution, then link plan, tests and environments
    #[instrument(skip(self))]
    pub async fn create_test_execution(
        &self,
        params: CreateTestExecutionParams,
    ) -> XrayMcpResult<String> {
        let project_key = normalize_project_key("project_key", &params.project_key)?;
        let summary = require_text("summary", &params.summary)?;
        let test_plan_key = optional_issue_key("test_plan_key", params.test_plan_key.as_deref())?;
        let environments = split_list(params.test_environments.as_deref());
        let tests = split_keys("tests", params.tests.as_deref())?;
        info!("Creating test execution in project: {}", project_key);

        let issue_type = self
            .jira
            .resolve_issue_type(&project_key, &self.config.issue_types.test_execution)
            .await?;

        let created = self
            .jira
            .create_issue(json!({
                "project": { "key": project_key },
                "summary": summary,
                "description": adf_document(params.description.as_deref().unwrap_or_default()),
                "issuetype": { "id": issue_type.id },
            }))
            .await?;
        let exec_key = created.key;

        let plan_line = match &test_plan_key {
            Some(plan) => Some(
                StepOutcome::record(
                    "associate with test plan",
                    self.jira
                        .add_test_executions_to_test_plan(plan, std::slice::from_ref(&exec_key))
                        .await,
                )
                .render(format!("**Test Plan:** {}", plan), "associate with test plan"),
            ),
            None => None,
        };

        let tests_line = if tests.is_empty() {
            None
        } else {
            Some(
                StepOutcome::record(
                    "add tests to execution",
                    self.jira.add_tests_to_test_execution(&exec_key, &tests).await,
                )
                .render(
                    format!("**Tests Added:** {}", tests.join(", ")),
                    "add tests to execution",
                ),
            )
        };

        let environments_line = if environments.is_empty() {
            None
        } else {
            Some(
                StepOutcome::record(
                    "set test environments",
                    self.jira.set_test_environments(&exec_key, &environments).await,
                )
                .render(
                    format!("**Environments:** {}", environments.join(", ")),
                    "set test environments",
                ),
            )
        };

        Ok(confirmation(
            format!("Successfully created test execution: {}", exec_key),
            [
                Some(format!("**Summary:** {}", summary)),
                Some(format!("**Project:** {}", project_key)),
                plan_line,
                tests_line,
                environments_line,
            ],
            self.config.browse_url(&exec_key),
        ))
    }

    #[instrument(skip(self))]
    pub async fn update_test_run(&self, params: UpdateTestRunParams) -> XrayMcpResult<String> {
        let exec_key = normalize_issue_key("test_execution_key", &params.test_execution_key)?;
        let test_key = normalize_issue_key("test_key", &params.test_key)?;
        let comment = optional_text(params.comment.as_deref());
        let defects = split_keys("defects", params.defects.as_deref())?;
        info!("Updating test run for {} in execution {}", test_key, exec_key);

        let update = TestRunUpdate {
            status: params.status.as_str().to_string(),
            comment: comment.clone(),
            defects: (!defects.is_empty()).then(|| defects.clone()),
        };
        self.jira
            .update_test_run_status(&exec_key, &test_key, &update)
            .await?;

        Ok(confirmation(
            "Successfully updated test run".to_string(),
            [
                Some(format!("**Test:** {}", test_key)),
                Some(format!("**Test Execution:** {}", exec_key)),
                Some(format!("**Status:** {}", params.status.as_str())),
                comment.map(|c| format!("**Comment:** {}", c)),
                (!defects.is_empty()).then(|| format!("**Defects:** {}", defects.join(", "))),
            ],
            self.config.browse_url(&exec_key),
        ))
    }
}
