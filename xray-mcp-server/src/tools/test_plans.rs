//! Test plan tools

use crate::config::{IssueTypeNames, XrayConfig};
use crate::error::{XrayMcpError, XrayMcpResult};
use crate::formatting::adf_document;
use crate::jira_client::{jql_string, IssueKeyRef, JiraClient, ISSUE_LIST_FIELDS};
use crate::tools::{
    clamp_max_results, confirmation, normalize_issue_key, normalize_project_key,
    render_issue_details, render_issue_list, require_text, split_keys, IssueView, StepOutcome,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub(crate) const CONTAINER_DETAIL_FIELDS: &[&str] = &[
    "summary",
    "description",
    "status",
    "created",
    "updated",
    "assignee",
    "reporter",
];

/// Parameters for the list_test_plans tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListTestPlansParams {
    /// Jira project key (e.g., "PROJ")
    pub project_key: String,

    /// Maximum number of results (default: 50, max: 100)
    #[serde(default)]
    pub max_results: Option<u32>,
}

/// Parameters for the get_test_plan tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetTestPlanParams {
    /// Test Plan issue key (e.g., "PROJ-789")
    pub test_plan_key: String,
}

/// Parameters for the create_test_plan tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateTestPlanParams {
    /// Jira project key (e.g., "PROJ")
    pub project_key: String,

    /// Test plan summary/title
    pub summary: String,

    /// Test plan description (optional)
    #[serde(default)]
    pub description: Option<String>,

    /// Comma-separated test keys to include (optional)
    #[serde(default)]
    pub tests: Option<String>,
}

/// Parameters for the add_tests_to_test_plan tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AddTestsToTestPlanParams {
    /// Test Plan issue key (e.g., "PROJ-789")
    pub test_plan_key: String,

    /// Comma-separated test keys to add
    pub test_keys: String,
}

/// JQL for the containers (plans or sets) of a project
pub(crate) fn container_jql(issue_type: &str, project_key: &str) -> String {
    format!(
        "project = {} AND issuetype = {} ORDER BY created DESC",
        jql_string(project_key),
        jql_string(issue_type)
    )
}

/// `**Associated Tests (N):**` block listing the keys
pub(crate) fn render_associated_tests(tests: &[IssueKeyRef]) -> String {
    if tests.is_empty() {
        return "**Associated Tests:** None".to_string();
    }
    let lines: Vec<String> = tests.iter().map(|t| format!("- {}", t.key)).collect();
    format!(
        "**Associated Tests ({}):**\n{}",
        tests.len(),
        lines.join("\n")
    )
}

/// Tool family for Xray test plans
pub struct TestPlanTools {
    jira: Arc<JiraClient>,
    config: Arc<XrayConfig>,
}

impl TestPlanTools {
    pub fn new(jira: Arc<JiraClient>, config: Arc<XrayConfig>) -> Self {
        Self { jira, config }
    }

    #[instrument(skip(self))]
    pub async fn list_test_plans(&self, params: ListTestPlansParams) -> XrayMcpResult<String> {
        let project_key = normalize_project_key("project_key", &params.project_key)?;
        info!("Fetching test plans for project: {}", project_key);

        let jql = container_jql(
            IssueTypeNames::search_name(&self.config.issue_types.test_plan),
            &project_key,
        );
        let result = self
            .jira
            .search(&jql, clamp_max_results(params.max_results), ISSUE_LIST_FIELDS)
            .await?;

        if result.issues.is_empty() {
            return Ok(format!("No test plans found in project \"{}\"", project_key));
        }

        Ok(render_issue_list(
            &result.issues,
            "test plan",
            &project_key,
            IssueView::Basic,
        ))
    }

    #[instrument(skip(self))]
    pub async fn get_test_plan(&self, params: GetTestPlanParams) -> XrayMcpResult<String> {
        let key = normalize_issue_key("test_plan_key", &params.test_plan_key)?;
        info!("Fetching test plan details for: {}", key);

        let issue = self.jira.get_issue(&key, CONTAINER_DETAIL_FIELDS).await?;
        let tests = match self.jira.test_plan_tests(&key).await {
            Ok(tests) => tests,
            Err(err) => {
                warn!("Could not fetch tests of test plan {}: {}", key, err);
                Vec::new()
            }
        };

        let mut out = render_issue_details("Test Plan", &issue, IssueView::Basic, None);
        out.push_str("\n\n");
        out.push_str(&render_associated_tests(&tests));
        Ok(out)
    }

    #[instrument(skip(self))]
    pub async fn create_test_plan(&self, params: CreateTestPlanParams) -> XrayMcpResult<String> {
        let project_key = normalize_project_key("project_key", &params.project_key)?;
        let summary = require_text("summary", &params.summary)?;
        let tests = split_keys("tests", params.tests.as_deref())?;
        info!("Creating test plan in project: {}", project_key);

        let issue_type = self
            .jira
            .resolve_issue_type(&project_key, &self.config.issue_types.test_plan)
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

        let tests_line = if tests.is_empty() {
            None
        } else {
            Some(
                StepOutcome::record(
                    "add tests to test plan",
                    self.jira.add_tests_to_test_plan(&created.key, &tests).await,
                )
                .render(
                    format!("**Tests Added:** {}", tests.join(", ")),
                    "add tests to test plan",
                ),
            )
        };

        Ok(confirmation(
            format!("Successfully created test plan: {}", created.key),
            [
                Some(format!("**Summary:** {}", summary)),
                Some(format!("**Project:** {}", project_key)),
                tests_line,
            ],
            self.config.browse_url(&created.key),
        ))
    }

    #[instrument(skip(self))]
    pub async fn add_tests_to_test_plan(
        &self,
        params: AddTestsToTestPlanParams,
    ) -> XrayMcpResult<String> {
        let key = normalize_issue_key("test_plan_key", &params.test_plan_key)?;
        let tests = split_keys("test_keys", Some(&params.test_keys))?;
        if tests.is_empty() {
            return Err(XrayMcpError::invalid_param(
                "test_keys",
                "provide at least one test key",
            ));
        }
        info!("Adding {} tests to test plan {}", tests.len(), key);

        self.jira.add_tests_to_test_plan(&key, &tests).await?;

        Ok(format!(
            "Successfully added tests to test plan {}\n\n**Tests Added:** {}\n\nView at: {}",
            key,
            tests.join(", "),
            self.config.browse_url(&key)
        ))
    }
}
