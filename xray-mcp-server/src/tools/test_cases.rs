//! Test tools: list, inspect, create and update Xray tests
//!
//! Tests are Jira issues. Their steps live in Xray Cloud and are fetched
//! through GraphQL when credentials are available.

use crate::config::{IssueTypeNames, XrayConfig};
use crate::error::{XrayMcpError, XrayMcpResult};
use crate::formatting::{adf_document, rewrite_xray_attachments};
use crate::jira_client::{jql_string, JiraClient, ISSUE_DETAIL_FIELDS, ISSUE_LIST_FIELDS};
use crate::tools::{
    clamp_max_results, confirmation, normalize_issue_key, normalize_project_key, optional_text,
    render_issue_details, render_issue_list, require_text, split_list, IssueView, StepOutcome,
};
use crate::xray_client::{XrayClient, XrayTest, XrayTestStep};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Parameters for the list_tests tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListTestsParams {
    /// Jira project key (e.g., "PROJ")
    pub project_key: String,

    /// Comma-separated labels to filter tests (optional)
    #[serde(default)]
    pub labels: Option<String>,

    /// Component name to filter tests (optional)
    #[serde(default)]
    pub component: Option<String>,

    /// Maximum number of tests to return (default: 50, max: 100)
    #[serde(default)]
    pub max_results: Option<u32>,
}

/// Parameters for get_test and get_test_with_steps
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetTestParams {
    /// Test issue key (e.g., "PROJ-123")
    pub test_key: String,
}

/// Xray test type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum TestType {
    #[default]
    Manual,
    Cucumber,
    Generic,
}

impl TestType {
    pub fn as_str(self) -> &'static str {
        match self {
            TestType::Manual => "Manual",
            TestType::Cucumber => "Cucumber",
            TestType::Generic => "Generic",
        }
    }
}

/// Parameters for the create_test tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateTestParams {
    /// Jira project key (e.g., "PROJ")
    pub project_key: String,

    /// Test summary/title
    pub summary: String,

    /// Test description (optional)
    #[serde(default)]
    pub description: Option<String>,

    /// Test type: Manual, Cucumber, or Generic (default: Manual)
    #[serde(default)]
    pub test_type: Option<TestType>,

    /// Comma-separated labels (optional)
    #[serde(default)]
    pub labels: Option<String>,

    /// Priority name (e.g., High, Medium, Low)
    #[serde(default)]
    pub priority: Option<String>,
}

/// Parameters for the update_test tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateTestParams {
    /// Test issue key (e.g., "PROJ-123")
    pub test_key: String,

    /// New summary (optional)
    #[serde(default)]
    pub summary: Option<String>,

    /// New description (optional)
    #[serde(default)]
    pub description: Option<String>,

    /// Comma-separated labels, replacing the current ones (optional)
    #[serde(default)]
    pub labels: Option<String>,

    /// New priority name (optional)
    #[serde(default)]
    pub priority: Option<String>,
}

/// JQL for the tests of a project, newest first
pub fn list_tests_jql(
    issue_type: &str,
    project_key: &str,
    labels: &[String],
    component: Option<&str>,
) -> String {
    let mut jql = format!(
        "project = {} AND issuetype = {}",
        jql_string(project_key),
        jql_string(issue_type)
    );
    if !labels.is_empty() {
        let conditions: Vec<String> = labels
            .iter()
            .map(|label| format!("labels = {}", jql_string(label)))
            .collect();
        jql.push_str(&format!(" AND ({})", conditions.join(" OR ")));
    }
    if let Some(component) = component {
        jql.push_str(&format!(" AND component = {}", jql_string(component)));
    }
    jql.push_str(" ORDER BY created DESC");
    jql
}

fn render_steps_compact(steps: &[XrayTestStep]) -> String {
    let mut out = String::from("**Test Steps:**\n");
    for (index, step) in steps.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. **Action:** {}\n   **Data:** {}\n   **Expected Result:** {}",
            index + 1,
            step.action.as_deref().unwrap_or_default(),
            non_empty_or_na(step.data.as_deref()),
            non_empty_or_na(step.result.as_deref()),
        ));
    }
    out
}

fn render_steps_detailed(steps: &[XrayTestStep], xray_base_url: &str) -> String {
    if steps.is_empty() {
        return "**Test Steps:** No steps defined for this test.".to_string();
    }

    let rewrite = |text: Option<&str>| match text.filter(|t| !t.is_empty()) {
        Some(text) => rewrite_xray_attachments(text, xray_base_url),
        None => "N/A".to_string(),
    };

    let mut out = String::from("**Test Steps:**\n");
    for (index, step) in steps.iter().enumerate() {
        out.push_str(&format!(
            "\n**Step {}:**\n- **Action:** {}\n- **Data:** {}\n- **Expected Result:** {}\n",
            index + 1,
            rewrite_xray_attachments(step.action.as_deref().unwrap_or_default(), xray_base_url),
            rewrite(step.data.as_deref()),
            rewrite(step.result.as_deref()),
        ));
    }
    out
}

/// Gherkin scenario of a Cucumber test, or the free text of a generic one
fn render_definition<'a>(test: &'a XrayTest) -> Option<String> {
    let text = |value: Option<&'a str>| -> Option<&'a str> { value.map(str::trim).filter(|v| !v.is_empty()) };
    if let Some(gherkin) = text(test.gherkin.as_deref()) {
        return Some(format!("**Gherkin Definition:**\n\n```gherkin\n{}\n```", gherkin));
    }
    text(test.unstructured.as_deref()).map(|definition| format!("**Definition:**\n\n{}", definition))
}

fn render_test_detailed(test: &XrayTest, xray_base_url: &str) -> String {
    if test.steps().is_empty() {
        if let Some(definition) = render_definition(test) {
            return definition;
        }
    }
    render_steps_detailed(test.steps(), xray_base_url)
}

fn non_empty_or_na(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("N/A")
}

/// Tool family for Xray tests
pub struct TestCaseTools {
    jira: Arc<JiraClient>,
    xray: Arc<XrayClient>,
    config: Arc<XrayConfig>,
}

impl TestCaseTools {
    pub fn new(jira: Arc<JiraClient>, xray: Arc<XrayClient>, config: Arc<XrayConfig>) -> Self {
        Self { jira, xray, config }
    }

    #[instrument(skip(self))]
    pub async fn list_tests(&self, params: ListTestsParams) -> XrayMcpResult<String> {
        let project_key = normalize_project_key("project_key", &params.project_key)?;
        let labels = split_list(params.labels.as_deref());
        let component = optional_text(params.component.as_deref());
        info!("Fetching tests for project: {}", project_key);

        let jql = list_tests_jql(
            IssueTypeNames::search_name(&self.config.issue_types.test),
            &project_key,
            &labels,
            component.as_deref(),
        );
        let result = self
            .jira
            .search(&jql, clamp_max_results(params.max_results), ISSUE_LIST_FIELDS)
            .await?;

        if result.issues.is_empty() {
            let mut message = format!("No tests found in project \"{}\"", project_key);
            if !labels.is_empty() {
                message.push_str(&format!(" with labels: {}", labels.join(", ")));
            }
            if let Some(component) = component {
                message.push_str(&format!(" in component: {}", component));
            }
            return Ok(message);
        }

        Ok(render_issue_list(
            &result.issues,
            "test",
            &project_key,
            IssueView::Test,
        ))
    }

    /// Test details; steps are added when Xray is reachable
    #[instrument(skip(self))]
    pub async fn get_test(&self, params: GetTestParams) -> XrayMcpResult<String> {
        let test_key = normalize_issue_key("test_key", &params.test_key)?;
        info!("Fetching test details for: {}", test_key);

        let issue = self.jira.get_issue(&test_key, ISSUE_DETAIL_FIELDS).await?;
        let mut out = render_issue_details("Test", &issue, IssueView::Test, None);

        if !self.xray.is_configured() {
            out.push_str(
                "\n\n_Test steps not loaded: set XRAY_CLIENT_ID and XRAY_CLIENT_SECRET to include them._",
            );
            return Ok(out);
        }

        match self.xray.find_test(&test_key).await {
            Ok(Some(test)) if !test.steps().is_empty() => {
                out.push_str("\n\n");
                out.push_str(&render_steps_compact(test.steps()));
            }
            Ok(Some(test)) => {
                if let Some(definition) = render_definition(&test) {
                    out.push_str("\n\n");
                    out.push_str(&definition);
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!("Could not fetch test steps for {}: {}", test_key, err);
                out.push_str(&format!(
                    "\n\n_Test steps not loaded: {}_",
                    err.user_message()
                ));
            }
        }

        Ok(out)
    }

    /// Test details with steps; requires Xray credentials
    #[instrument(skip(self))]
    pub async fn get_test_with_steps(&self, params: GetTestParams) -> XrayMcpResult<String> {
        let test_key = normalize_issue_key("test_key", &params.test_key)?;
        if !self.xray.is_configured() {
            return Err(XrayMcpError::AuthNotConfigured);
        }
        info!("Fetching test with steps for: {}", test_key);

        let issue = self.jira.get_issue(&test_key, ISSUE_DETAIL_FIELDS).await?;
        let test = self
            .xray
            .find_test(&test_key)
            .await?
            .ok_or_else(|| XrayMcpError::not_found("test in Xray Cloud", test_key.as_str()))?;

        let mut out = render_issue_details(
            "Test",
            &issue,
            IssueView::Test,
            Some(test.test_type_name().unwrap_or("Unknown")),
        );
        out.push_str("\n\n");
        out.push_str(&render_test_detailed(&test, self.xray.base_url()));
        Ok(out)
    }

    #[instrument(skip(self))]
    pub async fn create_test(&self, params: CreateTestParams) -> XrayMcpResult<String> {
        let project_key = normalize_project_key("project_key", &params.project_key)?;
        let summary = require_text("summary", &params.summary)?;
        let test_type = params.test_type.unwrap_or_default();
        let labels = split_list(params.labels.as_deref());
        let priority = optional_text(params.priority.as_deref());
        info!("Creating test in project: {}", project_key);

        let issue_type = self
            .jira
            .resolve_issue_type(&project_key, &self.config.issue_types.test)
            .await?;

        let mut fields = json!({
            "project": { "key": project_key },
            "summary": summary,
            "description": adf_document(params.description.as_deref().unwrap_or_default()),
            "issuetype": { "id": issue_type.id },
        });
        if !labels.is_empty() {
            fields["labels"] = json!(labels);
        }
        if let Some(priority) = &priority {
            fields["priority"] = json!({ "name": priority });
        }

        let created = self.jira.create_issue(fields).await?;

        let type_line = format!("**Type:** {}", test_type.as_str());
        let type_line = if test_type == TestType::Manual {
            type_line
        } else {
            StepOutcome::record(
                "set test type",
                self.jira.set_test_type(&created.key, test_type.as_str()).await,
            )
            .render(type_line, "set test type")
        };

        Ok(confirmation(
            format!("Successfully created test: {}", created.key),
            [
                Some(format!("**Summary:** {}", summary)),
                Some(type_line),
                Some(format!("**Project:** {}", project_key)),
                (!labels.is_empty()).then(|| format!("**Labels:** {}", labels.join(", "))),
                priority.map(|p| format!("**Priority:** {}", p)),
            ],
            self.config.browse_url(&created.key),
        ))
    }

    #[instrument(skip(self))]
    pub async fn update_test(&self, params: UpdateTestParams) -> XrayMcpResult<String> {
        let test_key = normalize_issue_key("test_key", &params.test_key)?;
        let summary = optional_text(params.summary.as_deref());
        let description = optional_text(params.description.as_deref());
        let labels = optional_text(params.labels.as_deref()).map(|l| split_list(Some(&l)));
        let priority = optional_text(params.priority.as_deref());

        let mut fields = Map::new();
        if let Some(summary) = &summary {
            fields.insert("summary".to_string(), json!(summary));
        }
        if let Some(description) = &description {
            fields.insert("description".to_string(), adf_document(description));
        }
        if let Some(labels) = &labels {
            fields.insert("labels".to_string(), json!(labels));
        }
        if let Some(priority) = &priority {
            fields.insert("priority".to_string(), json!({ "name": priority }));
        }

        if fields.is_empty() {
            return Err(XrayMcpError::invalid_param(
                "fields",
                "provide at least one of summary, description, labels or priority",
            ));
        }

        info!("Updating test: {}", test_key);
        self.jira.update_issue(&test_key, Value::Object(fields)).await?;

        Ok(confirmation(
            format!("Successfully updated test: {}", test_key),
            [
                summary.map(|s| format!("**Summary:** {}", s)),
                description.map(|_| "**Description:** updated".to_string()),
                labels.map(|l| format!("**Labels:** {}", l.join(", "))),
                priority.map(|p| format!("**Priority:** {}", p)),
            ],
            self.config.browse_url(&test_key),
        ))
    }
}
