//! Jira REST client
//!
//! Wraps the Jira Cloud REST API v3 and the Xray raven REST endpoints that
//! live on the same site. Every call authenticates with the account email
//! and API token as HTTP Basic credentials.

use crate::backend::{BackendClient, BackendRequest};
use crate::cache::{IssueTypeInfo, MetadataCache};
use crate::config::XrayConfig;
use crate::error::{XrayMcpError, XrayMcpResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument};

const RAVEN_API: &str = "/rest/raven/1.0/api";

/// Field holding the test environments of a Test Execution
pub const TEST_ENVIRONMENTS_FIELD: &str = "customfield_testEnvironments";

/// Fields requested for test, plan and set listings
pub const ISSUE_LIST_FIELDS: &[&str] = &[
    "summary",
    "status",
    "priority",
    "labels",
    "components",
    "created",
    "updated",
    "assignee",
];

/// Fields requested for single-issue detail views
pub const ISSUE_DETAIL_FIELDS: &[&str] = &[
    "summary",
    "description",
    "status",
    "priority",
    "labels",
    "components",
    "created",
    "updated",
    "assignee",
    "reporter",
    "issuetype",
    "project",
];

/// Jira issue as returned by search and get
#[derive(Debug, Clone, Deserialize)]
pub struct JiraIssue {
    #[serde(default)]
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub fields: IssueFields,
}

/// Subset of issue fields this server renders
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IssueFields {
    pub summary: Option<String>,
    pub description: Option<Value>,
    pub status: Option<NamedEntity>,
    pub priority: Option<NamedEntity>,
    #[serde(rename = "issuetype")]
    pub issue_type: Option<NamedEntity>,
    pub project: Option<ProjectRef>,
    pub labels: Option<Vec<String>>,
    pub components: Option<Vec<NamedEntity>>,
    pub assignee: Option<JiraUser>,
    pub reporter: Option<JiraUser>,
    pub created: Option<String>,
    pub updated: Option<String>,
}

impl IssueFields {
    pub fn summary(&self) -> &str {
        self.summary.as_deref().unwrap_or_default()
    }

    pub fn status_name(&self) -> &str {
        self.status.as_ref().map_or("Unknown", |s| s.name.as_str())
    }

    pub fn priority_name(&self) -> &str {
        self.priority.as_ref().map_or("Not set", |p| p.name.as_str())
    }

    pub fn labels(&self) -> &[String] {
        self.labels.as_deref().unwrap_or_default()
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn assignee_name(&self) -> &str {
        self.assignee
            .as_ref()
            .and_then(|u| u.display_name.as_deref())
            .unwrap_or("Unassigned")
    }

    pub fn reporter_name(&self) -> &str {
        self.reporter
            .as_ref()
            .and_then(|u| u.display_name.as_deref())
            .unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamedEntity {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectRef {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraUser {
    pub account_id: Option<String>,
    pub display_name: Option<String>,
    pub email_address: Option<String>,
}

/// Result page of a JQL search
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[serde(default)]
    pub issues: Vec<JiraIssue>,
}

/// Issue created through `POST /rest/api/3/issue`
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedIssue {
    #[serde(default)]
    pub id: String,
    pub key: String,
    #[serde(rename = "self", default)]
    pub self_url: Option<String>,
}

/// Issue reference returned by the raven list endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueKeyRef {
    #[serde(default)]
    pub key: String,
}

/// Test run inside a Test Execution
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub test_key: Option<String>,
    pub key: Option<String>,
    pub status: Option<String>,
    pub executed_by: Option<String>,
    pub comment: Option<String>,
    pub defects: Option<Vec<Value>>,
}

impl TestRun {
    pub fn test_key(&self) -> &str {
        self.test_key
            .as_deref()
            .or(self.key.as_deref())
            .unwrap_or("Unknown")
    }

    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or("TODO")
    }

    /// Defect keys, whether listed as strings or as issue objects
    pub fn defect_keys(&self) -> Vec<String> {
        self.defects
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|defect| match defect {
                Value::String(key) => Some(key.clone()),
                Value::Object(map) => map.get("key").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect()
    }
}

/// New status of one test run
#[derive(Debug, Clone, Serialize)]
pub struct TestRunUpdate {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defects: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct CreateMetaResponse {
    #[serde(default)]
    projects: Vec<CreateMetaProject>,
}

#[derive(Debug, Deserialize)]
struct CreateMetaProject {
    #[serde(default)]
    issuetypes: Vec<IssueTypeInfo>,
}

/// Quote a value for use inside JQL
pub fn jql_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Jira client that provides MCP-friendly operations
#[derive(Debug, Clone)]
pub struct JiraClient {
    backend: BackendClient,
    cache: Arc<MetadataCache>,
}

impl JiraClient {
    /// Create a client for the configured Jira site
    pub fn new(config: &XrayConfig, cache: Arc<MetadataCache>) -> XrayMcpResult<Self> {
        info!("Initializing Jira client for URL: {}", config.jira_base_url);
        let backend = BackendClient::with_authorization(
            config.jira_base_url.clone(),
            config.request_timeout(),
            &config.basic_auth_header(),
        )?;
        Ok(Self { backend, cache })
    }

    /// Search for issues using JQL
    #[instrument(skip(self, fields))]
    pub async fn search(
        &self,
        jql: &str,
        max_results: u32,
        fields: &[&str],
    ) -> XrayMcpResult<SearchResult> {
        let body = json!({
            "jql": jql,
            "maxResults": max_results,
            "fields": fields,
        });
        let result: SearchResult = self
            .backend
            .send_json(BackendRequest::post("/rest/api/3/search/jql").json(body))
            .await?;
        debug!("JQL search returned {} issues", result.issues.len());
        Ok(result)
    }

    /// Get a single issue with the given fields
    #[instrument(skip(self, fields))]
    pub async fn get_issue(&self, issue_key: &str, fields: &[&str]) -> XrayMcpResult<JiraIssue> {
        self.backend
            .send_json(
                BackendRequest::get(format!("/rest/api/3/issue/{}", issue_key))
                    .query("fields", fields.join(",")),
            )
            .await
    }

    /// Issue types of a project, served from the metadata cache when fresh
    #[instrument(skip(self))]
    pub async fn project_issue_types(&self, project_key: &str) -> XrayMcpResult<Vec<IssueTypeInfo>> {
        if let Some(types) = self.cache.get_project_issue_types(project_key) {
            debug!("Using cached issue types for project {}", project_key);
            return Ok(types);
        }

        let meta: CreateMetaResponse = self
            .backend
            .send_json(
                BackendRequest::get("/rest/api/3/issue/createmeta")
                    .query("projectKeys", project_key)
                    .query("expand", "projects.issuetypes.fields"),
            )
            .await?;

        let project = meta
            .projects
            .into_iter()
            .next()
            .ok_or_else(|| XrayMcpError::not_found("project", project_key))?;

        self.cache
            .set_project_issue_types(project_key.to_string(), project.issuetypes.clone());
        Ok(project.issuetypes)
    }

    /// First issue type of the project whose name is one of `candidates`
    pub async fn resolve_issue_type(
        &self,
        project_key: &str,
        candidates: &[String],
    ) -> XrayMcpResult<IssueTypeInfo> {
        let types = self.project_issue_types(project_key).await?;
        types
            .into_iter()
            .find(|t| candidates.iter().any(|c| c == &t.name))
            .ok_or_else(|| {
                XrayMcpError::not_found(
                    "issue type",
                    format!("{} in project {}", candidates.join(" / "), project_key),
                )
            })
    }

    /// Create an issue from a fields object
    #[instrument(skip(self, fields))]
    pub async fn create_issue(&self, fields: Value) -> XrayMcpResult<CreatedIssue> {
        let created: CreatedIssue = self
            .backend
            .send_json(BackendRequest::post("/rest/api/3/issue").json(json!({ "fields": fields })))
            .await?;
        info!("Created issue {}", created.key);
        Ok(created)
    }

    /// Update fields of an existing issue
    #[instrument(skip(self, fields))]
    pub async fn update_issue(&self, issue_key: &str, fields: Value) -> XrayMcpResult<()> {
        self.backend
            .send_empty(
                BackendRequest::put(format!("/rest/api/3/issue/{}", issue_key))
                    .json(json!({ "fields": fields })),
            )
            .await
    }

    /// Attach test environments to a Test Execution
    pub async fn set_test_environments(
        &self,
        issue_key: &str,
        environments: &[String],
    ) -> XrayMcpResult<()> {
        let mut fields = serde_json::Map::new();
        fields.insert(TEST_ENVIRONMENTS_FIELD.to_string(), json!(environments));
        self.update_issue(issue_key, Value::Object(fields)).await
    }

    /// Set the Xray test type of a Test issue
    pub async fn set_test_type(&self, test_key: &str, test_type: &str) -> XrayMcpResult<()> {
        self.backend
            .send_empty(
                BackendRequest::put(format!("{}/test/{}", RAVEN_API, test_key))
                    .json(json!({ "testType": test_type })),
            )
            .await
    }

    pub async fn add_tests_to_test_plan(
        &self,
        test_plan_key: &str,
        test_keys: &[String],
    ) -> XrayMcpResult<()> {
        self.backend
            .send_empty(
                BackendRequest::post(format!("{}/testplan/{}/test", RAVEN_API, test_plan_key))
                    .json(json!({ "add": test_keys })),
            )
            .await
    }

    pub async fn add_test_executions_to_test_plan(
        &self,
        test_plan_key: &str,
        execution_keys: &[String],
    ) -> XrayMcpResult<()> {
        self.backend
            .send_empty(
                BackendRequest::post(format!(
                    "{}/testplan/{}/testexecution",
                    RAVEN_API, test_plan_key
                ))
                .json(json!({ "add": execution_keys })),
            )
            .await
    }

    pub async fn add_tests_to_test_execution(
        &self,
        test_execution_key: &str,
        test_keys: &[String],
    ) -> XrayMcpResult<()> {
        self.backend
            .send_empty(
                BackendRequest::post(format!("{}/testexec/{}/test", RAVEN_API, test_execution_key))
                    .json(json!({ "add": test_keys })),
            )
            .await
    }

    pub async fn test_plan_tests(&self, test_plan_key: &str) -> XrayMcpResult<Vec<IssueKeyRef>> {
        self.backend
            .send_json(BackendRequest::get(format!(
                "{}/testplan/{}/test",
                RAVEN_API, test_plan_key
            )))
            .await
    }

    pub async fn test_set_tests(&self, test_set_key: &str) -> XrayMcpResult<Vec<IssueKeyRef>> {
        self.backend
            .send_json(BackendRequest::get(format!(
                "{}/testset/{}/test",
                RAVEN_API, test_set_key
            )))
            .await
    }

    pub async fn test_execution_runs(&self, test_execution_key: &str) -> XrayMcpResult<Vec<TestRun>> {
        self.backend
            .send_json(BackendRequest::get(format!(
                "{}/testexec/{}/test",
                RAVEN_API, test_execution_key
            )))
            .await
    }

    /// Record the outcome of one test inside a Test Execution
    #[instrument(skip(self, update))]
    pub async fn update_test_run_status(
        &self,
        test_execution_key: &str,
        test_key: &str,
        update: &TestRunUpdate,
    ) -> XrayMcpResult<()> {
        self.backend
            .send_empty(
                BackendRequest::put(format!(
                    "{}/testexec/{}/test/{}/status",
                    RAVEN_API, test_execution_key, test_key
                ))
                .json(serde_json::to_value(update)?),
            )
            .await
    }
}
