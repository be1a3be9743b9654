//! Test set tools

use crate::config::{IssueTypeNames, XrayConfig};
use crate::error::XrayMcpResult;
use crate::jira_client::{JiraClient, ISSUE_LIST_FIELDS};
use crate::tools::test_plans::{container_jql, render_associated_tests, CONTAINER_DETAIL_FIELDS};
use crate::tools::{
    clamp_max_results, normalize_issue_key, normalize_project_key, render_issue_details,
    render_issue_list, IssueView,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Parameters for the list_test_sets tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListTestSetsParams {
    /// Jira project key (e.g., "PROJ")
    pub project_key: String,

    /// Maximum number of results (default: 50, max: 100)
    #[serde(default)]
    pub max_results: Option<u32>,
}

/// Parameters for the get_test_set tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetTestSetParams {
    /// Test Set issue key (e.g., "PROJ-321")
    pub test_set_key: String,
}

/// Tool family for Xray test sets
pub struct TestSetTools {
    jira: Arc<JiraClient>,
    config: Arc<XrayConfig>,
}

impl TestSetTools {
    pub fn new(jira: Arc<JiraClient>, config: Arc<XrayConfig>) -> Self {
        Self { jira, config }
    }

    #[instrument(skip(self))]
    pub async fn list_test_sets(&self, params: ListTestSetsParams) -> XrayMcpResult<String> {
        let project_key = normalize_project_key("project_key", &params.project_key)?;
        info!("Fetching test sets for project: {}", project_key);

        let jql = container_jql(
            IssueTypeNames::search_name(&self.config.issue_types.test_set),
            &project_key,
        );
        let result = self
            .jira
            .search(&jql, clamp_max_results(params.max_results), ISSUE_LIST_FIELDS)
            .await?;

        if result.issues.is_empty() {
            return Ok(format!("No test sets found in project \"{}\"", project_key));
        }

        Ok(render_issue_list(
            &result.issues,
            "test set",
            &project_key,
            IssueView::Basic,
        ))
    }

    #[instrument(skip(self))]
    pub async fn get_test_set(&self, params: GetTestSetParams) -> XrayMcpResult<String> {
        let key = normalize_issue_key("test_set_key", &params.test_set_key)?;
        info!("Fetching test set details for: {}", key);

        let issue = self.jira.get_issue(&key, CONTAINER_DETAIL_FIELDS).await?;
        let tests = self.jira.test_set_tests(&key).await.unwrap_or_else(|err| {
            warn!("Could not fetch tests of test set {}: {}", key, err);
            Vec::new()
        });

        let mut out = render_issue_details("Test Set", &issue, IssueView::Basic, None);
        out.push_str("\n\n");
        out.push_str(&render_associated_tests(&tests));
        Ok(out)
    }
}
