//! Result import tools
//!
//! All imports go to Xray Cloud and need credentials. JSON reports are
//! parsed before upload so malformed input never reaches the network; XML
//! reports and feature files are only checked for content.

use crate::error::{XrayMcpError, XrayMcpResult};
use crate::tools::{normalize_project_key, optional_text};
use crate::xray_client::{
    FeatureImportResponse, ImportExecutionResponse, ImportFormat, ImportPayload, IssueRef,
    XrayClient,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

/// Parameters for the import_execution_results tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImportExecutionResultsParams {
    /// Test execution results in Xray JSON format
    pub results_json: String,
}

/// Parameters for the import_cucumber_results tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImportCucumberResultsParams {
    /// Cucumber JSON report
    pub cucumber_json: String,
}

/// Parameters for the import_junit_results tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImportJunitResultsParams {
    /// JUnit XML report
    pub junit_xml: String,
}

/// Parameters for the import_testng_results tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImportTestngResultsParams {
    /// TestNG XML report
    pub testng_xml: String,
}

/// Parameters for the import_nunit_results tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImportNunitResultsParams {
    /// NUnit XML report
    pub nunit_xml: String,
}

/// Parameters for the import_robot_results tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImportRobotResultsParams {
    /// Robot Framework output.xml content
    pub robot_xml: String,
}

/// Parameters for the import_behave_results tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImportBehaveResultsParams {
    /// Behave JSON report
    pub behave_json: String,
}

/// Parameters for the import_feature_file tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImportFeatureFileParams {
    /// Gherkin feature file content
    pub feature_content: String,

    /// Project key for newly created tests (optional)
    #[serde(default)]
    pub project_key: Option<String>,
}

/// Build the request body for a report, validating it for its format
pub fn import_payload(
    format: ImportFormat,
    parameter: &str,
    content: &str,
) -> XrayMcpResult<ImportPayload> {
    if content.trim().is_empty() {
        return Err(XrayMcpError::invalid_param(parameter, "must not be empty"));
    }
    if format.is_json() {
        let value: Value = serde_json::from_str(content).map_err(|e| {
            XrayMcpError::invalid_param(parameter, format!("invalid JSON: {}", e))
        })?;
        Ok(ImportPayload::Json(value))
    } else {
        Ok(ImportPayload::Xml(content.to_string()))
    }
}

fn issue_label(issue: &IssueRef) -> String {
    match (&issue.key, &issue.id) {
        (Some(key), Some(id)) => format!("{} (ID: {})", key, id),
        (Some(key), None) => key.clone(),
        (None, Some(id)) => format!("ID: {}", id),
        (None, None) => "Unknown".to_string(),
    }
}

pub(crate) fn render_execution_import(
    format: ImportFormat,
    response: &ImportExecutionResponse,
) -> String {
    let mut out = format!("**{} Results Imported Successfully**\n\n", format.label());

    match response.execution_issue() {
        Some(issue) => {
            out.push_str(&format!(
                "**Test Execution:** {}\n**Test Execution ID:** {}\n**URL:** {}",
                issue.key.as_deref().unwrap_or("Unknown"),
                issue.id.as_deref().unwrap_or("Unknown"),
                issue.self_url.as_deref().unwrap_or("N/A"),
            ));
        }
        None => out.push_str("**Test Execution:** not reported by Xray"),
    }

    if let Some(tests) = response.test_issues.as_ref().filter(|t| !t.success.is_empty()) {
        out.push_str(&format!(
            "\n\n**Tests Created/Updated:** {}",
            response.imported_test_count()
        ));
        for test in &tests.success {
            out.push_str(&format!("\n- {}", issue_label(test)));
        }
    }
    out
}

pub(crate) fn render_feature_import(response: &FeatureImportResponse) -> String {
    let mut out = String::from("**Feature File Imported Successfully**");

    let sections = [
        ("Tests Created/Updated", &response.updated_or_created_tests),
        (
            "Preconditions Created/Updated",
            &response.updated_or_created_preconditions,
        ),
    ];
    for (title, issues) in sections {
        if issues.is_empty() {
            continue;
        }
        out.push_str(&format!("\n\n**{}:** {}", title, issues.len()));
        for issue in issues {
            out.push_str(&format!(
                "\n- {}",
                issue
                    .key
                    .as_deref()
                    .or(issue.id.as_deref())
                    .unwrap_or("Unknown")
            ));
        }
    }

    if !response.errors.is_empty() {
        out.push_str("\n\n**Errors:**");
        for error in &response.errors {
            out.push_str(&format!("\n- {}", error));
        }
    }
    out
}

/// Tool family for Xray result imports
pub struct ImportTools {
    xray: Arc<XrayClient>,
}

impl ImportTools {
    pub fn new(xray: Arc<XrayClient>) -> Self {
        Self { xray }
    }

    fn ensure_configured(&self) -> XrayMcpResult<()> {
        if self.xray.is_configured() {
            Ok(())
        } else {
            Err(XrayMcpError::AuthNotConfigured)
        }
    }

    async fn import(
        &self,
        format: ImportFormat,
        parameter: &str,
        content: &str,
    ) -> XrayMcpResult<String> {
        self.ensure_configured()?;
        let payload = import_payload(format, parameter, content)?;
        info!("Importing {} results", format.label());

        let response = self.xray.import_results(format, payload).await?;
        Ok(render_execution_import(format, &response))
    }

    #[instrument(skip_all)]
    pub async fn import_execution_results(
        &self,
        params: ImportExecutionResultsParams,
    ) -> XrayMcpResult<String> {
        self.import(ImportFormat::XrayJson, "results_json", &params.results_json)
            .await
    }

    #[instrument(skip_all)]
    pub async fn import_cucumber_results(
        &self,
        params: ImportCucumberResultsParams,
    ) -> XrayMcpResult<String> {
        self.import(ImportFormat::Cucumber, "cucumber_json", &params.cucumber_json)
            .await
    }

    #[instrument(skip_all)]
    pub async fn import_junit_results(
        &self,
        params: ImportJunitResultsParams,
    ) -> XrayMcpResult<String> {
        self.import(ImportFormat::JUnit, "junit_xml", &params.junit_xml)
            .await
    }

    #[instrument(skip_all)]
    pub async fn import_testng_results(
        &self,
        params: ImportTestngResultsParams,
    ) -> XrayMcpResult<String> {
        self.import(ImportFormat::TestNg, "testng_xml", &params.testng_xml)
            .await
    }

    #[instrument(skip_all)]
    pub async fn import_nunit_results(
        &self,
        params: ImportNunitResultsParams,
    ) -> XrayMcpResult<String> {
        self.import(ImportFormat::NUnit, "nunit_xml", &params.nunit_xml)
            .await
    }

    #[instrument(skip_all)]
    pub async fn import_robot_results(
        &self,
        params: ImportRobotResultsParams,
    ) -> XrayMcpResult<String> {
        self.import(ImportFormat::Robot, "robot_xml", &params.robot_xml)
            .await
    }

    #[instrument(skip_all)]
    pub async fn import_behave_results(
        &self,
        params: ImportBehaveResultsParams,
    ) -> XrayMcpResult<String> {
        self.import(ImportFormat::Behave, "behave_json", &params.behave_json)
            .await
    }

    #[instrument(skip_all)]
    pub async fn import_feature_file(
        &self,
        params: ImportFeatureFileParams,
    ) -> XrayMcpResult<String> {
        self.ensure_configured()?;
        if params.feature_content.trim().is_empty() {
            return Err(XrayMcpError::invalid_param(
                "feature_content",
                "must not be empty",
            ));
        }
        let project_key = optional_text(params.project_key.as_deref())
            .map(|key| normalize_project_key("project_key", &key))
            .transpose()?;
        info!("Importing feature file into project {:?}", project_key);

        let response = self
            .xray
            .import_feature_file(params.feature_content, project_key.as_deref())
            .await?;
        Ok(render_feature_import(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_json_reports_must_parse() {
        assert_matches!(
            import_payload(ImportFormat::Cucumber, "cucumber_json", "[{\"id\": "),
            Err(XrayMcpError::InvalidParameter { ref parameter, .. }) if parameter == "cucumber_json"
        );
        assert_matches!(
            import_payload(ImportFormat::XrayJson, "results_json", "{\"tests\": []}"),
            Ok(ImportPayload::Json(_))
        );
    }

    #[test]
    fn test_xml_reports_must_not_be_empty() {
        assert_matches!(
            import_payload(ImportFormat::JUnit, "junit_xml", "  \n"),
            Err(XrayMcpError::InvalidParameter { ref parameter, .. }) if parameter == "junit_xml"
        );
        assert_matches!(
            import_payload(ImportFormat::Robot, "robot_xml", "<robot/>"),
            Ok(ImportPayload::Xml(ref body)) if body == "<robot/>"
        );
    }

    #[test]
    fn test_render_execution_import() {
        let response: ImportExecutionResponse = serde_json::from_value(json!({
            "testExecIssue": {"id": "10200", "key": "XT-50", "self": "https://jira.example/rest/api/2/issue/10200"},
            "testIssues": {"success": [{"id": "10001", "key": "XT-1"}]}
        }))
        .unwrap();

        assert_eq!(
            render_execution_import(ImportFormat::JUnit, &response),
            "**JUnit Results Imported Successfully**\n\n**Test Execution:** XT-50\n**Test Execution ID:** 10200\n**URL:** https://jira.example/rest/api/2/issue/10200\n\n**Tests Created/Updated:** 1\n- XT-1 (ID: 10001)"
        );
    }

    #[test]
    fn test_render_flat_execution_import() {
        let response: ImportExecutionResponse =
            serde_json::from_value(json!({"id": "10300", "key": "XT-60"})).unwrap();
        let text = render_execution_import(ImportFormat::XrayJson, &response);
        assert!(text.starts_with("**Execution Results Imported Successfully**"));
        assert!(text.contains("**Test Execution:** XT-60"));
        assert!(!text.contains("Tests Created/Updated"));
    }

    #[test]
    fn test_render_feature_import() {
        let response: FeatureImportResponse = serde_json::from_value(json!({
            "updatedOrCreatedTests": [{"id": "1", "key": "XT-7"}],
            "updatedOrCreatedPreconditions": [{"id": "2"}],
            "errors": ["Scenario 3 has no steps"]
        }))
        .unwrap();

        let text = render_feature_import(&response);
        assert!(text.contains("**Tests Created/Updated:** 1\n- XT-7"));
        assert!(text.contains("**Preconditions Created/Updated:** 1\n- 2"));
        assert!(text.contains("**Errors:**\n- Scenario 3 has no steps"));
    }
}
