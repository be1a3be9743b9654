//! Xray Cloud API client
//!
//! Every request carries a bearer token from the shared token source. A 401
//! from Xray invalidates the held token before the error is returned, so the
//! next call authenticates again.

use crate::auth::BearerTokenSource;
use crate::backend::{read_json, read_json_or_default, BackendClient, BackendRequest};
use crate::config::XrayConfig;
use crate::error::{XrayMcpError, XrayMcpResult};
use crate::jira_client::jql_string;
use reqwest::header::HeaderMap;
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const GET_TEST_QUERY: &str = r#"query GetTest($jql: String!) {
  getTests(jql: $jql, limit: 1) {
    total
    results {
      issueId
      testType { name kind }
      steps { id action data result }
      gherkin
      unstructured
    }
  }
}"#;

/// Result formats accepted by the Xray import endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    XrayJson,
    Cucumber,
    Behave,
    JUnit,
    TestNg,
    NUnit,
    Robot,
}

impl ImportFormat {
    pub fn path(self) -> &'static str {
        match self {
            ImportFormat::XrayJson => "/import/execution",
            ImportFormat::Cucumber => "/import/execution/cucumber",
            ImportFormat::Behave => "/import/execution/behave",
            ImportFormat::JUnit => "/import/execution/junit",
            ImportFormat::TestNg => "/import/execution/testng",
            ImportFormat::NUnit => "/import/execution/nunit",
            ImportFormat::Robot => "/import/execution/robot",
        }
    }

    /// Human-readable format name
    pub fn label(self) -> &'static str {
        match self {
            ImportFormat::XrayJson => "Execution",
            ImportFormat::Cucumber => "Cucumber",
            ImportFormat::Behave => "Behave",
            ImportFormat::JUnit => "JUnit",
            ImportFormat::TestNg => "TestNG",
            ImportFormat::NUnit => "NUnit",
            ImportFormat::Robot => "Robot Framework",
        }
    }

    pub fn is_json(self) -> bool {
        matches!(
            self,
            ImportFormat::XrayJson | ImportFormat::Cucumber | ImportFormat::Behave
        )
    }
}

/// Body of an import request
#[derive(Debug, Clone)]
pub enum ImportPayload {
    Json(Value),
    Xml(String),
}

/// Issue reference in Xray responses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(rename = "self", default)]
    pub self_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedTests {
    #[serde(default)]
    pub success: Vec<IssueRef>,
}

/// Response of an execution-results import
///
/// Xray answers either with a `testExecIssue` object or with the
/// execution issue fields at the top level.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportExecutionResponse {
    pub test_exec_issue: Option<IssueRef>,
    pub test_issues: Option<ImportedTests>,
    pub id: Option<String>,
    pub key: Option<String>,
    #[serde(rename = "self")]
    pub self_url: Option<String>,
}

impl ImportExecutionResponse {
    pub fn execution_issue(&self) -> Option<IssueRef> {
        if let Some(issue) = &self.test_exec_issue {
            return Some(issue.clone());
        }
        self.key.as_ref().map(|key| IssueRef {
            id: self.id.clone(),
            key: Some(key.clone()),
            self_url: self.self_url.clone(),
        })
    }

    pub fn imported_test_count(&self) -> usize {
        self.test_issues.as_ref().map_or(0, |t| t.success.len())
    }
}

/// Response of a feature-file import
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureImportResponse {
    #[serde(default)]
    pub updated_or_created_tests: Vec<IssueRef>,
    #[serde(default)]
    pub updated_or_created_preconditions: Vec<IssueRef>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Xray test definition from the GraphQL API
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XrayTest {
    pub issue_id: Option<String>,
    pub test_type: Option<XrayTestType>,
    pub steps: Option<Vec<XrayTestStep>>,
    pub gherkin: Option<String>,
    pub unstructured: Option<String>,
}

impl XrayTest {
    pub fn steps(&self) -> &[XrayTestStep] {
        self.steps.as_deref().unwrap_or_default()
    }

    pub fn test_type_name(&self) -> Option<&str> {
        self.test_type.as_ref().and_then(|t| t.name.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct XrayTestType {
    pub name: Option<String>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct XrayTestStep {
    pub id: Option<String>,
    pub action: Option<String>,
    pub data: Option<String>,
    pub result: Option<String>,
}

#[derive(Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetTestsData {
    get_tests: Option<TestResults>,
}

#[derive(Deserialize)]
struct TestResults {
    #[serde(default)]
    results: Vec<XrayTest>,
}

/// Client for the Xray Cloud REST and GraphQL APIs
#[derive(Clone)]
pub struct XrayClient {
    backend: BackendClient,
    tokens: Arc<dyn BearerTokenSource>,
}

impl XrayClient {
    pub fn new(config: &XrayConfig, tokens: Arc<dyn BearerTokenSource>) -> XrayMcpResult<Self> {
        let backend = BackendClient::new(
            config.xray_base_url.clone(),
            config.request_timeout(),
            HeaderMap::new(),
        )?;
        Ok(Self { backend, tokens })
    }

    pub fn is_configured(&self) -> bool {
        self.tokens.is_configured()
    }

    pub fn base_url(&self) -> &str {
        self.backend.base_url()
    }

    /// Send with a bearer token, invalidating it if Xray rejects it
    async fn send_authorized(&self, request: BackendRequest) -> XrayMcpResult<Response> {
        let token = self.tokens.authenticate().await?;
        match self.backend.send(request.bearer(token)).await {
            Err(err) if err.is_unauthorized() => {
                warn!("Xray rejected the access token, invalidating it");
                self.tokens.invalidate();
                Err(XrayMcpError::authorization_expired(err.user_message()))
            }
            other => other,
        }
    }

    async fn graphql<T: DeserializeOwned>(&self, query: &str, variables: Value) -> XrayMcpResult<T> {
        let body = serde_json::to_value(GraphqlRequest { query, variables })?;
        let response = self
            .send_authorized(BackendRequest::post("/graphql").json(body))
            .await?;
        let payload: GraphqlResponse<T> = read_json(response).await?;

        if !payload.errors.is_empty() {
            let messages: Vec<_> = payload.errors.into_iter().map(|e| e.message).collect();
            return Err(XrayMcpError::upstream(
                None,
                format!("GraphQL errors: {}", messages.join("; ")),
            ));
        }

        payload
            .data
            .ok_or_else(|| XrayMcpError::internal("GraphQL response contained no data"))
    }

    /// Look up the Xray definition of a test by issue key
    #[instrument(skip(self))]
    pub async fn find_test(&self, test_key: &str) -> XrayMcpResult<Option<XrayTest>> {
        let variables = json!({ "jql": format!("key = {}", jql_string(test_key)) });
        let data: GetTestsData = self.graphql(GET_TEST_QUERY, variables).await?;
        let test = data.get_tests.and_then(|r| r.results.into_iter().next());
        debug!("Xray test lookup for {} found: {}", test_key, test.is_some());
        Ok(test)
    }

    /// Import execution results in one of the supported formats
    #[instrument(skip(self, payload))]
    pub async fn import_results(
        &self,
        format: ImportFormat,
        payload: ImportPayload,
    ) -> XrayMcpResult<ImportExecutionResponse> {
        let request = BackendRequest::post(format.path());
        let request = match payload {
            ImportPayload::Json(body) => request.json(body),
            ImportPayload::Xml(body) => request.raw("application/xml", body),
        };

        let response = self.send_authorized(request).await?;
        let imported: ImportExecutionResponse = read_json_or_default(response).await?;
        info!(
            "Imported {} results into {:?}",
            format.label(),
            imported.execution_issue().and_then(|i| i.key)
        );
        Ok(imported)
    }

    /// Create or update Cucumber tests from a feature file
    #[instrument(skip(self, feature_content))]
    pub async fn import_feature_file(
        &self,
        feature_content: String,
        project_key: Option<&str>,
    ) -> XrayMcpResult<FeatureImportResponse> {
        let mut request =
            BackendRequest::post("/import/feature").raw("application/octet-stream", feature_content);
        if let Some(project_key) = project_key {
            request = request.query("projectKey", project_key);
        }

        let response = self.send_authorized(request).await?;
        read_json_or_default(response).await
    }

    /// Export Cucumber feature text for the given test keys
    #[instrument(skip(self))]
    pub async fn export_cucumber_features(&self, test_keys: &[String]) -> XrayMcpResult<String> {
        let mut request = BackendRequest::get("/export/cucumber");
        if !test_keys.is_empty() {
            request = request.query("keys", test_keys.join(";"));
        }

        let response = self.send_authorized(request).await?;
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::XrayTokenCache;
    use crate::config::XrayCredentials;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> (XrayClient, Arc<XrayTokenCache>) {
        let config = XrayConfig {
            xray_base_url: server.uri(),
            xray: XrayCredentials::new("id", "secret"),
            ..Default::default()
        };
        let cache = Arc::new(
            XrayTokenCache::new(config.xray.clone(), &server.uri(), Duration::from_secs(5))
                .unwrap(),
        );
        let client = XrayClient::new(&config, cache.clone()).unwrap();
        (client, cache)
    }

    async fn mount_auth(server: &MockServer, calls: u64) {
        Mock::given(method("POST"))
            .and(path("/authenticate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!("T")))
            .expect(calls)
            .mount(server)
            .await;
    }

    #[test]
    fn test_import_format_routes() {
        assert_eq!(ImportFormat::XrayJson.path(), "/import/execution");
        assert_eq!(ImportFormat::Robot.path(), "/import/execution/robot");
        assert!(ImportFormat::Behave.is_json());
        assert!(!ImportFormat::NUnit.is_json());
        assert_eq!(ImportFormat::TestNg.label(), "TestNG");
    }

    #[test]
    fn test_import_response_shapes() {
        let nested: ImportExecutionResponse = serde_json::from_value(json!({
            "testExecIssue": {"id": "100", "key": "XT-50", "self": "https://x/rest/api/2/issue/100"},
            "testIssues": {"success": [{"key": "XT-1"}, {"key": "XT-2"}]}
        }))
        .unwrap();
        assert_eq!(nested.execution_issue().unwrap().key.as_deref(), Some("XT-50"));
        assert_eq!(nested.imported_test_count(), 2);

        let flat: ImportExecutionResponse =
            serde_json::from_value(json!({"id": "101", "key": "XT-51", "self": "u"})).unwrap();
        assert_eq!(flat.execution_issue().unwrap().id.as_deref(), Some("101"));
        assert_eq!(flat.imported_test_count(), 0);

        assert!(ImportExecutionResponse::default().execution_issue().is_none());
    }

    #[tokio::test]
    async fn test_find_test_sends_jql_variable() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("authorization", "Bearer T"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"getTests": {"total": 1, "results": [{
                    "issueId": "100",
                    "testType": {"name": "Manual", "kind": "Steps"},
                    "steps": [{"id": "s1", "action": "Open", "data": null, "result": "Opened"}]
                }]}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (xray, _) = client(&server);
        let test = xray.find_test("XT-1").await.unwrap().unwrap();
        assert_eq!(test.test_type_name(), Some("Manual"));
        assert_eq!(test.steps().len(), 1);

        let requests = server.received_requests().await.unwrap();
        let graphql: Value = requests
            .iter()
            .find(|r| r.url.path() == "/graphql")
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .unwrap();
        assert_eq!(graphql["variables"]["jql"], "key = \"XT-1\"");
    }

    #[tokio::test]
    async fn test_find_test_quotes_the_key() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"getTests": {"total": 0, "results": []}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (xray, _) = client(&server);
        assert!(xray.find_test("XT-1\" OR project = \"OPS").await.unwrap().is_none());

        let requests = server.received_requests().await.unwrap();
        let graphql: Value = requests
            .iter()
            .find(|r| r.url.path() == "/graphql")
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .unwrap();
        assert_eq!(
            graphql["variables"]["jql"],
            "key = \"XT-1\\\" OR project = \\\"OPS\""
        );
    }

    #[tokio::test]
    async fn test_graphql_errors_are_reported() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{"message": "jql is invalid"}]
            })))
            .mount(&server)
            .await;

        let (xray, _) = client(&server);
        let err = xray.find_test("XT-1").await.unwrap_err();
        assert!(err.user_message().contains("GraphQL errors: jql is invalid"));
    }

    #[tokio::test]
    async fn test_unauthorized_invalidates_token() {
        let server = MockServer::start().await;
        mount_auth(&server, 2).await;
        Mock::given(method("POST"))
            .and(path("/import/execution/junit"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "token expired"})))
            .expect(2)
            .mount(&server)
            .await;

        let (xray, cache) = client(&server);
        let first = xray
            .import_results(ImportFormat::JUnit, ImportPayload::Xml("<testsuite/>".into()))
            .await;
        assert_matches!(first, Err(XrayMcpError::AuthorizationExpired { .. }));
        assert!(!cache.stats().has_token);

        // The next call authenticates again before retrying the import
        let second = xray
            .import_results(ImportFormat::JUnit, ImportPayload::Xml("<testsuite/>".into()))
            .await;
        assert_matches!(second, Err(XrayMcpError::AuthorizationExpired { .. }));
    }

    #[tokio::test]
    async fn test_feature_import_with_project() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/import/feature"))
            .and(query_param("projectKey", "XT"))
            .and(header("content-type", "application/octet-stream"))
            .and(body_string("Feature: Login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "updatedOrCreatedTests": [{"id": "1", "key": "XT-7"}],
                "updatedOrCreatedPreconditions": [],
                "errors": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (xray, _) = client(&server);
        let response = xray
            .import_feature_file("Feature: Login".to_string(), Some("XT"))
            .await
            .unwrap();
        assert_eq!(response.updated_or_created_tests.len(), 1);
    }

    #[tokio::test]
    async fn test_export_joins_keys() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/export/cucumber"))
            .and(query_param("keys", "XT-1;XT-2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Feature: A"))
            .expect(1)
            .mount(&server)
            .await;

        let (xray, _) = client(&server);
        let text = xray
            .export_cucumber_features(&["XT-1".to_string(), "XT-2".to_string()])
            .await
            .unwrap();
        assert_eq!(text, "Feature: A");
    }

    #[tokio::test]
    async fn test_unconfigured_client_makes_no_calls() {
        let server = MockServer::start().await;
        mount_auth(&server, 0).await;
        let config = XrayConfig {
            xray_base_url: server.uri(),
            ..Default::default()
        };
        let cache = Arc::new(XrayTokenCache::from_config(&config).unwrap());
        let xray = XrayClient::new(&config, cache).unwrap();

        assert!(!xray.is_configured());
        assert_matches!(
            xray.export_cucumber_features(&[]).await,
            Err(XrayMcpError::AuthNotConfigured)
        );
    }
}
