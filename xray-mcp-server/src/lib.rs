//! Xray MCP Server Library
//!
//! Exposes Xray test management on Jira Cloud to MCP hosts over stdio.
//! Tests, test executions, test plans and test sets are read and written
//! through the Jira REST API and its Xray extension; step details, result
//! imports and feature exports go through the Xray Cloud API with a cached
//! bearer token.
//!
//! ## Features
//!
//! - **Test management**: list, inspect, create and update Xray issues
//! - **Result imports**: Xray JSON, Cucumber, Behave, JUnit, TestNG, NUnit and Robot Framework
//! - **Token caching**: one shared Xray token, refreshed once for concurrent callers
//! - **Error Handling**: MCP-compliant error codes and messages

use crate::auth::XrayTokenCache;
use crate::cache::MetadataCache;
use crate::config::XrayConfig;
use crate::dispatcher::{Dispatcher, ToolCall};
use crate::error::XrayMcpResult;
use crate::jira_client::JiraClient;
use crate::tools::*;
use crate::xray_client::XrayClient;

use pulseengine_mcp_macros::{mcp_server, mcp_tools};
use std::sync::Arc;
use tracing::{info, instrument};

pub mod auth;
pub mod backend;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod formatting;
pub mod jira_client;
pub mod tools;
pub mod xray_client;

/// Xray MCP Server
///
/// Composition root: owns the single token cache and both API clients, and
/// exposes every tool through the dispatcher.
#[mcp_server(
    name = "Xray MCP Server",
    version = "0.1.0",
    description = "Xray test management for Jira Cloud: tests, executions, plans, sets, result imports and Cucumber exports",
    auth = "disabled"
)]
#[derive(Clone)]
pub struct XrayMcpServer {
    config: Arc<XrayConfig>,
    tokens: Arc<XrayTokenCache>,
    dispatcher: Arc<Dispatcher>,
}

impl Default for XrayMcpServer {
    fn default() -> Self {
        // The macro requires Default; a server without configuration is unusable
        panic!("XrayMcpServer cannot be created with default(). Use XrayMcpServer::new() instead.")
    }
}

impl XrayMcpServer {
    /// Create a server from the environment and optional config file
    #[instrument]
    pub async fn new() -> XrayMcpResult<Self> {
        info!("Initializing Xray MCP Server");

        let config = XrayConfig::load()?;
        info!("Configuration loaded successfully");

        Self::with_config(config).await
    }

    /// Create server with custom configuration (for testing)
    #[instrument(skip(config))]
    pub async fn with_config(config: XrayConfig) -> XrayMcpResult<Self> {
        let config = Arc::new(config);

        let cache = Arc::new(MetadataCache::new(config.cache_ttl_seconds));
        let _cleanup_handle = Arc::clone(&cache).start_cleanup_task();

        let tokens = Arc::new(XrayTokenCache::from_config(&config)?);
        if tokens.is_configured() {
            info!("Xray Cloud credentials configured");
        } else {
            info!("Xray Cloud credentials not set; step details, imports and exports are unavailable");
        }

        let jira = Arc::new(JiraClient::new(&config, Arc::clone(&cache))?);
        let xray = Arc::new(XrayClient::new(&config, tokens.clone())?);
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&config), jira, xray));

        info!("Xray MCP Server initialized for {}", config.jira_base_url);

        Ok(Self {
            config,
            tokens,
            dispatcher,
        })
    }

    /// Dispatcher shared by all tool methods
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &XrayConfig {
        &self.config
    }

    pub fn token_cache(&self) -> &XrayTokenCache {
        &self.tokens
    }
}

/// All public methods in this impl block become MCP tools
#[mcp_tools]
impl XrayMcpServer {
    /// List Xray tests in a project, optionally filtered by labels or component
    ///
    /// # Examples
    /// - All tests: `{"project_key": "PROJ"}`
    /// - Smoke tests in a component: `{"project_key": "PROJ", "labels": "smoke", "component": "API"}`
    #[instrument(skip(self))]
    pub async fn list_tests(&self, params: ListTestsParams) -> anyhow::Result<String> {
        Ok(self.dispatcher.dispatch(ToolCall::ListTests(params)).await)
    }

    /// Get details of an Xray test; steps are included when Xray Cloud credentials are set
    #[instrument(skip(self))]
    pub async fn get_test(&self, params: GetTestParams) -> anyhow::Result<String> {
        Ok(self.dispatcher.dispatch(ToolCall::GetTest(params)).await)
    }

    /// Get an Xray test with its type and detailed steps from Xray Cloud
    #[instrument(skip(self))]
    pub async fn get_test_with_steps(&self, params: GetTestParams) -> anyhow::Result<String> {
        Ok(self
            .dispatcher
            .dispatch(ToolCall::GetTestWithSteps(params))
            .await)
    }

    /// Create a new Xray test
    ///
    /// # Examples
    /// - Manual test: `{"project_key": "PROJ", "summary": "Login works"}`
    /// - Cucumber test: `{"project_key": "PROJ", "summary": "Checkout", "test_type": "Cucumber", "labels": "bdd"}`
    #[instrument(skip(self))]
    pub async fn create_test(&self, params: CreateTestParams) -> anyhow::Result<String> {
        Ok(self.dispatcher.dispatch(ToolCall::CreateTest(params)).await)
    }

    /// Update summary, description, labels or priority of an Xray test
    #[instrument(skip(self))]
    pub async fn update_test(&self, params: UpdateTestParams) -> anyhow::Result<String> {
        Ok(self.dispatcher.dispatch(ToolCall::UpdateTest(params)).await)
    }

    /// List test executions in a project, optionally by test plan or contained test
    #[instrument(skip(self))]
    pub async fn list_test_executions(
        &self,
        params: ListTestExecutionsParams,
    ) -> anyhow::Result<String> {
        Ok(self
            .dispatcher
            .dispatch(ToolCall::ListTestExecutions(params))
            .await)
    }

    /// Get a test execution and the status of its test runs
    #[instrument(skip(self))]
    pub async fn get_test_execution(
        &self,
        params: GetTestExecutionParams,
    ) -> anyhow::Result<String> {
        Ok(self
            .dispatcher
            .dispatch(ToolCall::GetTestExecution(params))
            .await)
    }

    /// Create a test execution, optionally linked to a test plan, tests and environments
    #[instrument(skip(self))]
    pub async fn create_test_execution(
        &self,
        params: CreateTestExecutionParams,
    ) -> anyhow::Result<String> {
        Ok(self
            .dispatcher
            .dispatch(ToolCall::CreateTestExecution(params))
            .await)
    }

    /// Record the result of a test inside a test execution
    ///
    /// # Examples
    /// - `{"test_execution_key": "PROJ-456", "test_key": "PROJ-123", "status": "FAIL", "defects": "PROJ-900"}`
    #[instrument(skip(self))]
    pub async fn update_test_run(&self, params: UpdateTestRunParams) -> anyhow::Result<String> {
        Ok(self.dispatcher.dispatch(ToolCall::UpdateTestRun(params)).await)
    }

    /// List test plans in a project
    #[instrument(skip(self))]
    pub async fn list_test_plans(&self, params: ListTestPlansParams) -> anyhow::Result<String> {
        Ok(self.dispatcher.dispatch(ToolCall::ListTestPlans(params)).await)
    }

    /// Get a test plan and its associated tests
    #[instrument(skip(self))]
    pub async fn get_test_plan(&self, params: GetTestPlanParams) -> anyhow::Result<String> {
        Ok(self.dispatcher.dispatch(ToolCall::GetTestPlan(params)).await)
    }

    /// Create a test plan, optionally with an initial set of tests
    #[instrument(skip(self))]
    pub async fn create_test_plan(&self, params: CreateTestPlanParams) -> anyhow::Result<String> {
        Ok(self.dispatcher.dispatch(ToolCall::CreateTestPlan(params)).await)
    }

    /// Add tests to an existing test plan
    #[instrument(skip(self))]
    pub async fn add_tests_to_test_plan(
        &self,
        params: AddTestsToTestPlanParams,
    ) -> anyhow::Result<String> {
        Ok(self
            .dispatcher
            .dispatch(ToolCall::AddTestsToTestPlan(params))
            .await)
    }

    /// List test sets in a project
    #[instrument(skip(self))]
    pub async fn list_test_sets(&self, params: ListTestSetsParams) -> anyhow::Result<String> {
        Ok(self.dispatcher.dispatch(ToolCall::ListTestSets(params)).await)
    }

    /// Get a test set and its tests
    #[instrument(skip(self))]
    pub async fn get_test_set(&self, params: GetTestSetParams) -> anyhow::Result<String> {
        Ok(self.dispatcher.dispatch(ToolCall::GetTestSet(params)).await)
    }

    /// Import execution results in Xray JSON format
    #[instrument(skip_all)]
    pub async fn import_execution_results(
        &self,
        params: ImportExecutionResultsParams,
    ) -> anyhow::Result<String> {
        Ok(self
            .dispatcher
            .dispatch(ToolCall::ImportExecutionResults(params))
            .await)
    }

    /// Import a Cucumber JSON report
    #[instrument(skip_all)]
    pub async fn import_cucumber_results(
        &self,
        params: ImportCucumberResultsParams,
    ) -> anyhow::Result<String> {
        Ok(self
            .dispatcher
            .dispatch(ToolCall::ImportCucumberResults(params))
            .await)
    }

    /// Import a JUnit XML report
    #[instrument(skip_all)]
    pub async fn import_junit_results(
        &self,
        params: ImportJunitResultsParams,
    ) -> anyhow::Result<String> {
        Ok(self
            .dispatcher
            .dispatch(ToolCall::ImportJunitResults(params))
            .await)
    }

    /// Import a TestNG XML report
    #[instrument(skip_all)]
    pub async fn import_testng_results(
        &self,
        params: ImportTestngResultsParams,
    ) -> anyhow::Result<String> {
        Ok(self
            .dispatcher
            .dispatch(ToolCall::ImportTestngResults(params))
            .await)
    }

    /// Import an NUnit XML report
    #[instrument(skip_all)]
    pub async fn import_nunit_results(
        &self,
        params: ImportNunitResultsParams,
    ) -> anyhow::Result<String> {
        Ok(self
            .dispatcher
            .dispatch(ToolCall::ImportNunitResults(params))
            .await)
    }

    /// Import a Robot Framework output.xml report
    #[instrument(skip_all)]
    pub async fn import_robot_results(
        &self,
        params: ImportRobotResultsParams,
    ) -> anyhow::Result<String> {
        Ok(self
            .dispatcher
            .dispatch(ToolCall::ImportRobotResults(params))
            .await)
    }

    /// Import a Behave JSON report
    #[instrument(skip_all)]
    pub async fn import_behave_results(
        &self,
        params: ImportBehaveResultsParams,
    ) -> anyhow::Result<String> {
        Ok(self
            .dispatcher
            .dispatch(ToolCall::ImportBehaveResults(params))
            .await)
    }

    /// Create or update Cucumber tests from a Gherkin feature file
    #[instrument(skip_all)]
    pub async fn import_feature_file(
        &self,
        params: ImportFeatureFileParams,
    ) -> anyhow::Result<String> {
        Ok(self
            .dispatcher
            .dispatch(ToolCall::ImportFeatureFile(params))
            .await)
    }

    /// Export Cucumber tests as Gherkin feature text
    #[instrument(skip(self))]
    pub async fn export_cucumber_features(
        &self,
        params: ExportCucumberFeaturesParams,
    ) -> anyhow::Result<String> {
        Ok(self
            .dispatcher
            .dispatch(ToolCall::ExportCucumberFeatures(params))
            .await)
    }
}
