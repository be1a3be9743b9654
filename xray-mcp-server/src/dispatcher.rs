//! Tool registry and dispatch
//!
//! `ToolName` is the closed set of tools the server exposes. A `ToolCall`
//! pairs a tool with its typed parameters, and `Dispatcher::dispatch` routes
//! it to the owning tool family. Handler failures are rendered as
//! `Error <action>: <detail>` text so the host always receives a readable
//! answer; only unknown tool names and malformed arguments are hard errors.

use crate::config::XrayConfig;
use crate::error::{XrayMcpError, XrayMcpResult};
use crate::jira_client::JiraClient;
use crate::tools::*;
use crate::xray_client::XrayClient;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error};

macro_rules! tool_registry {
    ($($variant:ident => $name:literal, $action:literal;)+) => {
        /// Every tool the server exposes
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ToolName {
            $($variant,)+
        }

        impl ToolName {
            pub const ALL: &'static [ToolName] = &[$(ToolName::$variant,)+];

            /// Wire name used in `tools/call`
            pub fn as_str(self) -> &'static str {
                match self {
                    $(ToolName::$variant => $name,)+
                }
            }

            /// Gerund used in failure text, e.g. "creating test"
            pub fn action(self) -> &'static str {
                match self {
                    $(ToolName::$variant => $action,)+
                }
            }
        }

        impl FromStr for ToolName {
            type Err = XrayMcpError;

            fn from_str(name: &str) -> Result<Self, Self::Err> {
                match name {
                    $($name => Ok(ToolName::$variant),)+
                    other => Err(XrayMcpError::unknown_operation(other)),
                }
            }
        }
    };
}

tool_registry! {
    ListTests => "list_tests", "fetching tests";
    GetTest => "get_test", "fetching test details";
    GetTestWithSteps => "get_test_with_steps", "fetching test details";
    CreateTest => "create_test", "creating test";
    UpdateTest => "update_test", "updating test";
    ListTestExecutions => "list_test_executions", "fetching test executions";
    GetTestExecution => "get_test_execution", "fetching test execution details";
    CreateTestExecution => "create_test_execution", "creating test execution";
    UpdateTestRun => "update_test_run", "updating test run";
    ListTestPlans => "list_test_plans", "fetching test plans";
    GetTestPlan => "get_test_plan", "fetching test plan details";
    CreateTestPlan => "create_test_plan", "creating test plan";
    AddTestsToTestPlan => "add_tests_to_test_plan", "adding tests to test plan";
    ListTestSets => "list_test_sets", "fetching test sets";
    GetTestSet => "get_test_set", "fetching test set details";
    ImportExecutionResults => "import_execution_results", "importing execution results";
    ImportCucumberResults => "import_cucumber_results", "importing Cucumber results";
    ImportJunitResults => "import_junit_results", "importing JUnit results";
    ImportTestngResults => "import_testng_results", "importing TestNG results";
    ImportNunitResults => "import_nunit_results", "importing NUnit results";
    ImportRobotResults => "import_robot_results", "importing Robot Framework results";
    ImportBehaveResults => "import_behave_results", "importing Behave results";
    ImportFeatureFile => "import_feature_file", "importing feature file";
    ExportCucumberFeatures => "export_cucumber_features", "exporting Cucumber features";
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation with typed parameters
#[derive(Debug, Clone)]
pub enum ToolCall {
    ListTests(ListTestsParams),
    GetTest(GetTestParams),
    GetTestWithSteps(GetTestParams),
    CreateTest(CreateTestParams),
    UpdateTest(UpdateTestParams),
    ListTestExecutions(ListTestExecutionsParams),
    GetTestExecution(GetTestExecutionParams),
    CreateTestExecution(CreateTestExecutionParams),
    UpdateTestRun(UpdateTestRunParams),
    ListTestPlans(ListTestPlansParams),
    GetTestPlan(GetTestPlanParams),
    CreateTestPlan(CreateTestPlanParams),
    AddTestsToTestPlan(AddTestsToTestPlanParams),
    ListTestSets(ListTestSetsParams),
    GetTestSet(GetTestSetParams),
    ImportExecutionResults(ImportExecutionResultsParams),
    ImportCucumberResults(ImportCucumberResultsParams),
    ImportJunitResults(ImportJunitResultsParams),
    ImportTestngResults(ImportTestngResultsParams),
    ImportNunitResults(ImportNunitResultsParams),
    ImportRobotResults(ImportRobotResultsParams),
    ImportBehaveResults(ImportBehaveResultsParams),
    ImportFeatureFile(ImportFeatureFileParams),
    ExportCucumberFeatures(ExportCucumberFeaturesParams),
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> XrayMcpResult<T> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(arguments)
        .map_err(|e| XrayMcpError::invalid_param("arguments", e.to_string()))
}

impl ToolCall {
    /// Build a call from a wire name and raw JSON arguments
    pub fn from_invocation(name: &str, arguments: Value) -> XrayMcpResult<Self> {
        let tool: ToolName = name.parse()?;
        let call = match tool {
            ToolName::ListTests => ToolCall::ListTests(parse_args(arguments)?),
            ToolName::GetTest => ToolCall::GetTest(parse_args(arguments)?),
            ToolName::GetTestWithSteps => ToolCall::GetTestWithSteps(parse_args(arguments)?),
            ToolName::CreateTest => ToolCall::CreateTest(parse_args(arguments)?),
            ToolName::UpdateTest => ToolCall::UpdateTest(parse_args(arguments)?),
            ToolName::ListTestExecutions => ToolCall::ListTestExecutions(parse_args(arguments)?),
            ToolName::GetTestExecution => ToolCall::GetTestExecution(parse_args(arguments)?),
            ToolName::CreateTestExecution => ToolCall::CreateTestExecution(parse_args(arguments)?),
            ToolName::UpdateTestRun => ToolCall::UpdateTestRun(parse_args(arguments)?),
            ToolName::ListTestPlans => ToolCall::ListTestPlans(parse_args(arguments)?),
            ToolName::GetTestPlan => ToolCall::GetTestPlan(parse_args(arguments)?),
            ToolName::CreateTestPlan => ToolCall::CreateTestPlan(parse_args(arguments)?),
            ToolName::AddTestsToTestPlan => ToolCall::AddTestsToTestPlan(parse_args(arguments)?),
            ToolName::ListTestSets => ToolCall::ListTestSets(parse_args(arguments)?),
            ToolName::GetTestSet => ToolCall::GetTestSet(parse_args(arguments)?),
            ToolName::ImportExecutionResults => {
                ToolCall::ImportExecutionResults(parse_args(arguments)?)
            }
            ToolName::ImportCucumberResults => {
                ToolCall::ImportCucumberResults(parse_args(arguments)?)
            }
            ToolName::ImportJunitResults => ToolCall::ImportJunitResults(parse_args(arguments)?),
            ToolName::ImportTestngResults => ToolCall::ImportTestngResults(parse_args(arguments)?),
            ToolName::ImportNunitResults => ToolCall::ImportNunitResults(parse_args(arguments)?),
            ToolName::ImportRobotResults => ToolCall::ImportRobotResults(parse_args(arguments)?),
            ToolName::ImportBehaveResults => ToolCall::ImportBehaveResults(parse_args(arguments)?),
            ToolName::ImportFeatureFile => ToolCall::ImportFeatureFile(parse_args(arguments)?),
            ToolName::ExportCucumberFeatures => {
                ToolCall::ExportCucumberFeatures(parse_args(arguments)?)
            }
        };
        Ok(call)
    }

    pub fn name(&self) -> ToolName {
        match self {
            ToolCall::ListTests(_) => ToolName::ListTests,
            ToolCall::GetTest(_) => ToolName::GetTest,
            ToolCall::GetTestWithSteps(_) => ToolName::GetTestWithSteps,
            ToolCall::CreateTest(_) => ToolName::CreateTest,
            ToolCall::UpdateTest(_) => ToolName::UpdateTest,
            ToolCall::ListTestExecutions(_) => ToolName::ListTestExecutions,
            ToolCall::GetTestExecution(_) => ToolName::GetTestExecution,
            ToolCall::CreateTestExecution(_) => ToolName::CreateTestExecution,
            ToolCall::UpdateTestRun(_) => ToolName::UpdateTestRun,
            ToolCall::ListTestPlans(_) => ToolName::ListTestPlans,
            ToolCall::GetTestPlan(_) => ToolName::GetTestPlan,
            ToolCall::CreateTestPlan(_) => ToolName::CreateTestPlan,
            ToolCall::AddTestsToTestPlan(_) => ToolName::AddTestsToTestPlan,
            ToolCall::ListTestSets(_) => ToolName::ListTestSets,
            ToolCall::GetTestSet(_) => ToolName::GetTestSet,
            ToolCall::ImportExecutionResults(_) => ToolName::ImportExecutionResults,
            ToolCall::ImportCucumberResults(_) => ToolName::ImportCucumberResults,
            ToolCall::ImportJunitResults(_) => ToolName::ImportJunitResults,
            ToolCall::ImportTestngResults(_) => ToolName::ImportTestngResults,
            ToolCall::ImportNunitResults(_) => ToolName::ImportNunitResults,
            ToolCall::ImportRobotResults(_) => ToolName::ImportRobotResults,
            ToolCall::ImportBehaveResults(_) => ToolName::ImportBehaveResults,
            ToolCall::ImportFeatureFile(_) => ToolName::ImportFeatureFile,
            ToolCall::ExportCucumberFeatures(_) => ToolName::ExportCucumberFeatures,
        }
    }
}

/// Routes tool calls to the tool families
pub struct Dispatcher {
    tests: TestCaseTools,
    executions: TestExecutionTools,
    plans: TestPlanTools,
    sets: TestSetTools,
    imports: ImportTools,
    exports: ExportTools,
}

impl Dispatcher {
    pub fn new(config: Arc<XrayConfig>, jira: Arc<JiraClient>, xray: Arc<XrayClient>) -> Self {
        Self {
            tests: TestCaseTools::new(Arc::clone(&jira), Arc::clone(&xray), Arc::clone(&config)),
            executions: TestExecutionTools::new(Arc::clone(&jira), Arc::clone(&config)),
            plans: TestPlanTools::new(Arc::clone(&jira), Arc::clone(&config)),
            sets: TestSetTools::new(jira, config),
            imports: ImportTools::new(Arc::clone(&xray)),
            exports: ExportTools::new(xray),
        }
    }

    /// Run a call, rendering any failure as text
    pub async fn dispatch(&self, call: ToolCall) -> String {
        let tool = call.name();
        debug!("Dispatching tool call: {}", tool);

        match self.execute(call).await {
            Ok(text) => text,
            Err(err) => {
                error!("{} failed: {}", tool, err);
                format!("Error {}: {}", tool.action(), err.user_message())
            }
        }
    }

    /// Name-based entry point; unknown names and malformed arguments fail
    pub async fn call(&self, name: &str, arguments: Value) -> XrayMcpResult<String> {
        let call = ToolCall::from_invocation(name, arguments)?;
        Ok(self.dispatch(call).await)
    }

    async fn execute(&self, call: ToolCall) -> XrayMcpResult<String> {
        match call {
            ToolCall::ListTests(p) => self.tests.list_tests(p).await,
            ToolCall::GetTest(p) => self.tests.get_test(p).await,
            ToolCall::GetTestWithSteps(p) => self.tests.get_test_with_steps(p).await,
            ToolCall::CreateTest(p) => self.tests.create_test(p).await,
            ToolCall::UpdateTest(p) => self.tests.update_test(p).await,
            ToolCall::ListTestExecutions(p) => self.executions.list_test_executions(p).await,
            ToolCall::GetTestExecution(p) => self.executions.get_test_execution(p).await,
            ToolCall::CreateTestExecution(p) => self.executions.create_test_execution(p).await,
            ToolCall::UpdateTestRun(p) => self.executions.update_test_run(p).await,
            ToolCall::ListTestPlans(p) => self.plans.list_test_plans(p).await,
            ToolCall::GetTestPlan(p) => self.plans.get_test_plan(p).await,
            ToolCall::CreateTestPlan(p) => self.plans.create_test_plan(p).await,
            ToolCall::AddTestsToTestPlan(p) => self.plans.add_tests_to_test_plan(p).await,
            ToolCall::ListTestSets(p) => self.sets.list_test_sets(p).await,
            ToolCall::GetTestSet(p) => self.sets.get_test_set(p).await,
            ToolCall::ImportExecutionResults(p) => self.imports.import_execution_results(p).await,
            ToolCall::ImportCucumberResults(p) => self.imports.import_cucumber_results(p).await,
            ToolCall::ImportJunitResults(p) => self.imports.import_junit_results(p).await,
            ToolCall::ImportTestngResults(p) => self.imports.import_testng_results(p).await,
            ToolCall::ImportNunitResults(p) => self.imports.import_nunit_results(p).await,
            ToolCall::ImportRobotResults(p) => self.imports.import_robot_results(p).await,
            ToolCall::ImportBehaveResults(p) => self.imports.import_behave_results(p).await,
            ToolCall::ImportFeatureFile(p) => self.imports.import_feature_file(p).await,
            ToolCall::ExportCucumberFeatures(p) => self.exports.export_cucumber_features(p).await,
        }
    }
}
