//! Cucumber feature export

use crate::error::{XrayMcpError, XrayMcpResult};
use crate::tools::split_keys;
use crate::xray_client::XrayClient;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Parameters for the export_cucumber_features tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExportCucumberFeaturesParams {
    /// Comma-separated test keys to export; all Cucumber tests when omitted
    #[serde(default)]
    pub test_keys: Option<String>,
}

pub struct ExportTools {
    xray: Arc<XrayClient>,
}

impl ExportTools {
    pub fn new(xray: Arc<XrayClient>) -> Self {
        Self { xray }
    }

    #[instrument(skip(self))]
    pub async fn export_cucumber_features(
        &self,
        params: ExportCucumberFeaturesParams,
    ) -> XrayMcpResult<String> {
        if !self.xray.is_configured() {
            return Err(XrayMcpError::AuthNotConfigured);
        }
        let keys = split_keys("test_keys", params.test_keys.as_deref())?;
        info!("Exporting Cucumber features for {} tests", keys.len());

        let features = self.xray.export_cucumber_features(&keys).await?;
        Ok(format!(
            "**Cucumber Features Exported Successfully**\n\n```gherkin\n{}\n```",
            features.trim_end()
        ))
    }
}
