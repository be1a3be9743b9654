//! Xray MCP Server - Xray test management for Jira Cloud via MCP

use pulseengine_mcp_server::McpServerBuilder;
use tracing::{error, info};
use xray_mcp_server::XrayMcpServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries JSON-RPC
    XrayMcpServer::configure_stdio_logging();

    info!("Starting Xray MCP Server...");

    let xray_server = match XrayMcpServer::new().await {
        Ok(server) => {
            info!("Xray MCP Server created successfully");
            server
        }
        Err(e) => {
            error!("Failed to create Xray MCP Server: {}", e);
            eprintln!("❌ Failed to start Xray MCP Server: {}", e);
            eprintln!("\nPlease check:");
            eprintln!("  - JIRA_BASE_URL is set (e.g. https://your-domain.atlassian.net)");
            eprintln!("  - JIRA_EMAIL and JIRA_API_TOKEN are set");
            eprintln!("  - XRAY_CLIENT_ID and XRAY_CLIENT_SECRET are set for step details, imports and exports (optional)");
            std::process::exit(1);
        }
    };

    info!("Starting MCP server with STDIO transport...");

    let mut server = xray_server.serve_stdio().await?;

    info!("🚀 Xray MCP Server is running and ready to serve requests");

    server.run().await?;

    Ok(())
}
