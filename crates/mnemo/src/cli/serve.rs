// crates/mnemo/src/cli/serve.rs
// Run the MCP server with stdio transport: init context, then
// rmcp::serve_server + service.waiting().

use crate::config::{ApiKeys, Config};
use crate::error::Result;
use crate::lifecycle::Lifecycle;
use crate::mcp::MnemoServer;
use std::path::Path;
use tracing::info;

pub async fn run(data_dir: &Path) -> Result<()> {
    let config = Config::load();
    let api_keys = ApiKeys::from_env();

    if api_keys.has_any() {
        info!(summary = %api_keys.summary(), "API keys configured");
    } else {
        info!("No API keys configured; running with keyword-only recall and no extraction");
    }

    let lifecycle = Lifecycle::start(config, data_dir, &api_keys).await?;
    let server = MnemoServer::new(lifecycle.clone());

    let transport = rmcp::transport::io::stdio();
    let service = rmcp::serve_server(server, transport)
        .await
        .map_err(|e| crate::error::MnemoError::Config(format!("mcp transport: {e}")))?;
    service
        .waiting()
        .await
        .map_err(|e| crate::error::MnemoError::Config(format!("mcp server: {e}")))?;

    lifecycle.stop().await;
    Ok(())
}
