#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use dotenv::dotenv;
use poem_mcpserver::McpServer;
use remote_exec::remote::{RemoteTestTools, Runtime};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // stdout carries the MCP protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .init();

    let runtime = Arc::new(Runtime::from_env());
    let served =
        poem_mcpserver::stdio::stdio(McpServer::new().tools(RemoteTestTools::new(runtime.clone())))
            .await;

    runtime.shutdown().await;
    served?;
    Ok(())
}
