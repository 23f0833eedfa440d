#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use dotenv::dotenv;
use poem::{EndpointExt, Route, Server, listener::TcpListener, middleware::Tracing};
use poem_mcpserver::{McpServer, streamable_http};
use remote_exec::remote::{RemoteTestTools, Runtime};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Initialize logging with proper tracing default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .init();

    let runtime = Arc::new(Runtime::from_env());

    let mcp_port: u16 = std::env::var("MCP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let mcp_addr = format!("0.0.0.0:{}", mcp_port);
    info!("Starting MCP server on {}", mcp_addr);

    let tools = RemoteTestTools::new(runtime.clone());
    let app = Route::new()
        .at(
            "/",
            streamable_http::endpoint(move |_| McpServer::new().tools(tools.clone())),
        )
        .with(Tracing);

    info!("Use remote_execute to run commands and remote_upload_file / remote_download to move files");

    let served = Server::new(TcpListener::bind(mcp_addr))
        .name("Remote Exec MCP Server")
        .run_with_graceful_shutdown(
            app,
            async {
                let _ = tokio::signal::ctrl_c().await;
            },
            None,
        )
        .await;

    runtime.shutdown().await;
    served?;
    Ok(())
}
