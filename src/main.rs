use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use pc_fleet_admin::config::AppConfig;
use pc_fleet_admin::telemetry;
use pc_fleet_admin::web::{self, WebState};
use pc_fleet_admin::AdminClient;

#[tokio::main]
async fn main() -> Result<()> {
    eprintln!("🚀 Starting PC Fleet Admin...");
    telemetry::init_telemetry();

    let config = AppConfig::from_env()?;
    info!(
        endpoint = %config.endpoint_url(),
        web_port = config.web_port,
        policy = ?config.stale_field_policy,
        "⚙️ Configuration loaded"
    );

    let client = Arc::new(AdminClient::websocket(&config));
    client.connect().await;

    let web_state = WebState {
        client: client.clone(),
        activity_limit: config.activity_limit,
    };
    let web_port = config.web_port;
    let mut web_handle = tokio::spawn(async move {
        info!("🔧 Web server task started");
        if let Err(e) = web::start_web_server(web_port, web_state).await {
            error!("Web server failed: {:#}", e);
        }
    });

    let web_running = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("🛑 Shutdown requested");
            true
        }
        _ = &mut web_handle => {
            error!("❌ Web server exited unexpectedly");
            false
        }
    };

    if web_running {
        web_handle.abort();
        // Releases the web task's handle on the client
        let _ = web_handle.await;
    }
    client.disconnect().await;

    match Arc::try_unwrap(client) {
        Ok(client) => client.shutdown().await,
        Err(_) => info!("Admin client still referenced, skipping dispatcher drain"),
    }

    info!("🛑 Shutdown complete");
    Ok(())
}
