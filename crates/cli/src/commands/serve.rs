//! `surveychat serve` — Start the HTTP gateway.

use std::path::Path;

use surveychat_config::AppConfig;

pub async fn run(
    config_path: Option<&Path>,
    host_override: Option<String>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(host) = host_override {
        config.gateway.host = host;
    }
    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    tracing::debug!(?config, "Configuration loaded");

    println!("SurveyChat Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.default_model);
    if config.cors.allow_all {
        println!("   Origins:   * (allow all)");
    } else {
        println!(
            "   Origins:   {} (fallback {})",
            config.cors.allowed_origins.join(", "),
            config.cors.default_origin
        );
    }

    surveychat_gateway::start(config).await?;

    Ok(())
}
