//! The `colloquy serve` command: start the HTTP gateway.

use anyhow::Context;

use colloquy_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("💬 Colloquy Gateway");
    println!(
        "   Listening: {}:{}",
        config.gateway.host, config.gateway.port
    );
    println!(
        "   Backend:   {} ({})",
        config.default_backend, config.default_model
    );
    println!(
        "   Memory:    {}",
        if config.database_url.is_some() {
            "postgres"
        } else {
            "disabled"
        }
    );
    println!(
        "   Retrieval: {}",
        if config.retrieval.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    colloquy_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    Ok(())
}
