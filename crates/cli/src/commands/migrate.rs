//! The `colloquy migrate` command: create or update the database schema.

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use colloquy_config::AppConfig;

pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    let Some(url) = &config.database_url else {
        println!("⚠️  No database configured.");
        println!("   Set DATABASE_URL or add database_url to:");
        println!(
            "   {}",
            AppConfig::config_dir().join("config.toml").display()
        );
        return Ok(());
    };

    println!("🗄️  Applying database schema...");

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    colloquy_memory::migrate(&pool).await?;

    println!("✅ Schema ready.");

    Ok(())
}
