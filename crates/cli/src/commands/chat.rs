//! The `colloquy chat` command: interactive or single-message chat.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use colloquy_agent::AgentRuntime;
use colloquy_config::AppConfig;
use colloquy_core::memory::MemoryStore;
use colloquy_core::message::ChatMessage;
use colloquy_core::model::ModelContext;
use colloquy_core::tool::ToolRegistry;
use colloquy_memory::{InMemoryStore, PgMemoryStore};
use colloquy_models::OpenAiCompatModel;

pub async fn run(message: Option<String>, session: Option<String>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    // Catch a missing API key before any request goes out. Ollama runs
    // without one.
    if config.api_key.is_none() && config.default_backend != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    COLLOQUY_API_KEY      (generic)");
        eprintln!("    OPENROUTER_API_KEY    (for OpenRouter)");
        eprintln!("    OPENAI_API_KEY        (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!(
            "    {}",
            AppConfig::config_dir().join("config.toml").display()
        );
        eprintln!();
        anyhow::bail!("No API key found. See above for setup instructions.");
    }

    let model = OpenAiCompatModel::from_config(&config)?;
    let tools = Arc::new(colloquy_tools::default_registry());

    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let memory: Arc<dyn MemoryStore> = match &config.database_url {
        Some(url) => {
            let store = PgMemoryStore::connect(url, &session_id)
                .await
                .context("Failed to connect to the memory database")?;
            Arc::new(store)
        }
        None => Arc::new(InMemoryStore::new()),
    };

    let runtime = AgentRuntime::new(tools.clone())
        .with_max_iterations(config.max_iterations)
        .with_memory(memory)
        .with_chunk_handler(|text: &str| {
            print!("{text}");
            let _ = std::io::stdout().flush();
        });

    if let Some(msg) = message {
        let context = base_context(&config, &tools, vec![ChatMessage::user(&msg)]);
        let result = runtime.run(&model, context).await?;
        println!();
        if let Some(usage) = result.usage {
            tracing::debug!(
                total_tokens = usage.total_tokens,
                duration_ms = usage.duration_ms,
                "Run usage"
            );
        }
    } else {
        interactive(&config, &runtime, &model, &tools).await?;
    }

    Ok(())
}

fn base_context(
    config: &AppConfig,
    tools: &ToolRegistry,
    messages: Vec<ChatMessage>,
) -> ModelContext {
    let mut context = ModelContext::new(messages).with_tools(tools.definitions());
    context.temperature = Some(config.default_temperature);
    context.max_tokens = Some(config.default_max_tokens);
    context
}

async fn interactive(
    config: &AppConfig,
    runtime: &AgentRuntime,
    model: &OpenAiCompatModel,
    tools: &ToolRegistry,
) -> anyhow::Result<()> {
    println!();
    println!("💬 Colloquy: interactive chat");
    println!("=============================");
    println!("  Backend:  {}", config.default_backend);
    println!("  Model:    {}", config.default_model);
    println!("  Tools:    {}", tools.names().join(", "));
    println!(
        "  Memory:   {}",
        if config.database_url.is_some() {
            "postgres"
        } else {
            "in-process"
        }
    );
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut history: Vec<ChatMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print!("  you > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        if !line.is_empty() {
            history.push(ChatMessage::user(line));
            let context = base_context(config, tools, history.clone());

            println!();
            print!("  ");
            std::io::stdout().flush()?;

            match runtime.run(model, context).await {
                Ok(result) => {
                    // Carry the full transcript forward, tool round
                    // trips included.
                    history = result.history;
                    println!();
                }
                Err(e) => {
                    eprintln!("[Error] {e}");
                }
            }
            println!();
        }

        print!("  you > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}
