//! The `colloquy tools` command: list registered tools.

pub async fn run() -> anyhow::Result<()> {
    let registry = colloquy_tools::default_registry();

    println!("🧰 Registered Tools");
    println!("===================");
    for def in registry.definitions() {
        println!("  {:<16} {}", def.name, def.description);
    }
    println!();
    println!("  {} tools registered.", registry.len());

    Ok(())
}
