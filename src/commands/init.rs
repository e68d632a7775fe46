use anyhow::{bail, Result};
use std::env;
use tracing::info;

use crate::Config;

pub async fn run() -> Result<()> {
    let root = env::current_dir()?;

    if Config::is_initialized(&root) {
        bail!(
            "testgen is already initialized in {:?}",
            Config::testgen_dir(&root)
        );
    }

    let config = Config::default();
    config.save(&root)?;

    info!("Initialized testgen in {:?}", Config::testgen_dir(&root));
    println!(
        "✓ Created {} with default configuration",
        Config::testgen_dir(&root).display()
    );
    println!("\nNext steps:");
    println!("  1. Edit .testgen/config.toml to customize settings");
    println!("  2. Export the API key named by llm.api_key_env (default: OPENAI_API_KEY)");
    println!("  3. Run 'testgen generate' to generate unit tests");

    Ok(())
}
