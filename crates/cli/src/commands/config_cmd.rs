//! `ensemble config` — Configuration management commands.

use ensemble_config::AppConfig;
use std::path::Path;

pub fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    }

    if write_default(&config_path, force)? {
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Edit {} and add your API key", config_path.display());
        println!("   2. Write a pool file with one or more [[agents]]");
        println!("   3. Run: ensemble run --pool pool.toml --input \"...\"\n");
    } else {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Run with --force to overwrite it.");
    }
    Ok(())
}

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", redacted_toml(&config)?);
    Ok(())
}

/// Write the default config unless one exists. Returns whether it wrote.
fn write_default(path: &Path, force: bool) -> std::io::Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}

/// The effective configuration as TOML, with API keys masked.
fn redacted_toml(config: &AppConfig) -> Result<String, toml::ser::Error> {
    const MASK: &str = "[REDACTED]";
    let mut config = config.clone();
    if config.api_key.is_some() {
        config.api_key = Some(MASK.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(MASK.into());
        }
    }
    toml::to_string_pretty(&config)
}
