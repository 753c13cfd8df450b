//! `convoy config`: configuration management commands.

use convoy_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let mut warnings = Vec::new();
            match config.provider_config(None, None) {
                Ok(provider) if provider.api_key.is_empty() => warnings.push(format!(
                    "No API key for default provider '{}'",
                    config.default_provider
                )),
                Ok(_) => {}
                Err(e) => warnings.push(e.to_string()),
            }
            if config.agent.round_timeout_secs > config.agent.total_timeout_secs {
                warnings.push("agent.round_timeout_secs exceeds agent.total_timeout_secs".into());
            }

            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{config:#?}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", config_path().display());
    Ok(())
}

pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path();
    if path.exists() {
        println!("Config already exists at: {}", path.display());
        return Ok(());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Created {}", path.display());
    Ok(())
}

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}
