//! `convoy providers`: list configured backends.

use convoy_config::AppConfig;
use convoy_providers::router::build_from_config;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let router = build_from_config(&config)?;

    println!("Configured providers");
    println!("====================");
    println!();
    println!(
        "  {:<16} {:<10} {:<24} {:<8} {}",
        "NAME", "DIALECT", "MODEL", "KEY", "BASE URL"
    );
    for (name, provider) in router.list() {
        let marker = if name == router.default_name() { "*" } else { " " };
        let key = if provider.api_key.is_empty() { "-" } else { "set" };
        println!(
            "{marker} {:<16} {:<10} {:<24} {:<8} {}",
            name, provider.provider, provider.model, key, provider.base_url
        );
    }
    println!();
    println!("  * default provider");
    println!();
    println!("  Environment variables:");
    println!("    OPENAI_API_KEY, OPENROUTER_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY");
    println!("    CONVOY_API_KEY, CONVOY_PROVIDER, CONVOY_MODEL");

    Ok(())
}
