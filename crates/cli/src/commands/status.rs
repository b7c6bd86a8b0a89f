//! `lexchamber status` — Show the effective configuration.

use lexchamber_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;

    println!("⚖️  LexChamber Status");
    println!("===================");
    println!("  Config file:  {}", AppConfig::config_path().display());
    println!("  Provider:     {}", config.provider);
    println!("  Model:        {}", config.model);
    println!("  API key:      {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Temperature:  {}", config.temperature);
    println!("  Timeout:      {}s", config.inference_timeout_secs);
    println!("  Database:     {}", config.db_path);
    println!("  Persona:      {}", config.default_persona);
    println!("  Language:     {} (of {})", config.default_language, config.languages.join(", "));
    println!(
        "  History:      {}",
        if config.history_turns == 0 {
            "off".to_string()
        } else {
            format!("last {} turns", config.history_turns)
        }
    );
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);

    if AppConfig::config_path().exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file, using defaults (`lexchamber config init` writes one)");
    }

    Ok(())
}
