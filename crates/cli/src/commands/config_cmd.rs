//! `lexchamber config` — Configuration management commands.

use lexchamber_config::AppConfig;

/// Print the effective configuration. The API key is never printed.
pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config()?;
    let has_key = config.api_key.take().is_some();
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# api_key: {}", if has_key { "set" } else { "not set" });
    println!("{toml_str}");
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_path().display());
}

/// Write the default configuration to the config path, refusing to
/// overwrite an existing file.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_path();
    if path.exists() {
        return Err(format!("Config file already exists: {}", path.display()).into());
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("  ✅ Wrote {}", path.display());
    println!("  Set GOOGLE_API_KEY in the environment before `lexchamber serve`.");
    Ok(())
}
