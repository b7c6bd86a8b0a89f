pub mod ask;
pub mod chambers;
pub mod config_cmd;
pub mod doctor;
pub mod serve;
pub mod status;

use lexchamber_config::AppConfig;
use lexchamber_store::SqliteStore;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

pub(crate) async fn open_store(config: &AppConfig) -> Result<SqliteStore, Box<dyn std::error::Error>> {
    Ok(SqliteStore::new(&config.db_path)
        .await
        .map_err(|e| format!("Failed to open database '{}': {e}", config.db_path))?)
}
