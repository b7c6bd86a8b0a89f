//! `lexchamber doctor` — Diagnose configuration, store, and provider.

use lexchamber_config::AppConfig;
use lexchamber_core::store::ConsultationStore;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 LexChamber Doctor — System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            return Err("1 issue found. See above for details.".into());
        }
    };

    match super::open_store(&config).await {
        Ok(store) => match store.list_chambers("doctor@lexchamber.invalid").await {
            Ok(_) => println!("  ✅ Database readable ({})", config.db_path),
            Err(e) => {
                println!("  ❌ Database not readable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    match lexchamber_providers::build_from_config(&config) {
        Ok(gateway) => {
            println!("  ✅ API key configured");
            match gateway.health_check().await {
                Ok(true) => println!("  ✅ Provider reachable ({}, {})", gateway.name(), config.model),
                Ok(false) => {
                    println!("  ⚠️  Provider answered but reported unhealthy");
                    issues += 1;
                }
                Err(e) => {
                    println!("  ❌ Provider check failed: {e}");
                    issues += 1;
                }
            }
        }
        Err(e) => {
            println!("  ❌ {e} (set GOOGLE_API_KEY)");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
        Ok(())
    } else {
        Err(format!("{issues} issue(s) found. See above for details.").into())
    }
}
