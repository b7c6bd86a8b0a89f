//! `lexchamber serve` — Start the HTTP gateway and chat frontend.

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config()?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("⚖️  LexChamber Gateway");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.provider, config.model);
    println!("   Database:  {}", config.db_path);
    println!("   Identity:  {} header", config.gateway.identity_header);

    lexchamber_gateway::start(config).await?;

    Ok(())
}
