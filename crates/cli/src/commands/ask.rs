//! `lexchamber ask` — Submit one question from the command line.

use std::str::FromStr;
use std::sync::Arc;

use lexchamber_agent::{ChamberManager, SessionState, SubmissionOutcome, TurnController, session};
use lexchamber_config::AppConfig;
use lexchamber_core::consultation::ChamberId;
use lexchamber_core::event::EventBus;
use lexchamber_core::inference::InferenceGateway;
use lexchamber_core::store::ConsultationStore;
use tracing::debug;

/// Which chamber `ask` writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChamberArg {
    New,
    Id(ChamberId),
}

impl FromStr for ChamberArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("new") {
            return Ok(Self::New);
        }
        s.parse::<ChamberId>()
            .map(Self::Id)
            .map_err(|_| format!("expected a chamber id or 'new', got '{s}'"))
    }
}

pub async fn run(
    email: &str,
    chamber: ChamberArg,
    title: &str,
    message: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let gateway = lexchamber_providers::build_from_config(&config)?;
    let store: Arc<dyn ConsultationStore> = Arc::new(super::open_store(&config).await?);

    let (chamber_id, outcome) = consult(&config, store, gateway, email, chamber, title, message).await?;

    eprintln!("  Chamber {chamber_id}");
    println!("{}", outcome.reply());
    if let SubmissionOutcome::ReplyNotRecorded { .. } = outcome {
        eprintln!("  ⚠️  This answer could not be saved and will not appear in the transcript.");
    }

    Ok(())
}

/// Sign in, pick the chamber, and run one submission. Errors carry the
/// user-facing text only.
pub async fn consult(
    config: &AppConfig,
    store: Arc<dyn ConsultationStore>,
    gateway: Arc<dyn InferenceGateway>,
    email: &str,
    chamber: ChamberArg,
    title: &str,
    message: &str,
) -> Result<(ChamberId, SubmissionOutcome), Box<dyn std::error::Error>> {
    let events = Arc::new(EventBus::default());
    let mut session = SessionState::new();
    session::sign_in(store.as_ref(), &mut session, email, "")
        .await
        .map_err(|e| format!("Sign-in failed: {e}"))?;

    let chambers = ChamberManager::new(store.clone(), events.clone());
    let chamber = match chamber {
        ChamberArg::New => chambers.create(&mut session, title).await?,
        ChamberArg::Id(id) => chambers
            .select(&mut session, id)
            .await
            .map_err(|_| format!("Chamber {id} not found for {email}"))?,
    };

    if !session.capture_input(message) {
        return Err("Nothing to ask: the message is blank".into());
    }
    debug!(chamber_id = chamber.id.0, provider = %gateway.name(), "Submitting from the command line");

    let controller = TurnController::from_config(store, gateway, events, config);
    let outcome = controller
        .handle_pending(&mut session)
        .await
        .map_err(|e| e.user_message())?;

    Ok((chamber.id, outcome))
}
