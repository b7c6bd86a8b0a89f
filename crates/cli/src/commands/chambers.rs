//! `lexchamber chambers` — List, inspect, or delete a user's chambers.

use std::sync::Arc;

use lexchamber_agent::{ChamberManager, SessionState, TranscriptEntry, TranscriptView};
use lexchamber_core::consultation::{Chamber, ChamberId};
use lexchamber_core::event::EventBus;
use lexchamber_core::store::ConsultationStore;

pub async fn run(
    email: &str,
    show: Option<i64>,
    delete: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let store: Arc<dyn ConsultationStore> = Arc::new(super::open_store(&config).await?);

    let email = email.trim().to_lowercase();
    let mut session = SessionState::new();
    session.sign_in(email.clone());

    if let Some(id) = show {
        let entries = TranscriptView::new(store)
            .read(&email, ChamberId(id))
            .await
            .map_err(|_| format!("Chamber {id} not found for {email}"))?;
        print!("{}", format_transcript(&entries));
        return Ok(());
    }

    let manager = ChamberManager::new(store, Arc::new(EventBus::default()));
    if let Some(id) = delete {
        manager.delete(&mut session, ChamberId(id)).await?;
        println!("  🗑️  Chamber {id} deleted");
        return Ok(());
    }

    let chambers = manager.list(&session).await?;
    if chambers.is_empty() {
        println!("  No chambers for {email}");
    } else {
        print!("{}", format_listing(&chambers));
    }
    Ok(())
}

fn format_listing(chambers: &[Chamber]) -> String {
    let mut out = String::new();
    for c in chambers {
        let mut overrides = Vec::new();
        if let Some(persona) = &c.persona {
            overrides.push(format!("persona: {persona}"));
        }
        if let Some(language) = &c.language {
            overrides.push(format!("language: {language}"));
        }
        out.push_str(&format!(
            "  {:>5}  {}  {}",
            c.id.0,
            c.created_at.format("%Y-%m-%d %H:%M"),
            c.title
        ));
        if !overrides.is_empty() {
            out.push_str(&format!("  ({})", overrides.join(", ")));
        }
        out.push('\n');
    }
    out
}

fn format_transcript(entries: &[TranscriptEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        for (i, line) in entry.content.lines().enumerate() {
            let label = if i == 0 { entry.speaker } else { "" };
            out.push_str(&format!("  {label:>7} > {line}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexchamber_core::consultation::Role;

    fn chamber(id: i64, title: &str, persona: Option<&str>) -> Chamber {
        Chamber {
            id: ChamberId(id),
            email: "a@x".into(),
            title: title.into(),
            persona: persona.map(str::to_string),
            language: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn listing_shows_ids_and_overrides() {
        let out = format_listing(&[
            chamber(3, "Tort", None),
            chamber(7, "Rights", Some("Constitutional specialist")),
        ]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("3") && lines[0].ends_with("Tort"));
        assert!(lines[1].contains("(persona: Constitutional specialist)"));
    }

    #[test]
    fn transcript_labels_each_turn_once() {
        let out = format_transcript(&[
            TranscriptEntry {
                seq: 1,
                role: Role::User,
                speaker: "You",
                content: "Define negligence.".into(),
            },
            TranscriptEntry {
                seq: 2,
                role: Role::Assistant,
                speaker: "Counsel",
                content: "Negligence is…\nIt has four elements.".into(),
            },
        ]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].trim_start().starts_with("You > "));
        assert!(lines[1].trim_start().starts_with("Counsel > "));
        assert!(lines[2].trim_start().starts_with("> It has"));
    }
}
