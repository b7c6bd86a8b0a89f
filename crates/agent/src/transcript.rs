//! Transcript view — read-only rendering of a chamber's turns.

use crate::session::SessionState;
use askama::Template;
use lexchamber_core::consultation::{ChamberId, Role, Turn};
use lexchamber_core::error::StoreError;
use lexchamber_core::store::ConsultationStore;
use serde::Serialize;
use std::sync::Arc;

/// One rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub seq: i64,
    pub role: Role,
    pub speaker: &'static str,
    pub content: String,
}

impl From<&Turn> for TranscriptEntry {
    fn from(turn: &Turn) -> Self {
        Self {
            seq: turn.seq,
            role: turn.role,
            speaker: speaker(turn.role),
            content: turn.content.clone(),
        }
    }
}

/// What one render pass shows for the selected chamber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    pub chamber_id: ChamberId,
    pub entries: Vec<TranscriptEntry>,
    /// A reply that was shown but not stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transient_reply: Option<String>,
}

pub fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "Counsel",
    }
}

/// Reads turns through the session cache. Never writes to the store.
pub struct TranscriptView {
    store: Arc<dyn ConsultationStore>,
}

impl TranscriptView {
    pub fn new(store: Arc<dyn ConsultationStore>) -> Self {
        Self { store }
    }

    /// Render the session's selected chamber, or `None` if none is selected.
    ///
    /// A chamber that no longer exists clears the selection and reports
    /// `UnknownChamber`. The one-shot transient reply is consumed here.
    pub async fn render(&self, session: &mut SessionState) -> Result<Option<Transcript>, StoreError> {
        let email = session
            .user_email()
            .map(str::to_string)
            .ok_or_else(|| StoreError::NotAuthenticated(String::new()))?;
        let transient = session.take_transient_reply();
        let Some(chamber_id) = session.current_chamber() else {
            return Ok(None);
        };

        let cached: Option<Vec<TranscriptEntry>> = session
            .cached_turns(chamber_id)
            .map(|turns| turns.iter().map(TranscriptEntry::from).collect());

        let entries = match cached {
            Some(entries) => entries,
            None => match self.store.read_turns(&email, chamber_id).await {
                Ok(turns) => {
                    let entries = turns.iter().map(TranscriptEntry::from).collect();
                    session.cache_turns(chamber_id, turns);
                    entries
                }
                Err(e @ StoreError::UnknownChamber { .. }) => {
                    session.clear_chamber();
                    return Err(e);
                }
                Err(e) => return Err(e),
            },
        };

        Ok(Some(Transcript {
            chamber_id,
            entries,
            transient_reply: transient
                .filter(|t| t.chamber_id == chamber_id)
                .map(|t| t.content),
        }))
    }

    /// Render after dropping the cached turns, so turns appended by the
    /// user's other tabs show up.
    pub async fn refresh(&self, session: &mut SessionState) -> Result<Option<Transcript>, StoreError> {
        session.invalidate_transcript();
        self.render(session).await
    }

    /// Read a chamber directly from the store, bypassing any cache.
    pub async fn read(
        &self,
        email: &str,
        chamber_id: ChamberId,
    ) -> Result<Vec<TranscriptEntry>, StoreError> {
        let turns = self.store.read_turns(email, chamber_id).await?;
        Ok(turns.iter().map(TranscriptEntry::from).collect())
    }
}

#[derive(Template)]
#[template(
    ext = "html",
    source = r#"<div class="transcript">
{%- for entry in entries %}
  <div class="bubble {{ entry.role.as_str() }}" data-seq="{{ entry.seq }}"><span class="speaker">{{ entry.speaker }}</span><p>{{ entry.content }}</p></div>
{%- endfor %}
{%- if let Some(reply) = transient_reply %}
  <div class="bubble assistant transient"><span class="speaker">{{ counsel }}</span><p>{{ reply }}</p></div>
{%- endif %}
</div>
"#
)]
struct TranscriptHtml<'a> {
    entries: &'a [TranscriptEntry],
    transient_reply: Option<&'a str>,
    counsel: &'static str,
}

/// Render a transcript as HTML chat bubbles. All content is escaped.
pub fn render_html(transcript: &Transcript) -> Result<String, askama::Error> {
    TranscriptHtml {
        entries: &transcript.entries,
        transient_reply: transcript.transient_reply.as_deref(),
        counsel: speaker(Role::Assistant),
    }
    .render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::SubmissionOutcome;
    use lexchamber_store::InMemoryStore;

    async fn seeded() -> (Arc<InMemoryStore>, ChamberId) {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_user("a@x", "Ada").await.unwrap();
        let chamber = store.create_chamber("a@x", "Tort").await.unwrap();
        store
            .append_turn("a@x", chamber, Role::User, "Define negligence.")
            .await
            .unwrap();
        store
            .append_turn("a@x", chamber, Role::Assistant, "Negligence is…")
            .await
            .unwrap();
        (store, chamber)
    }

    fn session_for(chamber: ChamberId) -> SessionState {
        let mut session = SessionState::new();
        session.sign_in("a@x");
        session.select_chamber(chamber);
        session
    }

    #[tokio::test]
    async fn renders_in_seq_order() {
        let (store, chamber) = seeded().await;
        let view = TranscriptView::new(store);
        let mut session = session_for(chamber);

        let transcript = view.render(&mut session).await.unwrap().unwrap();
        let seqs: Vec<i64> = transcript.entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(transcript.entries[0].speaker, "You");
        assert_eq!(transcript.entries[1].speaker, "Counsel");
    }

    #[tokio::test]
    async fn cache_is_used_until_invalidated() {
        let (store, chamber) = seeded().await;
        let view = TranscriptView::new(store.clone());
        let mut session = session_for(chamber);

        view.render(&mut session).await.unwrap();
        store.append_turn("a@x", chamber, Role::User, "And duty of care?").await.unwrap();

        let cached = view.render(&mut session).await.unwrap().unwrap();
        assert_eq!(cached.entries.len(), 2);

        session.invalidate_transcript();
        let fresh = view.render(&mut session).await.unwrap().unwrap();
        assert_eq!(fresh.entries.len(), 3);
    }

    #[tokio::test]
    async fn refresh_sees_writes_from_elsewhere() {
        let (store, chamber) = seeded().await;
        let view = TranscriptView::new(store.clone());
        let mut session = session_for(chamber);

        view.render(&mut session).await.unwrap();
        store.append_turn("a@x", chamber, Role::User, "And duty of care?").await.unwrap();

        let fresh = view.refresh(&mut session).await.unwrap().unwrap();
        assert_eq!(fresh.entries.len(), 3);
        assert_eq!(fresh.entries[2].content, "And duty of care?");
    }

    #[tokio::test]
    async fn deleted_chamber_clears_selection() {
        let (store, chamber) = seeded().await;
        let view = TranscriptView::new(store.clone());
        let mut session = session_for(chamber);
        store.delete_chamber("a@x", chamber).await.unwrap();

        assert!(matches!(
            view.render(&mut session).await,
            Err(StoreError::UnknownChamber { .. })
        ));
        assert!(session.current_chamber().is_none());
    }

    #[tokio::test]
    async fn no_selection_renders_nothing() {
        let (store, _) = seeded().await;
        let view = TranscriptView::new(store);
        let mut session = SessionState::new();
        session.sign_in("a@x");
        assert!(view.render(&mut session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transient_reply_shown_for_one_pass() {
        let (store, chamber) = seeded().await;
        let view = TranscriptView::new(store);
        let mut session = session_for(chamber);
        session.finish_submission(
            chamber,
            &Ok(SubmissionOutcome::ReplyNotRecorded {
                user_seq: 3,
                reply: "Unsaved answer".into(),
                error: StoreError::WriteFailed("x".into()),
            }),
        );

        let first = view.render(&mut session).await.unwrap().unwrap();
        assert_eq!(first.transient_reply.as_deref(), Some("Unsaved answer"));
        let second = view.render(&mut session).await.unwrap().unwrap();
        assert!(second.transient_reply.is_none());
    }

    #[test]
    fn html_is_escaped() {
        let transcript = Transcript {
            chamber_id: ChamberId(1),
            entries: vec![TranscriptEntry {
                seq: 1,
                role: Role::User,
                speaker: "You",
                content: "<script>alert('x')</script> & more".into(),
            }],
            transient_reply: None,
        };
        let html = render_html(&transcript).unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&amp; more"));
        assert!(html.contains("bubble user"));
        assert!(html.contains("data-seq=\"1\""));
        assert!(!html.contains("transient"));
    }

    #[test]
    fn html_marks_unsaved_reply() {
        let transcript = Transcript {
            chamber_id: ChamberId(1),
            entries: Vec::new(),
            transient_reply: Some("Damages <b>may</b> apply".into()),
        };
        let html = render_html(&transcript).unwrap();
        assert!(html.contains("bubble assistant transient"));
        assert!(html.contains("Counsel"));
        assert!(html.contains("Damages &lt;b&gt;may&lt;/b&gt; apply"));
    }
}
