//! Prompt assembly — the instruction text submitted to the model.
//!
//! The instruction is composed of fixed blocks in this order:
//!
//! 1. **Persona** — the assistant's professional role
//! 2. **Conversational protocol** — greetings, gratitude, farewells
//! 3. **Boundary** — permitted topics and the literal refusal sentence
//! 4. *(optional)* **Consultation history** — prior turns, oldest first
//! 5. **Answer language** and the verbatim user query
//!
//! # Determinism
//!
//! Assembly is a pure function of its inputs: identical inputs always
//! produce byte-identical output. Nothing time-dependent or random is used.

use lexchamber_core::consultation::{Role, Turn};
use std::fmt::Write;

/// The sentence the model must answer with for off-topic queries.
pub const REFUSAL_SENTENCE: &str = "I am authorized only for legal consultation.";

/// Topics the assistant may discuss.
pub const PERMITTED_TOPICS: [&str; 4] = [
    "Constitutional Law",
    "Civil Law",
    "Criminal Procedure",
    "Legal Strategy",
];

pub const DEFAULT_PERSONA: &str = "Senior Legal Counsel";
pub const DEFAULT_LANGUAGE: &str = "English";

const PROTOCOL: [(&str, &str, &str); 3] = [
    (
        "Greetings",
        "If the user only greets you, greet them back in one sentence and invite their legal question.",
        "Good day. How may I assist you with your legal matter today?",
    ),
    (
        "Gratitude",
        "If the user thanks you, acknowledge it briefly and offer further assistance.",
        "You are most welcome. Please let me know if another legal question arises.",
    ),
    (
        "Farewells",
        "If the user says goodbye, close the consultation courteously in one sentence.",
        "Goodbye, and I wish you every success with your matter.",
    ),
];

/// Build the instruction for one submission.
///
/// `history`, when supplied and non-empty, is rendered as a transcript block
/// ahead of the query. The query is embedded verbatim.
pub fn assemble(persona: &str, language: &str, query: &str, history: Option<&[Turn]>) -> String {
    let mut out = String::with_capacity(1024 + query.len());

    // 1. Persona
    let _ = writeln!(
        out,
        "You are a {persona}. Answer with the care and precision expected of that role."
    );
    out.push('\n');

    // 2. Conversational protocol
    out.push_str("CONVERSATIONAL PROTOCOL:\n");
    for (i, (kind, rule, example)) in PROTOCOL.iter().enumerate() {
        let _ = writeln!(out, "{}. {kind}: {rule} Example: \"{example}\"", i + 1);
    }
    out.push('\n');

    // 3. Boundary
    out.push_str("BOUNDARY:\n");
    let _ = writeln!(
        out,
        "You may only answer questions within these areas: {}.",
        PERMITTED_TOPICS.join(", ")
    );
    let _ = writeln!(
        out,
        "For any question outside these areas, reply with exactly this sentence and nothing else: \"{REFUSAL_SENTENCE}\""
    );
    out.push('\n');

    // 4. History
    if let Some(turns) = history.filter(|t| !t.is_empty()) {
        out.push_str("CONSULTATION HISTORY:\n");
        for turn in turns {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Assistant => "Counsel",
            };
            let _ = writeln!(out, "{speaker}: {}", turn.content);
        }
        out.push('\n');
    }

    // 5. Language and query
    let _ = writeln!(out, "Respond in {language}.");
    out.push('\n');
    out.push_str("USER QUERY:\n");
    out.push_str(query);

    out
}

/// The last `limit` turns preceding `before_seq`, oldest first.
pub fn history_window(turns: &[Turn], before_seq: i64, limit: usize) -> &[Turn] {
    let end = turns.partition_point(|t| t.seq < before_seq);
    &turns[end.saturating_sub(limit)..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lexchamber_core::consultation::ChamberId;

    fn turn(seq: i64, role: Role, content: &str) -> Turn {
        Turn {
            chamber_id: ChamberId(1),
            seq,
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn deterministic() {
        let a = assemble(DEFAULT_PERSONA, DEFAULT_LANGUAGE, "Define negligence.", None);
        let b = assemble(DEFAULT_PERSONA, DEFAULT_LANGUAGE, "Define negligence.", None);
        assert_eq!(a, b);
    }

    #[test]
    fn always_contains_refusal_sentence() {
        for query in ["", "Best pizza recipe?", "\"quoted\"", "Define negligence."] {
            let out = assemble("Anyone", "Any", query, None);
            assert!(out.contains(REFUSAL_SENTENCE));
        }
    }

    #[test]
    fn lists_permitted_topics() {
        let out = assemble(DEFAULT_PERSONA, DEFAULT_LANGUAGE, "q", None);
        for topic in PERMITTED_TOPICS {
            assert!(out.contains(topic), "missing {topic}");
        }
    }

    #[test]
    fn blocks_in_order() {
        let out = assemble("Senior Legal Counsel", "Hindi", "What is bail?", None);
        let persona = out.find("Senior Legal Counsel").unwrap();
        let protocol = out.find("CONVERSATIONAL PROTOCOL").unwrap();
        let boundary = out.find("BOUNDARY").unwrap();
        let language = out.find("Respond in Hindi.").unwrap();
        let query = out.find("What is bail?").unwrap();
        assert!(persona < protocol && protocol < boundary && boundary < language && language < query);
    }

    #[test]
    fn protocol_covers_three_situations_with_examples() {
        let out = assemble(DEFAULT_PERSONA, DEFAULT_LANGUAGE, "q", None);
        for kind in ["Greetings", "Gratitude", "Farewells"] {
            assert!(out.contains(kind));
        }
        assert_eq!(out.matches("Example: \"").count(), 3);
    }

    #[test]
    fn query_is_verbatim_and_last() {
        let query = "  Is a verbal contract binding?\n\n(Asking for a friend)  ";
        let out = assemble(DEFAULT_PERSONA, DEFAULT_LANGUAGE, query, None);
        assert!(out.ends_with(query));
    }

    #[test]
    fn persona_and_language_overrides_appear() {
        let out = assemble("Constitutional specialist", "Hindi", "Explain Article 21.", None);
        assert!(out.contains("Constitutional specialist"));
        assert!(out.contains("Hindi"));
    }

    #[test]
    fn history_precedes_query() {
        let history = vec![
            turn(1, Role::User, "What is a tort?"),
            turn(2, Role::Assistant, "A civil wrong."),
        ];
        let out = assemble(DEFAULT_PERSONA, DEFAULT_LANGUAGE, "Give an example.", Some(history.as_slice()));
        let block = out.find("CONSULTATION HISTORY").unwrap();
        assert!(block < out.find("USER QUERY").unwrap());
        assert!(out.contains("User: What is a tort?"));
        assert!(out.contains("Counsel: A civil wrong."));
    }

    #[test]
    fn empty_history_matches_no_history() {
        let none = assemble(DEFAULT_PERSONA, DEFAULT_LANGUAGE, "q", None);
        let empty = assemble(DEFAULT_PERSONA, DEFAULT_LANGUAGE, "q", Some(&[][..]));
        assert_eq!(none, empty);
    }

    #[test]
    fn history_window_excludes_current_turn() {
        let turns: Vec<Turn> = (1..=6)
            .map(|seq| turn(seq, if seq % 2 == 1 { Role::User } else { Role::Assistant }, "x"))
            .collect();

        let window = history_window(&turns, 5, 2);
        assert_eq!(window.iter().map(|t| t.seq).collect::<Vec<_>>(), vec![3, 4]);

        assert!(history_window(&turns, 1, 4).is_empty());
        assert_eq!(history_window(&turns, 5, 0).len(), 0);
        assert_eq!(history_window(&turns, 5, 100).len(), 4);
    }
}
