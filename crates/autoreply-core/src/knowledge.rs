//! Knowledge base and prompt contract for the offline assistant.
//!
//! The system prompt restricts the model to the facts listed here and requires one exact
//! escalation sentence for anything else. The core never checks the model's compliance.

use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;

const DEFAULT_OWNER: &str = "Jatin";

/// One labelled fact, rendered as `- **Label:** text`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Fact {
    pub label: String,
    pub text: String,
}

/// How the prompt and greeting refer to the owner.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Pronouns {
    pub subject: String,
    pub possessive: String,
}

impl Default for Pronouns {
    fn default() -> Self {
        Self {
            subject: "he".into(),
            possessive: "his".into(),
        }
    }
}

/// Who the assistant speaks for and what it may say.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KnowledgeBase {
    pub owner: String,
    #[serde(default)]
    pub pronouns: Pronouns,
    #[serde(default)]
    pub greeting: Option<String>,
    #[serde(default)]
    pub facts: Vec<Fact>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self {
            owner: DEFAULT_OWNER.to_string(),
            pronouns: Pronouns::default(),
            greeting: Some(format!(
                "Hi! {0} is currently offline. I'm his chat assistant 🤖. I can help answer some general questions or note your message so {0} can reply later.",
                DEFAULT_OWNER
            )),
            facts: vec![
                Fact {
                    label: "About".into(),
                    text: "He's a full-stack developer and an engineering undergraduate, passionate about building scalable web applications and creating impactful products.".into(),
                },
                Fact {
                    label: "Education".into(),
                    text: "He is pursuing a Bachelor of Engineering in Information Technology at L.D. College of Engineering (2022-2026).".into(),
                },
                Fact {
                    label: "Contact".into(),
                    text: "His email is helloitsmejatin@gmail.com.".into(),
                },
            ],
        }
    }
}

impl KnowledgeBase {
    /// Load a knowledge base from a TOML file (`owner`, optional `greeting`, `[[facts]]`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::KnowledgeRead {
            path: display.clone(),
            source,
        })?;
        let kb: KnowledgeBase = toml::from_str(&raw).map_err(|source| {
            ConfigError::KnowledgeParse {
                path: display.clone(),
                source,
            }
        })?;
        if kb.owner.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{}: owner is empty", display)));
        }
        Ok(kb)
    }

    /// The exact sentence the model must emit for anything outside the facts.
    pub fn escalation_phrase(&self) -> String {
        format!("{} will be right back to resolve your query.", self.owner)
    }

    /// One-time greeting for a new conversation.
    pub fn greeting(&self) -> String {
        match self.greeting.as_deref().map(str::trim) {
            Some(g) if !g.is_empty() => g.to_string(),
            _ => format!(
                "Hi! {0} is currently offline. I'm {1} chat assistant 🤖. I can help answer some general questions or note your message so {0} can reply later.",
                self.owner, self.pronouns.possessive
            ),
        }
    }

    pub fn system_prompt(&self) -> String {
        let facts = self
            .facts
            .iter()
            .map(|f| format!("- **{}:** {}", f.label, f.text))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "You are a helpful AI assistant for {owner}, handling {their} messages while {they} is offline. Your tone is friendly and professional.\n\n\
Your goal is to answer questions on {their} behalf using ONLY the information provided below.\n\n\
**Knowledge Base about {owner}:**\n{facts}\n\n\
If the user's question is personal, urgent, or about anything not covered in your knowledge base, you MUST reply with only this exact phrase: \"{escalation}\"",
            owner = self.owner,
            their = self.pronouns.possessive,
            they = self.pronouns.subject,
            facts = facts,
            escalation = self.escalation_phrase(),
        )
    }

    /// Full completion prompt: system prompt, then the transcript, then the reply cue.
    pub fn build_prompt(&self, transcript: &str) -> String {
        format!(
            "{}\n\nConversation:\n{}\n\nReply:",
            self.system_prompt(),
            transcript
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_escalation_phrase_is_exact() {
        assert_eq!(
            KnowledgeBase::default().escalation_phrase(),
            "Jatin will be right back to resolve your query."
        );
    }

    #[test]
    fn prompt_embeds_facts_transcript_and_cue() {
        let kb = KnowledgeBase::default();
        let prompt = kb.build_prompt("User: hi");
        assert!(prompt.contains("L.D. College of Engineering"));
        assert!(prompt.contains("\"Jatin will be right back to resolve your query.\""));
        assert!(prompt.ends_with("\n\nConversation:\nUser: hi\n\nReply:"));
    }

    #[test]
    fn default_system_prompt_is_the_fixed_profile_text() {
        let expected = "You are a helpful AI assistant for Jatin, handling his messages while he is offline. Your tone is friendly and professional.

Your goal is to answer questions on his behalf using ONLY the information provided below.

**Knowledge Base about Jatin:**
- **About:** He's a full-stack developer and an engineering undergraduate, passionate about building scalable web applications and creating impactful products.
- **Education:** He is pursuing a Bachelor of Engineering in Information Technology at L.D. College of Engineering (2022-2026).
- **Contact:** His email is helloitsmejatin@gmail.com.

If the user's question is personal, urgent, or about anything not covered in your knowledge base, you MUST reply with only this exact phrase: \"Jatin will be right back to resolve your query.\"";
        assert_eq!(KnowledgeBase::default().system_prompt(), expected);
    }

    #[test]
    fn greeting_falls_back_to_owner_template() {
        let kb = KnowledgeBase {
            owner: "Priya".into(),
            pronouns: Pronouns {
                subject: "she".into(),
                possessive: "her".into(),
            },
            greeting: None,
            facts: vec![],
        };
        assert!(kb.greeting().starts_with("Hi! Priya is currently offline. I'm her chat assistant"));
        assert!(kb.system_prompt().contains("handling her messages while she is offline"));
        assert!(KnowledgeBase::default().greeting().contains("I'm his chat assistant"));
    }

    #[test]
    fn loads_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"owner = "Priya"
greeting = "Priya is away."

[pronouns]
subject = "she"
possessive = "her"

[[facts]]
label = "Role"
text = "Backend engineer."
"#
        )
        .unwrap();
        let kb = KnowledgeBase::load(file.path()).unwrap();
        assert_eq!(kb.owner, "Priya");
        assert_eq!(kb.greeting(), "Priya is away.");
        assert!(kb.system_prompt().contains("- **Role:** Backend engineer."));
        assert!(kb.system_prompt().contains("on her behalf"));
    }

    #[test]
    fn rejects_empty_owner() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "owner = \"  \"").unwrap();
        assert!(matches!(
            KnowledgeBase::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
