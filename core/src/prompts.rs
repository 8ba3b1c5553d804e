//! Versioned prompt templates for the executors.
//!
//! Template ids and versions are recorded on every task run so a stored
//! result can always be traced back to the exact prompt that produced it.

use tidings_api::ChatMessage;
use tidings_protocol::ParsePrimitiveError;

pub const SUMMARY_TEMPLATE_ID: &str = "summary.chat";
pub const SUMMARY_TEMPLATE_VERSION: &str = "v2";
pub const TRANSLATION_TEMPLATE_ID: &str = "translation.segment";
pub const TRANSLATION_TEMPLATE_VERSION: &str = "v2";

/// How thorough a summary should be; part of the summary slot key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailLevel {
    Brief,
    Medium,
    Detailed,
}

impl DetailLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            DetailLevel::Brief => "brief",
            DetailLevel::Medium => "medium",
            DetailLevel::Detailed => "detailed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ParsePrimitiveError> {
        match value {
            "brief" => Ok(Self::Brief),
            "medium" => Ok(Self::Medium),
            "detailed" => Ok(Self::Detailed),
            other => Err(ParsePrimitiveError::new("detail level", other)),
        }
    }

    fn guidance(self) -> &'static str {
        match self {
            DetailLevel::Brief => "two or three sentences capturing only the core point",
            DetailLevel::Medium => "one tight paragraph covering the main arguments",
            DetailLevel::Detailed => {
                "several short paragraphs covering arguments, evidence, and caveats"
            }
        }
    }
}

pub fn summary_messages(
    target_language_display_name: &str,
    detail_level: DetailLevel,
    source_text: &str,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You summarize articles for a feed reader. Write in \
             {target_language_display_name}. Produce {}. Use plain prose, \
             no headings, no preamble.",
            detail_level.guidance()
        )),
        ChatMessage::user(source_text),
    ]
}

/// Per-segment translation prompt.
///
/// The previous segment's source text rides along untranslated; it gives
/// the model enough context to resolve pronouns without inviting it to
/// re-translate earlier output.
pub fn translation_messages(
    target_language_display_name: &str,
    source_text: &str,
    previous_source: Option<&str>,
) -> Vec<ChatMessage> {
    let mut user = String::new();
    if let Some(previous) = previous_source {
        user.push_str("Context (do not translate):\n");
        user.push_str(previous);
        user.push_str("\n\nTranslate:\n");
    }
    user.push_str(source_text);

    vec![
        ChatMessage::system(format!(
            "You translate article segments into {target_language_display_name}. \
             Output only the translation of the final passage, preserving \
             tone and inline formatting. Never add commentary.",
        )),
        ChatMessage::user(user),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn summary_prompt_names_language_and_detail() {
        let messages = summary_messages("French", DetailLevel::Brief, "body text");
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("French"));
        assert!(messages[0].content.contains("two or three sentences"));
        assert_eq!(messages[1].content, "body text");
    }

    #[test]
    fn translation_prompt_prepends_untranslated_context() {
        let messages = translation_messages("German", "second", Some("first"));
        assert!(messages[1].content.starts_with("Context (do not translate):\nfirst"));
        assert!(messages[1].content.ends_with("Translate:\nsecond"));

        let bare = translation_messages("German", "only", None);
        assert_eq!(bare[1].content, "only");
    }

    #[test]
    fn detail_level_round_trips() {
        for level in [DetailLevel::Brief, DetailLevel::Medium, DetailLevel::Detailed] {
            assert_eq!(DetailLevel::parse(level.as_str()).ok(), Some(level));
        }
        assert!(DetailLevel::parse("exhaustive").is_err());
    }
}
