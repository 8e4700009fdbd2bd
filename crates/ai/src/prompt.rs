//! Processing modes and their system prompts.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use chunkflow_core::CoreError;

/// What the remote model is asked to do with each chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Correct grammar, spelling and punctuation in place.
    #[default]
    Grammar,
    /// Translate into a target language.
    Translate,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Grammar => "grammar",
            Mode::Translate => "translate",
        }
    }
}

impl core::fmt::Display for Mode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grammar" => Ok(Mode::Grammar),
            "translate" => Ok(Mode::Translate),
            other => Err(CoreError::validation(format!(
                "mode must be one of: grammar, translate (got {other:?})"
            ))),
        }
    }
}

const GRAMMAR_PROMPT: &str = "You are an expert editor. Correct grammar, spelling, punctuation, \
and clarity while preserving the original meaning, tone, and formatting. Return only the \
corrected text, without explanations. If the text is German, also apply German typesetting \
conventions: narration in the Präteritum and direct speech in the Präsens; quotation marks \
„…“ following Duden; spaced en dashes (–) as dashes; paragraphs either indented or separated \
by a blank line, applied consistently. The result must read as if it had been written in that \
language originally.";

/// Inputs that shape the system prompt for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContext {
    pub mode: Mode,
    /// Detected source language; detection itself happens upstream.
    pub source_language: Option<String>,
    pub target_language: Option<String>,
}

impl PromptContext {
    pub fn grammar() -> Self {
        Self::default()
    }

    pub fn translate(target_language: impl Into<String>) -> Self {
        Self {
            mode: Mode::Translate,
            source_language: None,
            target_language: Some(target_language.into()),
        }
    }

    pub fn with_source_language(mut self, source_language: impl Into<String>) -> Self {
        self.source_language = Some(source_language.into());
        self
    }

    /// Translation needs a non-blank target language.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.mode == Mode::Translate && self.target().is_none() {
            return Err(CoreError::validation(
                "target language is required for translation",
            ));
        }
        Ok(())
    }

    /// Render the system prompt for this mode.
    pub fn system_prompt(&self) -> String {
        match self.mode {
            Mode::Grammar => GRAMMAR_PROMPT.to_string(),
            Mode::Translate => {
                let source = self
                    .source_language
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .unwrap_or("unknown");
                let target = self.target().unwrap_or("auto");
                format!(
                    "You are a professional translator. Translate the user's text from the given \
                     source language ({source}) to the target language ({target}). Preserve tone, \
                     style, and formatting. Return only the translated text without explanations."
                )
            }
        }
    }

    fn target(&self) -> Option<&str> {
        self.target_language
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Translate".parse::<Mode>().unwrap(), Mode::Translate);
        assert_eq!(" grammar ".parse::<Mode>().unwrap(), Mode::Grammar);
        assert!("summarize".parse::<Mode>().is_err());
    }

    #[test]
    fn translation_without_target_is_invalid() {
        let ctx = PromptContext {
            mode: Mode::Translate,
            source_language: None,
            target_language: Some("   ".to_string()),
        };
        assert!(matches!(ctx.validate(), Err(CoreError::Validation(_))));
        assert!(PromptContext::grammar().validate().is_ok());
    }

    #[test]
    fn translate_prompt_names_both_languages() {
        let prompt = PromptContext::translate("German")
            .with_source_language("en")
            .system_prompt();
        assert!(prompt.contains("(en)"));
        assert!(prompt.contains("(German)"));
    }

    #[test]
    fn unknown_source_language_is_rendered() {
        let prompt = PromptContext::translate("fr").system_prompt();
        assert!(prompt.contains("(unknown)"));
    }

    #[test]
    fn grammar_prompt_asks_for_text_only() {
        assert!(PromptContext::grammar().system_prompt().contains("Return only the corrected text"));
    }
}
