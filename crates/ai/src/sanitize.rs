//! Post-processing of raw model output.
//!
//! Models sometimes wrap the answer in a code fence, open with a lead-in
//! ("Here is the translation:") or put a label line ("Corrected text:")
//! above it. Those wrappers are stripped; the answer itself is untouched.

use std::sync::OnceLock;

use regex::Regex;

static FENCE: OnceLock<Regex> = OnceLock::new();
static LABEL_LINE: OnceLock<Regex> = OnceLock::new();
static LEAD_IN: OnceLock<Regex> = OnceLock::new();

fn fence() -> &'static Regex {
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)\A```[A-Za-z0-9_+\-]*[ \t]*\r?\n(.*?)\r?\n?```\z").expect("fence regex")
    })
}

fn label_line() -> &'static Regex {
    LABEL_LINE.get_or_init(|| {
        Regex::new(
            r"(?i)\A[ \t]*(?:translation|translated text|corrected text|corrected version|correction|revised text|edited text|output|result)[ \t]*:[ \t]*(?:\r?\n|\z)",
        )
        .expect("label regex")
    })
}

fn lead_in() -> &'static Regex {
    LEAD_IN.get_or_init(|| {
        Regex::new(
            r"(?i)\A[ \t]*here(?:\s+is|'s|\s+are)\b[^:\n]{0,80}?\b(?:translation|translated|corrected|correction|corrections|revised|revision|edited|text|version)\b[^:\n]{0,40}:[ \t]*",
        )
        .expect("lead-in regex")
    })
}

/// Strip boilerplate wrappers from a model answer.
pub fn sanitize_model_output(raw: &str) -> String {
    let mut text = raw.trim();
    if text.is_empty() {
        return String::new();
    }

    if let Some(inner) = fence().captures(text).and_then(|c| c.get(1)) {
        text = inner.as_str().trim();
    }

    loop {
        let before = text.len();
        text = skip_blank_lines(text);
        if let Some(m) = label_line().find(text) {
            text = &text[m.end()..];
        }
        if let Some(m) = lead_in().find(text) {
            text = &text[m.end()..];
        }
        if text.len() == before {
            break;
        }
    }

    text.trim_end().to_string()
}

/// Drop leading lines that contain only whitespace.
fn skip_blank_lines(mut text: &str) -> &str {
    while let Some(newline) = text.find('\n') {
        if text[..newline].trim().is_empty() {
            text = &text[newline + 1..];
        } else {
            break;
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_label_line() {
        assert_eq!(sanitize_model_output("Translation:\nHello"), "Hello");
        assert_eq!(sanitize_model_output("Translation:\nHello world"), "Hello world");
        assert_eq!(
            sanitize_model_output("Corrected text:\nDies ist ein Test."),
            "Dies ist ein Test."
        );
    }

    #[test]
    fn strips_inline_lead_in() {
        assert_eq!(
            sanitize_model_output("Here is the corrected text: Dies ist gut."),
            "Dies ist gut."
        );
        assert_eq!(sanitize_model_output("Here is the correction: Linha"), "Linha");
    }

    #[test]
    fn strips_lead_in_on_its_own_line() {
        assert_eq!(
            sanitize_model_output("Here is the translation:\nBonjour le monde"),
            "Bonjour le monde"
        );
    }

    #[test]
    fn unwraps_fenced_answers() {
        assert_eq!(
            sanitize_model_output("```\nCorrected text:\nThis is fine.\n```"),
            "This is fine."
        );
        assert_eq!(
            sanitize_model_output("```text\nHere is the corrected text: Dies ist gut.\n```"),
            "Dies ist gut."
        );
    }

    #[test]
    fn leaves_inner_fences_alone() {
        let text = "Use this:\n```\nlet x = 1;\n```\nDone.";
        assert_eq!(sanitize_model_output(text), text);
    }

    #[test]
    fn collapses_leading_blank_lines() {
        assert_eq!(sanitize_model_output("Translation:\n\n  \nHallo"), "Hallo");
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(sanitize_model_output("Plain text."), "Plain text.");
        let text = "Plain output with no boilerplate.";
        assert_eq!(sanitize_model_output(text), text);
    }

    #[test]
    fn unrelated_here_is_sentences_survive() {
        let text = "Here is what I think: we should go.";
        assert_eq!(sanitize_model_output(text), text);
    }

    #[test]
    fn empty_input() {
        assert_eq!(sanitize_model_output(""), "");
        assert_eq!(sanitize_model_output("   \n "), "");
    }

    #[test]
    fn never_starts_with_boilerplate() {
        let samples = [
            "Translation:\nHello world",
            "Here is the translation:\nBonjour le monde",
            "```\nCorrected text:\nThis is fine.\n```",
            "Here is the correction: Linha",
        ];
        for raw in samples {
            let cleaned = sanitize_model_output(raw).to_lowercase();
            assert!(!cleaned.starts_with("translation:"), "{raw:?}");
            assert!(!cleaned.starts_with("corrected text:"), "{raw:?}");
            assert!(!cleaned.starts_with("here is"), "{raw:?}");
        }
    }
}
