use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};
use tera::{Context as TeraContext, Tera};

use crate::providers::ToolSpec;

pub const TOOL_NAME: &str = "deliver_translation";

const SYSTEM_PROMPT_TEMPLATE: &str = include_str!("prompts/system_prompt.tera");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateOptions {
    pub lang: String,
    pub source_lang: String,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            lang: "hi".to_string(),
            source_lang: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationResult {
    pub translation: String,
    pub source_language: String,
    pub target_language: String,
}

pub fn tool_spec(tool_name: &str) -> ToolSpec {
    ToolSpec {
        name: tool_name.to_string(),
        description: "Return the translation of the highlighted phrase.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "translation": {"type": "string"},
                "source_language": {"type": "string"},
                "target_language": {"type": "string"}
            },
            "required": ["translation", "source_language", "target_language"]
        }),
    }
}

pub fn render_system_prompt(options: &TranslateOptions, tool_name: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("source_lang", &normalize_lang_code(&options.source_lang));
    context.insert("target_lang", &normalize_lang_code(&options.lang));
    context.insert("tool_name", tool_name);
    Tera::one_off(SYSTEM_PROMPT_TEMPLATE, &context, false)
        .with_context(|| "failed to render system prompt")
}

pub fn parse_tool_args(value: Value, options: &TranslateOptions) -> Result<TranslationResult> {
    let args: ToolArgs =
        serde_json::from_value(value).with_context(|| "invalid translation tool arguments")?;

    if args.translation.trim().is_empty() {
        return Err(anyhow!("translation is empty"));
    }
    if !eq_insensitive(&args.target_language, &options.lang) {
        return Err(anyhow!(
            "tool response target_language mismatch (expected '{}', got '{}')",
            options.lang.trim(),
            args.target_language.trim()
        ));
    }
    let source_auto = options.source_lang.trim().eq_ignore_ascii_case("auto");
    if !source_auto && !eq_insensitive(&args.source_language, &options.source_lang) {
        return Err(anyhow!(
            "tool response source_language mismatch (expected '{}', got '{}')",
            options.source_lang.trim(),
            args.source_language.trim()
        ));
    }

    Ok(TranslationResult {
        translation: args.translation.trim().to_string(),
        source_language: normalize_lang_code(&args.source_language),
        target_language: normalize_lang_code(&args.target_language),
    })
}

/// Accepts ISO 639 style codes: 2-3 ASCII letters, optionally followed by a
/// `-suffix` such as `zho-hans`.
pub fn is_plausible_lang_code(code: &str) -> bool {
    let code = code.trim();
    let (base, suffix) = match code.split_once('-') {
        Some((base, suffix)) => (base, Some(suffix)),
        None => (code, None),
    };
    let base_ok = (2..=3).contains(&base.len()) && base.chars().all(|ch| ch.is_ascii_alphabetic());
    let suffix_ok = suffix.is_none_or(|suffix| {
        !suffix.is_empty() && suffix.chars().all(|ch| ch.is_ascii_alphanumeric())
    });
    base_ok && suffix_ok
}

#[derive(Debug, Deserialize)]
struct ToolArgs {
    translation: String,
    #[serde(default)]
    source_language: String,
    target_language: String,
}

fn normalize_lang_code(code: &str) -> String {
    code.trim().to_lowercase()
}

fn eq_insensitive(left: &str, right: &str) -> bool {
    left.trim().eq_ignore_ascii_case(right.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(source: &str) -> TranslateOptions {
        TranslateOptions {
            lang: "hi".to_string(),
            source_lang: source.to_string(),
        }
    }

    #[test]
    fn prompt_names_languages() {
        let prompt = render_system_prompt(&options("en"), TOOL_NAME).unwrap();
        insta::assert_snapshot!(
            prompt.lines().nth(1).unwrap_or_default(),
            @"Source language: en. Target language: hi."
        );
        assert!(prompt.contains("calling the deliver_translation tool"));
    }

    #[test]
    fn prompt_asks_for_detection_on_auto() {
        let prompt = render_system_prompt(&options("auto"), TOOL_NAME).unwrap();
        assert!(prompt.contains("Source language: auto (detect it)."));
    }

    #[test]
    fn tool_args_are_validated_against_options() {
        let parsed = parse_tool_args(
            json!({"translation": " तेज़ ", "source_language": "EN", "target_language": "hi"}),
            &options("auto"),
        )
        .unwrap();
        assert_eq!(parsed.translation, "तेज़");
        assert_eq!(parsed.source_language, "en");

        let wrong_target = parse_tool_args(
            json!({"translation": "x", "source_language": "en", "target_language": "ja"}),
            &options("auto"),
        );
        assert!(wrong_target.is_err());

        let wrong_source = parse_tool_args(
            json!({"translation": "x", "source_language": "fr", "target_language": "hi"}),
            &options("en"),
        );
        assert!(wrong_source.is_err());

        let empty = parse_tool_args(
            json!({"translation": "  ", "source_language": "en", "target_language": "hi"}),
            &options("auto"),
        );
        assert_eq!(empty.unwrap_err().to_string(), "translation is empty");
    }

    #[test]
    fn lang_codes_are_checked_loosely() {
        assert!(is_plausible_lang_code("hi"));
        assert!(is_plausible_lang_code("zho-hans"));
        assert!(!is_plausible_lang_code("hindi"));
        assert!(!is_plausible_lang_code("h1"));
        assert!(!is_plausible_lang_code("zh-"));
    }
}
