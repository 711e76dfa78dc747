use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

use crate::providers::{Provider, ProviderUsage};
use crate::translations::{self, TOOL_NAME, TranslateOptions, tool_spec};

/// Upper bound on one phrase, retries included.
pub const TRANSLATE_TIMEOUT: Duration = Duration::from_secs(45);

pub type TranslateFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Anything that can turn a phrase into its translation.
pub trait PhraseTranslator: Send + Sync {
    fn translate<'a>(&'a self, text: &'a str) -> TranslateFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct Translator<P: Provider + Clone> {
    provider: P,
    options: TranslateOptions,
}

#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub text: String,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

impl<P: Provider + Clone> Translator<P> {
    pub fn new(provider: P, options: TranslateOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> &TranslateOptions {
        &self.options
    }

    pub async fn exec(&self, input: &str) -> Result<ExecutionOutput> {
        let system_prompt = translations::render_system_prompt(&self.options, TOOL_NAME)?;
        let response = self
            .provider
            .clone()
            .register_tool(tool_spec(TOOL_NAME))
            .append_system_input(system_prompt)
            .append_user_input(input.to_string())
            .call_tool(TOOL_NAME)
            .await?;

        let parsed = translations::parse_tool_args(response.args, &self.options)?;
        Ok(ExecutionOutput {
            text: parsed.translation,
            model: response.model,
            usage: response.usage,
        })
    }
}

impl<P: Provider + Clone + 'static> PhraseTranslator for Translator<P> {
    fn translate<'a>(&'a self, text: &'a str) -> TranslateFuture<'a> {
        Box::pin(async move {
            let output = self.exec(text).await?;
            if let Some(usage) = output.usage.as_ref() {
                debug!(
                    "translated with {} ({} tokens)",
                    output.model.as_deref().unwrap_or("unknown model"),
                    usage.total_tokens.unwrap_or(0)
                );
            }
            Ok(output.text)
        })
    }
}

/// Outcome of translating one highlighted phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// Translation switched off or nothing to translate.
    Disabled,
    Translated(String),
    Failed,
}

impl Translation {
    /// Text for the translation region; failures show `placeholder`.
    pub fn display_text<'a>(&'a self, placeholder: &'a str) -> &'a str {
        match self {
            Translation::Disabled => "",
            Translation::Translated(text) => text,
            Translation::Failed => placeholder,
        }
    }
}

/// Memoizing front for a [`PhraseTranslator`]. Errors, timeouts and a
/// missing translator are reported as [`Translation::Failed`] and are not
/// memoized.
pub struct TranslationCache {
    translator: Option<Box<dyn PhraseTranslator>>,
    memo: HashMap<String, String>,
    timeout: Duration,
}

impl TranslationCache {
    pub fn new(translator: Option<Box<dyn PhraseTranslator>>) -> Self {
        Self {
            translator,
            memo: HashMap::new(),
            timeout: TRANSLATE_TIMEOUT,
        }
    }

    /// No translator could be configured (e.g. no API key).
    pub fn unavailable() -> Self {
        Self::new(None)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_available(&self) -> bool {
        self.translator.is_some()
    }

    pub async fn lookup(&mut self, text: &str) -> Translation {
        if text.trim().is_empty() {
            return Translation::Disabled;
        }
        let Some(translator) = self.translator.as_ref() else {
            return Translation::Failed;
        };
        if let Some(hit) = self.memo.get(text) {
            return Translation::Translated(hit.clone());
        }
        match tokio::time::timeout(self.timeout, translator.translate(text)).await {
            Ok(Ok(translated)) => {
                self.memo.insert(text.to_string(), translated.clone());
                Translation::Translated(translated)
            }
            Ok(Err(err)) => {
                warn!("translation failed for '{}': {:#}", text, err);
                Translation::Failed
            }
            Err(_) => {
                warn!(
                    "translation timed out for '{}' after {:.1}s",
                    text,
                    self.timeout.as_secs_f32()
                );
                Translation::Failed
            }
        }
    }

    pub fn cached_len(&self) -> usize {
        self.memo.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Upper {
        calls: Arc<AtomicUsize>,
    }

    impl PhraseTranslator for Upper {
        fn translate<'a>(&'a self, text: &'a str) -> TranslateFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(text.to_uppercase())
            })
        }
    }

    struct Broken;

    impl PhraseTranslator for Broken {
        fn translate<'a>(&'a self, _text: &'a str) -> TranslateFuture<'a> {
            Box::pin(async { Err(anyhow!("service unavailable")) })
        }
    }

    #[tokio::test]
    async fn repeated_phrases_hit_the_memo() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut cache = TranslationCache::new(Some(Box::new(Upper {
            calls: calls.clone(),
        })));
        assert_eq!(
            cache.lookup("brown fox").await,
            Translation::Translated("BROWN FOX".to_string())
        );
        assert_eq!(
            cache.lookup("brown fox").await,
            Translation::Translated("BROWN FOX".to_string())
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.cached_len(), 1);
    }

    #[tokio::test]
    async fn blank_phrase_skips_the_service() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut cache = TranslationCache::new(Some(Box::new(Upper {
            calls: calls.clone(),
        })));
        assert_eq!(cache.lookup("   ").await, Translation::Disabled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failures_render_as_placeholder() {
        let mut cache = TranslationCache::new(Some(Box::new(Broken)));
        let outcome = cache.lookup("jumps").await;
        assert_eq!(outcome, Translation::Failed);
        assert_eq!(outcome.display_text("[Translation Error]"), "[Translation Error]");
        assert_eq!(cache.cached_len(), 0);
    }

    struct Silent;

    impl PhraseTranslator for Silent {
        fn translate<'a>(&'a self, _text: &'a str) -> TranslateFuture<'a> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn missing_translator_shows_placeholder() {
        let mut cache = TranslationCache::unavailable();
        assert!(!cache.is_available());
        assert_eq!(
            cache.lookup("The quick").await.display_text("[Translation Error]"),
            "[Translation Error]"
        );
        assert_eq!(cache.lookup(" ").await, Translation::Disabled);
    }

    #[tokio::test]
    async fn unanswered_translation_times_out_as_failed() {
        let mut cache = TranslationCache::new(Some(Box::new(Silent)))
            .with_timeout(Duration::from_millis(50));
        let outcome = tokio::time::timeout(Duration::from_secs(5), cache.lookup("The quick"))
            .await
            .expect("lookup must give up on its own");
        assert_eq!(outcome, Translation::Failed);
        assert_eq!(cache.cached_len(), 0);
    }
}
