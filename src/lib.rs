use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{info, warn};

pub mod cursor;
pub mod document;
pub mod logging;
mod providers;
pub mod reader;
pub mod server;
pub mod settings;
pub mod style;
pub mod terminal;
pub mod translations;
pub mod translator;
pub mod walker;

#[cfg(test)]
mod test_util;

pub use cursor::ReadingCursor;
pub use document::{PageSource, PdfDocument, Token};
pub use providers::{Claude, Gemini, OpenAI, Provider, ProviderKind, ProviderUsage};
pub use reader::{Command, Display, Frame, Reader, ReaderOptions, ReaderStatus};
pub use style::{HighlightColor, HighlightStyle};
pub use translations::TranslateOptions;
pub use translator::{ExecutionOutput, Translation, TranslationCache, Translator};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub data: PathBuf,
    pub words: Option<usize>,
    pub speed: Option<f32>,
    pub color: Option<String>,
    pub transparency: Option<u8>,
    pub no_translate: bool,
    pub lang: Option<String>,
    pub source_lang: Option<String>,
    pub model: Option<String>,
    pub key: Option<String>,
    pub out_dir: Option<PathBuf>,
    pub keep_frames: bool,
    /// `Some("")` serves on the address from settings.
    pub serve: Option<String>,
    pub interactive: bool,
    pub settings_path: Option<String>,
}

pub async fn run(config: Config) -> Result<()> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;
    let options = resolve_options(&config, &settings)?;
    let translate_options = resolve_translate_options(&config, &settings)?;

    let document = PdfDocument::open(&config.data).with_context(|| "unable to open PDF")?;
    let translations = build_translations(&config, &settings, &translate_options, options.translate)?;
    let placeholder = settings.placeholder.clone();
    let (commands, receiver) = unbounded_channel();

    if let Some(addr) = config.serve.as_deref() {
        let addr = if addr.trim().is_empty() {
            settings.server_addr.clone()
        } else {
            addr.trim().to_string()
        };
        let handle = server::ServerHandle::new(options, document.page_count(), commands);
        let mut reader = Reader::new(document, handle.display(), translations, options, receiver)
            .with_placeholder(placeholder);
        // Own task, so rendering a frame never stalls the accept loop.
        let mut server = tokio::spawn(server::run_server(handle, addr));
        return tokio::select! {
            result = reader.run() => {
                server.abort();
                result
            }
            joined = &mut server => joined.with_context(|| "server task failed")?,
        };
    }

    let out_dir = config
        .out_dir
        .clone()
        .unwrap_or_else(|| settings.output_dir.clone());
    let display = terminal::TerminalDisplay::new(&out_dir, translate_options.lang.clone())?
        .keep_frames(config.keep_frames);
    info!("writing frames to {}", out_dir.display());

    if config.interactive {
        terminal::spawn_stdin_commands(commands, options);
    } else {
        commands
            .send(Command::Start)
            .map_err(|_| anyhow!("reader stopped before starting"))?;
    }

    let mut reader = Reader::new(document, display, translations, options, receiver)
        .with_placeholder(placeholder)
        .exit_on_complete(!config.interactive);
    reader.run().await
}

/// CLI flags win over settings; the result is bounds-checked.
pub fn resolve_options(config: &Config, settings: &settings::Settings) -> Result<ReaderOptions> {
    let color = config.color.as_deref().unwrap_or(&settings.color);
    let options = ReaderOptions {
        chunk_size: config.words.unwrap_or(settings.words),
        interval: reader::interval_from_secs(config.speed.unwrap_or(settings.speed))?,
        style: HighlightStyle {
            color: color.parse::<HighlightColor>()?,
            alpha: config.transparency.unwrap_or(settings.transparency),
        },
        translate: settings.translate && !config.no_translate,
    };
    options.validate()?;
    Ok(options)
}

fn resolve_translate_options(
    config: &Config,
    settings: &settings::Settings,
) -> Result<TranslateOptions> {
    let options = TranslateOptions {
        lang: config.lang.clone().unwrap_or_else(|| settings.lang.clone()),
        source_lang: config
            .source_lang
            .clone()
            .unwrap_or_else(|| settings.source_lang.clone()),
    };
    if !translations::is_plausible_lang_code(&options.lang) {
        return Err(anyhow!("invalid target language code: {}", options.lang));
    }
    let source = options.source_lang.trim();
    if !source.eq_ignore_ascii_case("auto") && !translations::is_plausible_lang_code(source) {
        return Err(anyhow!("invalid source language code: {}", source));
    }
    Ok(options)
}

/// A missing API key is not fatal: reading continues and each phrase shows
/// the placeholder.
fn build_translations(
    config: &Config,
    settings: &settings::Settings,
    translate_options: &TranslateOptions,
    enabled: bool,
) -> Result<TranslationCache> {
    let model_arg = config.model.as_deref().or(settings.model.as_deref());
    let key_override = config.key.as_deref();

    let selection = match providers::resolve_provider_selection(model_arg, key_override) {
        Ok(selection) => selection,
        Err(err) if model_arg.is_none() => return Ok(translation_unavailable(&err, enabled)),
        Err(err) => return Err(err),
    };
    let key = match providers::resolve_key(selection.provider, key_override) {
        Ok(key) => key,
        Err(err) => return Ok(translation_unavailable(&err, enabled)),
    };

    info!(
        "translating with {} ({}) into {}",
        selection.provider.as_str(),
        selection
            .requested_model
            .as_deref()
            .unwrap_or(selection.provider.default_model()),
        translate_options.lang
    );
    let provider = providers::build_provider(selection.provider, key, selection.requested_model);
    let translator = Translator::new(provider, translate_options.clone());
    Ok(TranslationCache::new(Some(Box::new(translator))))
}

fn translation_unavailable(err: &anyhow::Error, enabled: bool) -> TranslationCache {
    if enabled {
        warn!("translation unavailable: {}", err);
        // Logging is off without --verbose; this one must always be seen.
        eprintln!("warning: translation unavailable: {}", err);
    }
    TranslationCache::unavailable()
}
