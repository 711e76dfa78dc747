use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

pub const DEFAULT_PLACEHOLDER: &str = "[Translation Error]";

#[derive(Debug, Clone)]
pub struct Settings {
    pub words: usize,
    pub speed: f32,
    pub color: String,
    pub transparency: u8,
    pub translate: bool,
    pub lang: String,
    pub source_lang: String,
    pub model: Option<String>,
    pub placeholder: String,
    pub server_addr: String,
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            words: 4,
            speed: 1.0,
            color: "#FFF176".to_string(),
            transparency: 40,
            translate: true,
            lang: "hi".to_string(),
            source_lang: "auto".to_string(),
            model: None,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            server_addr: "127.0.0.1:8787".to_string(),
            output_dir: PathBuf::from("focus-reader-out"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    reader: Option<ReaderSettings>,
    translation: Option<TranslationSettings>,
    server: Option<ServerSettings>,
    output: Option<OutputSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct ReaderSettings {
    words: Option<usize>,
    speed: Option<f32>,
    color: Option<String>,
    transparency: Option<u8>,
    translate: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    lang: Option<String>,
    source_lang: Option<String>,
    model: Option<String>,
    placeholder: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputSettings {
    dir: Option<String>,
}

/// Loads settings from, in increasing priority: built-in defaults, the
/// working directory, the home settings directory and `extra_path`.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(reader) = incoming.reader {
            if let Some(words) = reader.words {
                self.words = words;
            }
            if let Some(speed) = reader.speed {
                self.speed = speed;
            }
            if let Some(color) = reader.color
                && !color.trim().is_empty()
            {
                self.color = color;
            }
            if let Some(transparency) = reader.transparency {
                self.transparency = transparency;
            }
            if let Some(translate) = reader.translate {
                self.translate = translate;
            }
        }
        if let Some(translation) = incoming.translation {
            if let Some(lang) = translation.lang
                && !lang.trim().is_empty()
            {
                self.lang = lang;
            }
            if let Some(source_lang) = translation.source_lang
                && !source_lang.trim().is_empty()
            {
                self.source_lang = source_lang;
            }
            if let Some(model) = translation.model
                && !model.trim().is_empty()
            {
                self.model = Some(model);
            }
            if let Some(placeholder) = translation.placeholder {
                self.placeholder = placeholder;
            }
        }
        if let Some(server) = incoming.server
            && let Some(addr) = server.addr
            && !addr.trim().is_empty()
        {
            self.server_addr = addr;
        }
        if let Some(output) = incoming.output
            && let Some(dir) = output.dir
            && !dir.trim().is_empty()
        {
            self.output_dir = PathBuf::from(dir);
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".focus-reader"))
        }
    })
}
