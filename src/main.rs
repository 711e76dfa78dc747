use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "focus-reader",
    version,
    about = "Read a PDF a few highlighted words at a time, with live translation"
)]
struct Cli {
    /// PDF file to read
    #[arg(short = 'd', long = "data")]
    data: PathBuf,

    /// Words per highlight (3-10)
    #[arg(short = 'w', long = "words")]
    words: Option<usize>,

    /// Seconds between highlights (0.2-2.0)
    #[arg(short = 's', long = "speed")]
    speed: Option<f32>,

    /// Highlight color as #RRGGBB
    #[arg(short = 'c', long = "color")]
    color: Option<String>,

    /// Highlight alpha (10-160)
    #[arg(short = 't', long = "transparency")]
    transparency: Option<u8>,

    /// Do not translate highlighted phrases
    #[arg(long = "no-translate")]
    no_translate: bool,

    /// Target language (default: hi)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Source language (ISO 639-1/2/3). Use "auto" to detect.
    #[arg(short = 'L', long = "source-lang")]
    source_lang: Option<String>,

    /// Model name or provider:model (e.g. openai:MODEL_ID)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides environment variables)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Directory for rendered frames
    #[arg(short = 'o', long = "out-dir")]
    out_dir: Option<PathBuf>,

    /// Write one numbered PNG per highlight instead of overwriting frame.png
    #[arg(long = "keep-frames")]
    keep_frames: bool,

    /// Serve the reader over HTTP (address defaults to settings [server].addr)
    #[arg(long = "serve", num_args = 0..=1, default_missing_value = "")]
    serve: Option<String>,

    /// Interactive mode (slash commands on stdin)
    #[arg(short = 'i', long = "interactive")]
    interactive: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

impl From<Cli> for focus_reader::Config {
    fn from(cli: Cli) -> Self {
        Self {
            data: cli.data,
            words: cli.words,
            speed: cli.speed,
            color: cli.color,
            transparency: cli.transparency,
            no_translate: cli.no_translate,
            lang: cli.lang,
            source_lang: cli.source_lang,
            model: cli.model,
            key: cli.key,
            out_dir: cli.out_dir,
            keep_frames: cli.keep_frames,
            serve: cli.serve,
            interactive: cli.interactive,
            settings_path: cli.read_settings,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    focus_reader::logging::init(cli.verbose)?;
    focus_reader::run(cli.into()).await
}
