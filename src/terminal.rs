//! Terminal surface: frames go to PNG files, text goes to stdout, and
//! slash commands come in on stdin.

use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::cursor::ReadingCursor;
use crate::reader::{Command, Display, Frame, OptionsPatch, ReaderOptions, ReaderStatus};

pub struct TerminalDisplay {
    out_dir: PathBuf,
    keep_frames: bool,
    lang: String,
    frames_written: usize,
}

impl TerminalDisplay {
    pub fn new(out_dir: impl Into<PathBuf>, lang: impl Into<String>) -> Result<Self> {
        let out_dir = out_dir.into();
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("failed to create output dir: {}", out_dir.display()))?;
        Ok(Self {
            out_dir,
            keep_frames: false,
            lang: lang.into(),
            frames_written: 0,
        })
    }

    pub fn keep_frames(mut self, keep: bool) -> Self {
        self.keep_frames = keep;
        self
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn frame_path(&self) -> PathBuf {
        if self.keep_frames {
            self.out_dir
                .join(format!("frame-{:05}.png", self.frames_written + 1))
        } else {
            self.out_dir.join("frame.png")
        }
    }
}

impl Display for TerminalDisplay {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        let path = self.frame_path();
        frame
            .image
            .save(&path)
            .with_context(|| format!("failed to write frame: {}", path.display()))?;
        self.frames_written += 1;
        debug!(
            "page {}/{} word {} -> {}",
            frame.cursor.page + 1,
            frame.page_count,
            frame.cursor.word,
            path.display()
        );
        println!("English: {}", frame.phrase);
        if !frame.translation.is_empty() {
            println!("{}: {}", self.lang, frame.translation);
        }
        Ok(())
    }

    fn status_changed(&mut self, status: ReaderStatus, _cursor: ReadingCursor) -> Result<()> {
        if status == ReaderStatus::Idle {
            println!("Waiting for reading to start...");
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        println!("Reset complete.");
        Ok(())
    }

    fn complete(&mut self) -> Result<()> {
        println!("Reading complete!");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Command(Command),
    Help,
}

/// Parses one stdin line. Option commands are applied on top of `current`
/// and bounds-checked before they become a `Configure`.
pub fn parse_console_line(line: &str, current: &ReaderOptions) -> Result<Option<ConsoleInput>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let (name, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (trimmed, ""),
    };
    let command = match name {
        "/start" => Command::Start,
        "/pause" | "/resume" => Command::TogglePause,
        "/reset" => Command::Reset,
        "/quit" | "/exit" => Command::Quit,
        "/help" => return Ok(Some(ConsoleInput::Help)),
        "/words" => configure(current, OptionsPatch {
            words: Some(parse_arg(name, arg)?),
            ..OptionsPatch::default()
        })?,
        "/speed" => configure(current, OptionsPatch {
            speed: Some(parse_arg(name, arg)?),
            ..OptionsPatch::default()
        })?,
        "/color" => configure(current, OptionsPatch {
            color: Some(arg.to_string()),
            ..OptionsPatch::default()
        })?,
        "/transparency" => configure(current, OptionsPatch {
            transparency: Some(parse_arg(name, arg)?),
            ..OptionsPatch::default()
        })?,
        "/translate" => configure(current, OptionsPatch {
            translate: Some(parse_toggle(arg, current.translate)?),
            ..OptionsPatch::default()
        })?,
        _ => return Err(anyhow!("unknown command: {}", trimmed)),
    };
    Ok(Some(ConsoleInput::Command(command)))
}

fn configure(current: &ReaderOptions, patch: OptionsPatch) -> Result<Command> {
    let next = current.apply(&patch)?;
    next.validate()?;
    Ok(Command::Configure(next))
}

fn parse_arg<T: std::str::FromStr>(name: &str, arg: &str) -> Result<T> {
    arg.parse::<T>()
        .map_err(|_| anyhow!("{} expects a number (got '{}')", name, arg))
}

fn parse_toggle(arg: &str, current: bool) -> Result<bool> {
    let value = arg.trim();
    if value.is_empty() {
        return Ok(!current);
    }
    match value.to_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(anyhow!("expected on/off/true/false/1/0")),
    }
}

pub fn print_help() {
    println!("Commands:");
    println!("  /start                Start reading (restarts after completion)");
    println!("  /pause, /resume       Toggle pause");
    println!("  /reset                Back to the first page");
    println!("  /words <3-10>         Words per highlight");
    println!("  /speed <0.2-2.0>      Seconds between highlights");
    println!("  /color <#RRGGBB>      Highlight color");
    println!("  /transparency <10-160> Highlight alpha");
    println!("  /translate [on|off]   Toggle translation");
    println!("  /quit, /exit          Stop and exit");
}

/// Forwards stdin slash commands to the reader until `/quit` or EOF.
pub fn spawn_stdin_commands(commands: UnboundedSender<Command>, options: ReaderOptions) {
    tokio::spawn(async move {
        let mut current = options;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("Type /help to see available commands.");
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_console_line(&line, &current) {
                Ok(None) => {}
                Ok(Some(ConsoleInput::Help)) => print_help(),
                Ok(Some(ConsoleInput::Command(command))) => {
                    if let Command::Configure(next) = &command {
                        current = *next;
                    }
                    let quit = command == Command::Quit;
                    if commands.send(command).is_err() || quit {
                        break;
                    }
                }
                Err(err) => eprintln!("{}", err),
            }
        }
        debug!("stdin command reader finished");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::HighlightColor;
    use image::{Rgba, RgbaImage};

    fn frame(phrase: &str, translation: &str) -> Frame {
        Frame {
            cursor: ReadingCursor::default(),
            page_count: 1,
            phrase: phrase.to_string(),
            translation: translation.to_string(),
            image: RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255])),
        }
    }

    #[test]
    fn control_commands_parse() {
        let options = ReaderOptions::default();
        assert_eq!(
            parse_console_line("/start", &options).unwrap(),
            Some(ConsoleInput::Command(Command::Start))
        );
        assert_eq!(
            parse_console_line("  /pause ", &options).unwrap(),
            Some(ConsoleInput::Command(Command::TogglePause))
        );
        assert_eq!(
            parse_console_line("/help", &options).unwrap(),
            Some(ConsoleInput::Help)
        );
        assert_eq!(parse_console_line("", &options).unwrap(), None);
        assert!(parse_console_line("/jump", &options).is_err());
    }

    #[test]
    fn option_commands_are_bounded() {
        let options = ReaderOptions::default();
        let Some(ConsoleInput::Command(Command::Configure(next))) =
            parse_console_line("/color #00ff00", &options).unwrap()
        else {
            panic!("expected configure");
        };
        assert_eq!(next.style.color, HighlightColor::new(0, 255, 0));
        assert_eq!(next.chunk_size, options.chunk_size);

        assert!(parse_console_line("/words 12", &options).is_err());
        assert!(parse_console_line("/words many", &options).is_err());
        assert!(parse_console_line("/speed 0.1", &options).is_err());

        let Some(ConsoleInput::Command(Command::Configure(toggled))) =
            parse_console_line("/translate", &options).unwrap()
        else {
            panic!("expected configure");
        };
        assert!(!toggled.translate);
    }

    #[test]
    fn frames_overwrite_or_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let mut display = TerminalDisplay::new(dir.path().join("out"), "hi").unwrap();
        display.show(&frame("The quick", "")).unwrap();
        display.show(&frame("brown fox", "")).unwrap();
        assert!(display.out_dir().join("frame.png").exists());
        assert!(!display.out_dir().join("frame-00001.png").exists());

        let mut keeping = TerminalDisplay::new(dir.path().join("kept"), "hi")
            .unwrap()
            .keep_frames(true);
        keeping.show(&frame("The quick", "x")).unwrap();
        keeping.show(&frame("brown fox", "y")).unwrap();
        assert!(keeping.out_dir().join("frame-00001.png").exists());
        assert!(keeping.out_dir().join("frame-00002.png").exists());
    }
}
