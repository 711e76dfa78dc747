//! The reading driver: owns the cursor and walks the document one chunk per
//! cycle, handing each composite and its translation to a [`Display`].

use anyhow::{Result, anyhow};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info};

use crate::cursor::ReadingCursor;
use crate::document::PageSource;
use crate::style::{HighlightColor, HighlightStyle};
use crate::translator::{Translation, TranslationCache};
use crate::walker;

pub const MIN_CHUNK: usize = 3;
pub const MAX_CHUNK: usize = 10;
pub const MIN_INTERVAL_SECS: f32 = 0.2;
pub const MAX_INTERVAL_SECS: f32 = 2.0;
pub const MIN_ALPHA: u8 = 10;
pub const MAX_ALPHA: u8 = 160;

const PAUSE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReaderOptions {
    pub chunk_size: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub interval: Duration,
    pub style: HighlightStyle,
    pub translate: bool,
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f32(value.as_secs_f32())
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            chunk_size: 4,
            interval: Duration::from_secs(1),
            style: HighlightStyle::default(),
            translate: true,
        }
    }
}

impl ReaderOptions {
    /// Checks the user-facing bounds. The driver itself accepts any chunk of
    /// at least one word and any interval.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CHUNK..=MAX_CHUNK).contains(&self.chunk_size) {
            return Err(anyhow!(
                "words per highlight must be between {} and {} (got {})",
                MIN_CHUNK,
                MAX_CHUNK,
                self.chunk_size
            ));
        }
        let secs = self.interval.as_secs_f32();
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&secs) {
            return Err(anyhow!(
                "speed must be between {} and {} seconds (got {})",
                MIN_INTERVAL_SECS,
                MAX_INTERVAL_SECS,
                secs
            ));
        }
        if !(MIN_ALPHA..=MAX_ALPHA).contains(&self.style.alpha) {
            return Err(anyhow!(
                "transparency must be between {} and {} (got {})",
                MIN_ALPHA,
                MAX_ALPHA,
                self.style.alpha
            ));
        }
        Ok(())
    }

    pub fn apply(&self, patch: &OptionsPatch) -> Result<Self> {
        let mut next = *self;
        if let Some(words) = patch.words {
            next.chunk_size = words;
        }
        if let Some(speed) = patch.speed {
            next.interval = interval_from_secs(speed)?;
        }
        if let Some(color) = patch.color.as_deref() {
            next.style.color = color.parse::<HighlightColor>()?;
        }
        if let Some(transparency) = patch.transparency {
            next.style.alpha = transparency;
        }
        if let Some(translate) = patch.translate {
            next.translate = translate;
        }
        Ok(next)
    }
}

pub fn interval_from_secs(secs: f32) -> Result<Duration> {
    Duration::try_from_secs_f32(secs).map_err(|_| anyhow!("invalid speed: {}", secs))
}

/// Partial option update, as sent by the control surfaces.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OptionsPatch {
    pub words: Option<usize>,
    pub speed: Option<f32>,
    pub color: Option<String>,
    pub transparency: Option<u8>,
    pub translate: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    TogglePause,
    Reset,
    Configure(ReaderOptions),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderStatus {
    Idle,
    Running,
    Paused,
    Complete,
}

/// One rendered cycle.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position of the highlighted chunk (before advancing).
    pub cursor: ReadingCursor,
    pub page_count: usize,
    pub phrase: String,
    /// Already resolved against the placeholder; empty when untranslated.
    pub translation: String,
    pub image: RgbaImage,
}

/// Where frames and state changes go.
pub trait Display {
    fn show(&mut self, frame: &Frame) -> Result<()>;
    fn status_changed(&mut self, _status: ReaderStatus, _cursor: ReadingCursor) -> Result<()> {
        Ok(())
    }
    fn clear(&mut self) -> Result<()>;
    fn complete(&mut self) -> Result<()>;
}

pub struct Reader<S: PageSource, D: Display> {
    source: S,
    display: D,
    translations: TranslationCache,
    placeholder: String,
    options: ReaderOptions,
    cursor: ReadingCursor,
    status: ReaderStatus,
    commands: UnboundedReceiver<Command>,
    commands_closed: bool,
    exit_on_complete: bool,
}

impl<S: PageSource, D: Display> Reader<S, D> {
    pub fn new(
        source: S,
        display: D,
        translations: TranslationCache,
        options: ReaderOptions,
        commands: UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            source,
            display,
            translations,
            placeholder: crate::settings::DEFAULT_PLACEHOLDER.to_string(),
            options,
            cursor: ReadingCursor::default(),
            status: ReaderStatus::Idle,
            commands,
            commands_closed: false,
            exit_on_complete: false,
        }
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    /// Return from [`Reader::run`] as soon as the document is finished.
    pub fn exit_on_complete(mut self, exit: bool) -> Self {
        self.exit_on_complete = exit;
        self
    }

    pub fn status(&self) -> ReaderStatus {
        self.status
    }

    pub fn cursor(&self) -> ReadingCursor {
        self.cursor
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn into_display(self) -> D {
        self.display
    }

    pub async fn run(&mut self) -> Result<()> {
        if !self.drain_commands()? {
            return Ok(());
        }
        // Only announce waiting when nothing already started the reader.
        if self.status == ReaderStatus::Idle {
            self.display.status_changed(self.status, self.cursor)?;
        }
        loop {
            if !self.drain_commands()? {
                return Ok(());
            }
            match self.status {
                ReaderStatus::Idle | ReaderStatus::Complete => {
                    if self.status == ReaderStatus::Complete && self.exit_on_complete {
                        return Ok(());
                    }
                    if self.commands_closed {
                        return Ok(());
                    }
                    match self.commands.recv().await {
                        Some(command) => {
                            if !self.handle(command)? {
                                return Ok(());
                            }
                        }
                        None => return Ok(()),
                    }
                }
                ReaderStatus::Paused => {
                    if self.commands_closed {
                        return Ok(());
                    }
                    tokio::time::sleep(PAUSE_POLL).await;
                }
                ReaderStatus::Running => self.step().await?,
            }
        }
    }

    /// Runs one cycle while `Running`. Returns without sleeping when the page
    /// was skipped or the document is finished.
    pub async fn step(&mut self) -> Result<()> {
        let page_count = self.source.page_count();
        if self.cursor.is_finished(page_count) {
            info!("reading complete after {} page(s)", page_count);
            self.set_status(ReaderStatus::Complete)?;
            return self.display.complete();
        }

        let position = self.cursor;
        let chunk_size = self.options.chunk_size.max(1);
        let Some(highlight) = walker::highlight(
            &self.source,
            position.page,
            position.word,
            chunk_size,
            &self.options.style,
        )?
        else {
            debug!("page {} has no words, skipping", position.page + 1);
            self.cursor.skip_page();
            return Ok(());
        };

        let translation = if self.options.translate {
            self.translations.lookup(&highlight.phrase).await
        } else {
            Translation::Disabled
        };

        let frame = Frame {
            cursor: position,
            page_count,
            translation: translation.display_text(&self.placeholder).to_string(),
            phrase: highlight.phrase,
            image: highlight.image,
        };
        self.display.show(&frame)?;

        self.cursor.advance(chunk_size, highlight.token_count);
        tokio::time::sleep(self.options.interval).await;
        Ok(())
    }

    /// Applies everything queued so far. `Ok(false)` means quit.
    fn drain_commands(&mut self) -> Result<bool> {
        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    if !self.handle(command)? {
                        return Ok(false);
                    }
                }
                Err(TryRecvError::Empty) => return Ok(true),
                Err(TryRecvError::Disconnected) => {
                    self.commands_closed = true;
                    return Ok(true);
                }
            }
        }
    }

    pub fn handle(&mut self, command: Command) -> Result<bool> {
        debug!("command {:?} while {:?}", command, self.status);
        match command {
            Command::Start => {
                if self.status == ReaderStatus::Complete {
                    self.cursor.reset();
                }
                self.set_status(ReaderStatus::Running)?;
            }
            Command::TogglePause => match self.status {
                ReaderStatus::Running => self.set_status(ReaderStatus::Paused)?,
                ReaderStatus::Paused => self.set_status(ReaderStatus::Running)?,
                ReaderStatus::Idle | ReaderStatus::Complete => {}
            },
            Command::Reset => {
                self.cursor.reset();
                self.display.clear()?;
                self.set_status(ReaderStatus::Idle)?;
            }
            Command::Configure(options) => {
                info!(
                    "options updated: {} words, {:.1}s, {} at {}",
                    options.chunk_size,
                    options.interval.as_secs_f32(),
                    options.style.color,
                    options.style.alpha
                );
                self.options = options;
            }
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn set_status(&mut self, status: ReaderStatus) -> Result<()> {
        self.status = status;
        self.display.status_changed(status, self.cursor)
    }
}
