use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc::UnboundedSender;

use crate::cursor::ReadingCursor;
use crate::reader::{Command, Display, Frame, ReaderOptions, ReaderStatus};

/// What the HTTP surface knows about the reader. Only the driver (through
/// [`ServerDisplay`]) and the `/settings` handler write it.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub(crate) status: ReaderStatus,
    pub(crate) cursor: ReadingCursor,
    pub(crate) page_count: usize,
    pub(crate) phrase: String,
    pub(crate) translation: String,
    pub(crate) options: ReaderOptions,
    pub(crate) frame_png: Option<Arc<Vec<u8>>>,
}

impl Snapshot {
    pub(crate) fn new(options: ReaderOptions, page_count: usize) -> Self {
        Self {
            status: ReaderStatus::Idle,
            cursor: ReadingCursor::default(),
            page_count,
            phrase: String::new(),
            translation: String::new(),
            options,
            frame_png: None,
        }
    }
}

pub(crate) type SharedSnapshot = Arc<RwLock<Snapshot>>;

pub(crate) fn read(snapshot: &SharedSnapshot) -> RwLockReadGuard<'_, Snapshot> {
    snapshot.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn write(snapshot: &SharedSnapshot) -> RwLockWriteGuard<'_, Snapshot> {
    snapshot.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) snapshot: SharedSnapshot,
    pub(crate) commands: UnboundedSender<Command>,
}

/// Publishes frames into the shared snapshot.
pub struct ServerDisplay {
    snapshot: SharedSnapshot,
}

impl ServerDisplay {
    pub(crate) fn new(snapshot: SharedSnapshot) -> Self {
        Self { snapshot }
    }
}

impl Display for ServerDisplay {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        let png = encode_png(&frame.image)?;
        let mut snapshot = write(&self.snapshot);
        snapshot.cursor = frame.cursor;
        snapshot.page_count = frame.page_count;
        snapshot.phrase = frame.phrase.clone();
        snapshot.translation = frame.translation.clone();
        snapshot.frame_png = Some(Arc::new(png));
        Ok(())
    }

    fn status_changed(&mut self, status: ReaderStatus, cursor: ReadingCursor) -> Result<()> {
        let mut snapshot = write(&self.snapshot);
        snapshot.status = status;
        snapshot.cursor = cursor;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let mut snapshot = write(&self.snapshot);
        snapshot.phrase.clear();
        snapshot.translation.clear();
        snapshot.frame_png = None;
        Ok(())
    }

    fn complete(&mut self) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .with_context(|| "failed to encode frame as png")?;
    Ok(bytes)
}
