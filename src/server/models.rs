use serde::{Deserialize, Serialize};

use crate::cursor::ReadingCursor;
use crate::reader::{ReaderOptions, ReaderStatus};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct StateQuery {
    pub(crate) with_frame: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StateResponse {
    pub(crate) status: ReaderStatus,
    pub(crate) cursor: ReadingCursor,
    pub(crate) page_count: usize,
    pub(crate) phrase: String,
    pub(crate) translation: String,
    pub(crate) options: ReaderOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) frame_base64: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AcceptedResponse {
    pub(crate) accepted: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SettingsResponse {
    pub(crate) options: ReaderOptions,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
