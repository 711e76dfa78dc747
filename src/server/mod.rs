mod handlers;
mod models;
mod state;

pub use handlers::run_server;
pub use state::ServerDisplay;

use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::UnboundedSender;

use crate::reader::{Command, ReaderOptions};

/// Shared handle between the HTTP handlers and the reader's display.
#[derive(Clone)]
pub struct ServerHandle {
    state: state::ServerState,
}

impl ServerHandle {
    pub fn new(
        options: ReaderOptions,
        page_count: usize,
        commands: UnboundedSender<Command>,
    ) -> Self {
        Self {
            state: state::ServerState {
                snapshot: Arc::new(RwLock::new(state::Snapshot::new(options, page_count))),
                commands,
            },
        }
    }

    pub fn display(&self) -> ServerDisplay {
        ServerDisplay::new(self.state.snapshot.clone())
    }
}
