//! Command failures and how they map to process exit codes.

use glimmer_core::{Error, RemoteError};
use glimmer_viewer::ViewError;

/// Errors a command can end with.
///
/// "No data" and local failures are kept apart so scripts can tell them
/// apart by exit code.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The remote failed and nothing was cached.
    #[error("UNAVAILABLE: {0}")]
    Unavailable(RemoteError),

    /// Local store or configuration failure.
    #[error(transparent)]
    Core(#[from] Error),

    #[error("VIEW_FAILED: {0}")]
    View(String),

    #[error("OUTPUT: {0}")]
    Output(#[from] serde_json::Error),

    #[error("INTERRUPTED")]
    Interrupted,
}

impl From<ViewError> for CommandError {
    fn from(err: ViewError) -> Self {
        match err {
            ViewError::Cancelled => CommandError::Interrupted,
            ViewError::Unavailable => CommandError::Unavailable(RemoteError::Unavailable),
            ViewError::Source(msg) => CommandError::View(msg),
        }
    }
}

impl CommandError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::Core(_) | CommandError::View(_) | CommandError::Output(_) => 1,
            CommandError::Unavailable(_) => 2,
            CommandError::Interrupted => 130,
        }
    }
}
