//! Persistence of the sync cursor.
//!
//! The cursor is the only state that survives between runs. Reconcilers
//! hand every new value to a [`CursorStore`] as soon as the remote issues
//! it, so a crash mid-cycle loses as little as possible.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("Failed to persist sync cursor: {0}")]
pub struct CursorError(pub String);

pub trait CursorStore: Send {
    /// Last persisted cursor, `None` before the first sync.
    fn cursor(&self) -> Option<String>;

    /// Record and persist a new cursor.
    fn advance(&mut self, cursor: String) -> Result<(), CursorError>;
}

/// Cursor kept in memory only.
#[derive(Debug, Clone, Default)]
pub struct MemoryCursor {
    cursor: Option<String>,
    /// Every value passed to `advance`, oldest first
    pub history: Vec<String>,
}

impl MemoryCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(cursor: impl Into<String>) -> Self {
        Self {
            cursor: Some(cursor.into()),
            history: Vec::new(),
        }
    }
}

impl CursorStore for MemoryCursor {
    fn cursor(&self) -> Option<String> {
        self.cursor.clone()
    }

    fn advance(&mut self, cursor: String) -> Result<(), CursorError> {
        self.history.push(cursor.clone());
        self.cursor = Some(cursor);
        Ok(())
    }
}
