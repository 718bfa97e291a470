//! Teletext pages: the in-memory model, the shared page list and the
//! per-magazine selection queues, plus the TTI file loader.

pub mod handle;
pub mod list;
pub mod model;
pub mod queues;
pub mod tti;

use std::path::PathBuf;

use thiserror::Error;

pub use handle::{LockAttempt, PageCell, PageHandle, QueueTag};
pub use list::PageList;
pub use model::{CycleMode, EnhancementLine, Page, PageKind, Subpage};
pub use queues::{MagazineQueues, Selection};
pub use tti::{PageDirectory, RefreshSummary};

#[derive(Debug, Error)]
pub enum PageError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Line {line}: invalid {field} {value:?}")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("No page number (PN) in page file")]
    MissingPageNumber,
}
