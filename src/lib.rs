pub mod ansi;
pub mod book;
pub mod bookmark;
pub mod error;
pub mod event_source;
pub mod hyperlink;
pub mod markup;
pub mod notification;
pub mod pager;
pub mod panic_handler;
pub mod reflow;
pub mod session;
pub mod settings;
pub mod sgr;
pub mod viewer;
pub mod wrap;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ReaderError, Result};
pub use pager::{Pager, RenderLimit, SourceOpener, Viewport};
pub use reflow::{Advance, DocumentItem};
pub use session::{CursorMove, ExternalOpener, LinkOutcome, ReaderSession, ReadingPosition};
pub use viewer::{BookContext, Viewer, run_viewer};
pub use wrap::wrap;
