//! The reading session: cursor, current page and transient status on top of
//! a [`Pager`], plus hyperlink activation.

use std::time::Duration;

use log::{info, warn};

use crate::error::Result;
use crate::hyperlink::resolve_reference;
use crate::notification::Notification;
use crate::pager::{Pager, RenderLimit, Viewport};

const DEFAULT_STATUS_DURATION: Duration = Duration::from_secs(5);

/// Hands a non-item reference to something outside the reader.
pub trait ExternalOpener {
    fn open_external(&mut self, reference: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMove {
    By(isize),
    To(usize),
}

/// What activating the link on the cursor line did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    NoLink,
    Navigated(usize),
    OpenedExternally(String),
    Failed(String),
}

/// Where the reader is, in terms that survive a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingPosition {
    pub item: String,
    pub item_index: usize,
    pub cursor: usize,
}

pub struct ReaderSession {
    pager: Pager,
    external: Box<dyn ExternalOpener>,
    cursor: usize,
    page: usize,
    status: Option<Notification>,
    status_duration: Duration,
}

impl ReaderSession {
    pub fn new(pager: Pager, external: Box<dyn ExternalOpener>) -> Self {
        Self {
            pager,
            external,
            cursor: 0,
            page: 0,
            status: None,
            status_duration: DEFAULT_STATUS_DURATION,
        }
    }

    pub fn with_status_duration(mut self, duration: Duration) -> Self {
        self.status_duration = duration;
        self
    }

    /// Opens item `index` afresh (also when it is already active), renders
    /// enough to show `cursor` and places the cursor there, clamped to the
    /// item.
    pub fn open_at(&mut self, index: usize, cursor: usize) -> Result<()> {
        self.pager.switch_to(index)?;
        self.cursor = 0;
        self.page = 0;
        self.place_cursor(cursor)
    }

    /// Applies a new viewport, re-rendering around the cursor if it changed.
    pub fn set_viewport(&mut self, width: usize, height: usize) -> Result<()> {
        if self.pager.set_viewport(Viewport::new(width, height)) {
            let height = self.pager.viewport().height;
            self.pager.rerender(self.cursor.saturating_add(height))?;
        }
        self.place_cursor(self.cursor)
    }

    pub fn viewport(&self) -> Viewport {
        self.pager.viewport()
    }

    pub fn ensure_rendered(&mut self, limit: RenderLimit) -> Result<usize> {
        let produced = self.pager.ensure_rendered(limit)?;
        self.sync_page();
        Ok(produced)
    }

    /// Moves the cursor, prefetching a page beyond the target first so the
    /// move can land on lines not produced yet.
    pub fn move_cursor(&mut self, movement: CursorMove) -> Result<()> {
        let target = match movement {
            CursorMove::By(delta) => self.cursor.saturating_add_signed(delta),
            CursorMove::To(line) => line,
        };
        self.place_cursor(target)
    }

    pub fn next_page(&mut self) -> Result<()> {
        let next = self
            .pager
            .page_start(self.page)
            .saturating_add(self.pager.viewport().height);
        self.place_cursor(next)
    }

    pub fn prev_page(&mut self) -> Result<()> {
        let target = match self.page {
            0 => 0,
            page => self.pager.page_start(page - 1),
        };
        self.place_cursor(target)
    }

    pub fn jump_to_start(&mut self) -> Result<()> {
        self.place_cursor(0)
    }

    /// Drains the item and puts the cursor on its last line.
    pub fn jump_to_end(&mut self) -> Result<()> {
        self.pager.ensure_rendered(RenderLimit::Unbounded)?;
        self.cursor = self.pager.total_lines().saturating_sub(1);
        self.sync_page();
        Ok(())
    }

    /// Returns `false` when already on the last item.
    pub fn next_item(&mut self) -> Result<bool> {
        let next = self.pager.active_index() + 1;
        if next >= self.pager.item_count() {
            return Ok(false);
        }
        self.open_at(next, 0)?;
        Ok(true)
    }

    /// Returns `false` when already on the first item.
    pub fn prev_item(&mut self) -> Result<bool> {
        match self.pager.active_index().checked_sub(1) {
            Some(previous) => {
                self.open_at(previous, 0)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Rebuilds the active item from its markup, keeping the cursor.
    pub fn reload(&mut self) -> Result<()> {
        let height = self.pager.viewport().height;
        self.pager.rerender(self.cursor.saturating_add(height))?;
        self.clamp_cursor();
        Ok(())
    }

    /// Follows the hyperlink on the cursor line.
    ///
    /// References naming a known item switch to it with the cursor at 0;
    /// anything else goes to the external opener. Failures become a status
    /// message and never propagate.
    pub fn activate_link_at_cursor(&mut self) -> LinkOutcome {
        let Some(target) = self.pager.link_at(self.cursor) else {
            return LinkOutcome::NoLink;
        };
        let reference = resolve_reference(self.pager.active_path(), target);

        if let Some(index) = self.pager.find_item(&reference) {
            info!("Following link to {reference}");
            return match self.open_at(index, 0) {
                Ok(()) => LinkOutcome::Navigated(index),
                Err(e) => {
                    warn!("Cannot follow link to {reference}: {e}");
                    self.report_failure(&reference)
                }
            };
        }

        match self.external.open_external(&reference) {
            Ok(()) => {
                info!("Opened {reference} externally");
                LinkOutcome::OpenedExternally(reference)
            }
            Err(e) => {
                warn!("External open of {reference} failed: {e:#}");
                self.report_failure(&reference)
            }
        }
    }

    /// Lines of the current page.
    pub fn page_lines(&self) -> &[String] {
        self.pager.page(self.page).unwrap_or_default()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Cursor row within the current page.
    pub fn cursor_row(&self) -> usize {
        self.cursor.saturating_sub(self.pager.page_start(self.page))
    }

    pub fn page_index(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        self.pager.page_count()
    }

    pub fn total_lines(&self) -> usize {
        self.pager.total_lines()
    }

    pub fn is_exhausted(&self) -> bool {
        self.pager.is_exhausted()
    }

    pub fn link_at_cursor(&self) -> Option<&str> {
        self.pager.link_at(self.cursor)
    }

    pub fn active_index(&self) -> usize {
        self.pager.active_index()
    }

    pub fn active_path(&self) -> &str {
        self.pager.active_path()
    }

    pub fn item_count(&self) -> usize {
        self.pager.item_count()
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    /// The transient status message, if one is set and not yet expired.
    pub fn status(&self) -> Option<&Notification> {
        self.status.as_ref().filter(|n| !n.is_expired())
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.status = Some(Notification::info(message, self.status_duration));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.status = Some(Notification::warning(message, self.status_duration));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.status = Some(Notification::error(message, self.status_duration));
    }

    pub fn dismiss_status(&mut self) {
        self.status = None;
    }

    pub fn position(&self) -> ReadingPosition {
        ReadingPosition {
            item: self.pager.active_path().to_string(),
            item_index: self.pager.active_index(),
            cursor: self.cursor,
        }
    }

    fn report_failure(&mut self, reference: &str) -> LinkOutcome {
        self.error(format!("Cannot open {reference}"));
        LinkOutcome::Failed(reference.to_string())
    }

    fn place_cursor(&mut self, target: usize) -> Result<()> {
        let height = self.pager.viewport().height;
        let wanted = target.saturating_add(height);
        let total = self.pager.total_lines();
        if wanted >= total && !self.pager.is_exhausted() {
            self.pager
                .ensure_rendered(RenderLimit::Lines((wanted - total).saturating_add(1)))?;
        }
        self.cursor = target;
        self.clamp_cursor();
        Ok(())
    }

    fn clamp_cursor(&mut self) {
        self.cursor = self.cursor.min(self.pager.total_lines().saturating_sub(1));
        self.sync_page();
    }

    fn sync_page(&mut self) {
        self.page = self.pager.page_of(self.cursor);
    }
}
