//! Incremental pagination of the active document item.
//!
//! The [`Pager`] pulls paragraphs from the active [`DocumentItem`], wraps them
//! at the viewport width and appends the lines to height-bounded pages. Only
//! the last page is ever extended; closed pages and their `PageLen` entries
//! never change until the next full re-render.

use std::time::Instant;

use log::{debug, info, warn};

use crate::error::{ReaderError, Result};
use crate::hyperlink::{HyperlinkTable, extract_link};
use crate::markup::TokenSource;
use crate::reflow::{Advance, DocumentItem};
use crate::wrap::wrap;

/// Opens the markup token stream of a document item by reference path.
pub trait SourceOpener {
    fn open_source(&mut self, path: &str) -> Result<Box<dyn TokenSource>>;
}

/// How much [`Pager::ensure_rendered`] should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderLimit {
    /// Stop once at least this many new lines exist.
    Lines(usize),
    /// Drain the item to the end.
    Unbounded,
}

/// Display size in character cells available for page text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: usize,
    pub height: usize,
}

impl Viewport {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

pub struct Pager {
    items: Vec<DocumentItem>,
    active: usize,
    opener: Box<dyn SourceOpener>,
    viewport: Viewport,
    pages: Vec<Vec<String>>,
    page_len: Vec<usize>,
    links: HyperlinkTable,
}

impl Pager {
    /// Creates a pager over `paths` (reading order). Nothing is opened yet.
    pub fn new(
        paths: Vec<String>,
        opener: Box<dyn SourceOpener>,
        viewport: Viewport,
    ) -> Result<Self> {
        if paths.is_empty() {
            return Err(ReaderError::NoItems);
        }
        Ok(Self {
            items: paths.into_iter().map(DocumentItem::new).collect(),
            active: 0,
            opener,
            viewport,
            pages: Vec::new(),
            page_len: Vec::new(),
            links: HyperlinkTable::new(),
        })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Records a new viewport. Returns `true` when it differs from the old
    /// one; existing pages are stale until [`Pager::rerender`] runs.
    pub fn set_viewport(&mut self, viewport: Viewport) -> bool {
        let changed = self.viewport != viewport;
        self.viewport = viewport;
        changed
    }

    /// Pulls paragraphs until `limit` new lines exist or the item runs out.
    /// Returns the number of lines added.
    pub fn ensure_rendered(&mut self, limit: RenderLimit) -> Result<usize> {
        let started = Instant::now();
        self.ensure_open()?;

        let width = self.viewport.width;
        let mut produced = 0usize;
        loop {
            if let RenderLimit::Lines(max) = limit {
                if produced >= max {
                    break;
                }
            }
            let item = &mut self.items[self.active];
            let paragraph = match item.advance() {
                Advance::Completed(index) => item.paragraph(index).unwrap_or_default().to_string(),
                Advance::Exhausted => break,
            };
            for line in wrap(&paragraph, width) {
                self.push_line(&line);
                produced += 1;
            }
        }

        debug!(
            "{:.6}: rendered {produced} lines of {} ({} total, {} pages, {}x{})",
            started.elapsed().as_secs_f64(),
            self.active_path(),
            self.total_lines(),
            self.pages.len(),
            self.viewport.width,
            self.viewport.height,
        );
        Ok(produced)
    }

    /// Drops every page, reopens the active item from its first paragraph
    /// and renders at least `min_lines` lines.
    pub fn rerender(&mut self, min_lines: usize) -> Result<()> {
        self.items[self.active].close();
        self.clear_pages();
        self.ensure_rendered(RenderLimit::Lines(min_lines))?;
        Ok(())
    }

    /// Makes `index` the active item with a freshly opened token stream and
    /// no pages.
    ///
    /// The current item's source is closed first. If the new source cannot be
    /// opened, the previous item is rebuilt to the line count it had and the
    /// error is returned.
    pub fn switch_to(&mut self, index: usize) -> Result<()> {
        if index >= self.items.len() {
            return Err(ReaderError::ItemOutOfRange {
                index,
                count: self.items.len(),
            });
        }
        let previous_lines = self.total_lines();
        self.items[self.active].close();

        match self.opener.open_source(self.items[index].path()) {
            Ok(source) => {
                info!(
                    "Switching from {} to {}",
                    self.items[self.active].path(),
                    self.items[index].path()
                );
                self.clear_pages();
                self.active = index;
                self.items[index].open(source);
                Ok(())
            }
            Err(e) => {
                warn!("Cannot switch to {}: {e}", self.items[index].path());
                self.clear_pages();
                if let Err(restore) = self.ensure_rendered(RenderLimit::Lines(previous_lines)) {
                    warn!("Failed to restore {}: {restore}", self.active_path());
                }
                Err(e)
            }
        }
    }

    /// Page containing line `cursor`: the number of `PageLen` entries that
    /// are `<= cursor`, clamped to the last page.
    pub fn page_of(&self, cursor: usize) -> usize {
        let index = self.page_len.partition_point(|&len| len <= cursor);
        index.min(self.pages.len().saturating_sub(1))
    }

    /// Index of the first line of `page`.
    pub fn page_start(&self, page: usize) -> usize {
        match page {
            0 => 0,
            _ => self.page_len.get(page - 1).copied().unwrap_or_else(|| self.total_lines()),
        }
    }

    pub fn page(&self, index: usize) -> Option<&[String]> {
        self.pages.get(index).map(Vec::as_slice)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Cumulative line counts, one entry per page.
    pub fn page_len(&self) -> &[usize] {
        &self.page_len
    }

    pub fn total_lines(&self) -> usize {
        self.page_len.last().copied().unwrap_or(0)
    }

    /// A display line by global index.
    pub fn line(&self, index: usize) -> Option<&str> {
        let page = self.page_of(index);
        let offset = index.checked_sub(self.page_start(page))?;
        self.pages.get(page)?.get(offset).map(String::as_str)
    }

    pub fn link_at(&self, line: usize) -> Option<&str> {
        self.links.get(line)
    }

    pub fn links(&self) -> &HyperlinkTable {
        &self.links
    }

    /// Whether the active item has delivered its last paragraph.
    pub fn is_exhausted(&self) -> bool {
        self.items[self.active].is_exhausted()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_path(&self) -> &str {
        self.items[self.active].path()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Index of the item whose reference equals `path` exactly.
    pub fn find_item(&self, path: &str) -> Option<usize> {
        self.items.iter().position(|item| item.path() == path)
    }

    fn ensure_open(&mut self) -> Result<()> {
        let item = &mut self.items[self.active];
        if item.is_open() {
            return Ok(());
        }
        let source = self.opener.open_source(item.path())?;
        item.open(source);
        // the item restarts at paragraph 0, so nothing rendered so far is valid
        self.clear_pages();
        Ok(())
    }

    fn push_line(&mut self, line: &str) {
        let index = self.total_lines();
        let (line, target) = extract_link(line);
        if let Some(target) = target {
            self.links.record(index, &target);
        }
        match self.pages.last_mut() {
            Some(page) if page.len() < self.viewport.height => {
                page.push(line);
                if let Some(len) = self.page_len.last_mut() {
                    *len += 1;
                }
            }
            _ => {
                self.pages.push(vec![line]);
                self.page_len.push(index + 1);
            }
        }
    }

    fn clear_pages(&mut self) {
        self.pages.clear();
        self.page_len.clear();
        self.links.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::XmlTokenSource;
    use std::collections::HashMap;

    struct MapOpener {
        docs: HashMap<String, String>,
    }

    impl SourceOpener for MapOpener {
        fn open_source(&mut self, path: &str) -> Result<Box<dyn TokenSource>> {
            match self.docs.get(path) {
                Some(xml) => Ok(Box::new(XmlTokenSource::from_bytes(xml.clone().into_bytes()))),
                None => Err(ReaderError::unavailable(path, "missing")),
            }
        }
    }

    fn numbered(count: usize) -> String {
        (1..=count).map(|i| format!("<p>line {i}</p>")).collect()
    }

    fn pager(docs: &[(&str, String)], width: usize, height: usize) -> Pager {
        let opener = MapOpener {
            docs: docs
                .iter()
                .map(|(path, xml)| (path.to_string(), xml.clone()))
                .collect(),
        };
        Pager::new(
            docs.iter().map(|(path, _)| path.to_string()).collect(),
            Box::new(opener),
            Viewport::new(width, height),
        )
        .unwrap()
    }

    #[test]
    fn empty_book_is_rejected() {
        let opener = MapOpener {
            docs: HashMap::new(),
        };
        assert!(matches!(
            Pager::new(Vec::new(), Box::new(opener), Viewport::new(10, 10)),
            Err(ReaderError::NoItems)
        ));
    }

    #[test]
    fn lines_are_split_into_height_bounded_pages() {
        let mut p = pager(&[("ch1.xhtml", numbered(7))], 40, 3);
        p.ensure_rendered(RenderLimit::Unbounded).unwrap();
        assert_eq!(p.total_lines(), 7);
        assert_eq!(p.page_count(), 3);
        assert_eq!(p.page_len(), &[3, 6, 7]);
        assert_eq!(p.page(2).unwrap(), &["line 7".to_string()]);
        assert!(p.is_exhausted());
    }

    #[test]
    fn page_len_is_strictly_increasing_and_ends_at_total() {
        let xml = "<p>The quick brown fox jumps over the lazy dog again and again</p>".repeat(9);
        for height in 1..6 {
            let mut p = pager(&[("ch1.xhtml", xml.clone())], 11, height);
            p.ensure_rendered(RenderLimit::Unbounded).unwrap();
            let lens = p.page_len();
            assert!(lens.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(*lens.last().unwrap(), p.total_lines());
            let concatenated: usize = (0..p.page_count()).map(|i| p.page(i).unwrap().len()).sum();
            assert_eq!(concatenated, p.total_lines());
        }
    }

    #[test]
    fn rendering_stops_after_requested_lines() {
        let mut p = pager(&[("ch1.xhtml", numbered(20))], 40, 4);
        let produced = p.ensure_rendered(RenderLimit::Lines(5)).unwrap();
        assert_eq!(produced, 5);
        assert!(!p.is_exhausted());
        assert_eq!(p.page_len(), &[4, 5]);
    }

    #[test]
    fn extension_only_fills_the_open_page() {
        let mut p = pager(&[("ch1.xhtml", numbered(20))], 40, 4);
        p.ensure_rendered(RenderLimit::Lines(5)).unwrap();
        let first_page = p.page(0).unwrap().to_vec();
        p.ensure_rendered(RenderLimit::Lines(4)).unwrap();
        assert_eq!(p.page(0).unwrap(), first_page.as_slice());
        assert_eq!(p.page_len(), &[4, 8, 9]);
        assert_eq!(p.line(8), Some("line 9"));
    }

    #[test]
    fn cursor_maps_to_page_monotonically() {
        let mut p = pager(&[("ch1.xhtml", numbered(10))], 40, 3);
        p.ensure_rendered(RenderLimit::Unbounded).unwrap();
        let pages: Vec<usize> = (0..=12).map(|c| p.page_of(c)).collect();
        assert_eq!(pages, vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3, 3]);
        assert!(pages.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn page_of_on_empty_pager_is_zero() {
        let p = pager(&[("ch1.xhtml", String::new())], 40, 3);
        assert_eq!(p.page_of(0), 0);
        assert_eq!(p.page_of(5), 0);
    }

    #[test]
    fn rerender_rewraps_at_new_width() {
        let xml = "<p>alpha beta gamma delta</p>".to_string();
        let mut p = pager(&[("ch1.xhtml", xml)], 40, 10);
        p.ensure_rendered(RenderLimit::Unbounded).unwrap();
        assert_eq!(p.total_lines(), 1);

        assert!(p.set_viewport(Viewport::new(11, 10)));
        p.rerender(10).unwrap();
        assert_eq!(p.total_lines(), 2);
        assert_eq!(p.line(0), Some("alpha beta"));
        assert_eq!(p.line(1), Some("gamma delta"));
        assert!(!p.set_viewport(Viewport::new(11, 10)));
    }

    #[test]
    fn links_are_indexed_by_display_line() {
        let xml = r#"<p>one two three</p><p>see <a href="ch2.xhtml#top">chapter two</a></p>"#;
        let mut p = pager(&[("ch1.xhtml", xml.to_string())], 9, 10);
        p.ensure_rendered(RenderLimit::Unbounded).unwrap();
        // "one two" / "three" / "see" / "chapter" / "two"
        assert_eq!(p.total_lines(), 5);
        assert_eq!(p.link_at(3), Some("ch2.xhtml"));
        assert_eq!(p.link_at(2), None);
        assert!(!p.line(3).unwrap().contains('\u{1}'));
    }

    #[test]
    fn switch_to_opens_new_item_without_pages() {
        let mut p = pager(
            &[("ch1.xhtml", numbered(3)), ("ch2.xhtml", numbered(2))],
            40,
            10,
        );
        p.ensure_rendered(RenderLimit::Unbounded).unwrap();
        p.switch_to(1).unwrap();
        assert_eq!(p.active_path(), "ch2.xhtml");
        assert_eq!(p.total_lines(), 0);
        assert!(p.items[p.active].is_open());
        p.ensure_rendered(RenderLimit::Unbounded).unwrap();
        assert_eq!(p.total_lines(), 2);
    }

    #[test]
    fn failed_switch_restores_previous_item() {
        let mut p = pager(&[("ch1.xhtml", numbered(6))], 40, 4);
        p.ensure_rendered(RenderLimit::Lines(5)).unwrap();
        let before = p.page_len().to_vec();

        let missing = p.items.len();
        p.items.push(DocumentItem::new("gone.xhtml"));
        let err = p.switch_to(missing).unwrap_err();
        assert!(matches!(err, ReaderError::SourceUnavailable { .. }));
        assert_eq!(p.active_path(), "ch1.xhtml");
        assert_eq!(p.page_len(), before.as_slice());
        assert_eq!(p.line(0), Some("line 1"));
    }

    #[test]
    fn out_of_range_switch_is_an_error() {
        let mut p = pager(&[("ch1.xhtml", numbered(1))], 40, 4);
        assert!(matches!(
            p.switch_to(3),
            Err(ReaderError::ItemOutOfRange { index: 3, count: 1 })
        ));
    }

    #[test]
    fn only_one_item_is_open_at_a_time() {
        let mut p = pager(
            &[("ch1.xhtml", numbered(3)), ("ch2.xhtml", numbered(3))],
            40,
            10,
        );
        p.ensure_rendered(RenderLimit::Lines(1)).unwrap();
        p.switch_to(1).unwrap();
        let open: Vec<bool> = p.items.iter().map(DocumentItem::is_open).collect();
        assert_eq!(open, vec![false, true]);
    }
}
