//! Terminal front end: draws the current page and maps keys to session
//! operations.

use std::time::Duration;

use anyhow::Result;
use log::{debug, info};
use ratatui::Frame;
use ratatui::Terminal;
use ratatui::backend::Backend;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::ansi;
use crate::bookmark::{ReadingState, SavedPosition};
use crate::event_source::{Event, EventSource, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crate::notification::NotificationLevel;
use crate::session::{CursorMove, LinkOutcome, ReaderSession};

const GUTTER: u16 = 2;
const CURSOR_MARKER: &str = "> ";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What the viewer needs to know about the open book beyond its items.
#[derive(Debug, Clone, Default)]
pub struct BookContext {
    pub title: String,
    pub file_path: String,
    pub is_html: bool,
}

pub struct Viewer {
    session: ReaderSession,
    book: BookContext,
    state: ReadingState,
    margin: u16,
    right_margin: u16,
    text_area: Rect,
    should_quit: bool,
}

impl Viewer {
    pub fn new(session: ReaderSession, book: BookContext, state: ReadingState) -> Self {
        Self {
            session,
            book,
            state,
            margin: 0,
            right_margin: 0,
            text_area: Rect::default(),
            should_quit: false,
        }
    }

    pub fn with_margins(mut self, margin: u16, right_margin: u16) -> Self {
        self.margin = margin;
        self.right_margin = right_margin;
        self
    }

    pub fn session(&self) -> &ReaderSession {
        &self.session
    }

    pub fn state(&self) -> &ReadingState {
        &self.state
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Fits the session to a terminal of `width` x `height` cells.
    pub fn resize(&mut self, width: u16, height: u16) {
        let area = self.text_area_for(Rect::new(0, 0, width, height));
        if area == self.text_area {
            return;
        }
        self.text_area = area;
        let text_width = area.width.saturating_sub(GUTTER).max(1) as usize;
        let text_height = area.height.max(1) as usize;
        debug!("Viewport {text_width}x{text_height}");
        if let Err(e) = self.session.set_viewport(text_width, text_height) {
            self.session.error(e.to_string());
        }
    }

    fn text_area_for(&self, area: Rect) -> Rect {
        let x = area.x + self.margin.min(area.width.saturating_sub(1));
        let width = area
            .width
            .saturating_sub(x - area.x)
            .saturating_sub(self.right_margin)
            .max(GUTTER + 1);
        Rect::new(x, area.y, width, area.height.saturating_sub(1))
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
            Event::Resize(width, height) => self.resize(width, height),
            _ => {}
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let result = match (key.code, ctrl) {
            (KeyCode::Char('q'), _) | (KeyCode::Char('d'), true) => {
                self.quit();
                Ok(())
            }
            (KeyCode::Char('b'), true) => {
                self.add_bookmark();
                Ok(())
            }
            (KeyCode::Char('a'), true) | (KeyCode::Home, _) => self.session.jump_to_start(),
            (KeyCode::Char('e'), true) | (KeyCode::End, _) => self.session.jump_to_end(),
            (KeyCode::Char('j'), false) | (KeyCode::Down, _) => {
                self.session.move_cursor(CursorMove::By(1))
            }
            (KeyCode::Char('k'), false) | (KeyCode::Up, _) => {
                self.session.move_cursor(CursorMove::By(-1))
            }
            (KeyCode::Char(' '), false) | (KeyCode::PageDown, _) => self.session.next_page(),
            (KeyCode::Backspace, _) | (KeyCode::PageUp, _) => self.session.prev_page(),
            (KeyCode::Char('l'), false) | (KeyCode::Right, _) => self.step_item(true),
            (KeyCode::Char('h'), false) | (KeyCode::Left, _) => self.step_item(false),
            (KeyCode::Char('r'), false) => self.session.reload(),
            (KeyCode::Enter, _) => {
                self.follow_link();
                Ok(())
            }
            (KeyCode::Esc, _) => {
                self.session.dismiss_status();
                Ok(())
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            self.session.error(e.to_string());
        }
    }

    fn step_item(&mut self, forward: bool) -> crate::Result<()> {
        let moved = if forward {
            self.session.next_item()?
        } else {
            self.session.prev_item()?
        };
        if !moved {
            let end = if forward { "last" } else { "first" };
            self.session.warn(format!("Already at the {end} item"));
        }
        Ok(())
    }

        fn follow_link(&mut self) {
        match self.session.activate_link_at_cursor() {
            LinkOutcome::OpenedExternally(reference) => {
                self.session.info(format!("Opened {reference}"));
            }
            LinkOutcome::Navigated(_) | LinkOutcome::Failed(_) | LinkOutcome::NoLink => {}
        }
    }

    fn saved_position(&self) -> SavedPosition {
        SavedPosition::new(
            &self.book.title,
            &self.book.file_path,
            self.book.is_html,
            &self.session.position(),
        )
    }

    fn add_bookmark(&mut self) {
        let position = self.saved_position();
        if self.state.add_bookmark(position) {
            self.session.info("Bookmark added");
        } else {
            self.session.info("Already bookmarked");
        }
    }

    /// Records the last-read position and stops the event loop.
    pub fn quit(&mut self) {
        let position = self.saved_position();
        info!("Saving position {} @ {}", position.item, position.cursor);
        self.state.set_last_read(position);
        self.should_quit = true;
    }

    pub fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let cursor_row = self.session.cursor_row();
        let lines: Vec<Line> = self
            .session
            .page_lines()
            .iter()
            .enumerate()
            .map(|(row, text)| {
                let marker = if row == cursor_row { CURSOR_MARKER } else { "  " };
                let mut line = ansi::to_line(text, Style::default());
                line.spans
                    .insert(0, Span::styled(marker, Style::default().fg(Color::Yellow)));
                line
            })
            .collect();
        frame.render_widget(Paragraph::new(lines), self.text_area.intersection(area));

        let status_area = Rect::new(
            area.x,
            area.y + area.height.saturating_sub(1),
            area.width,
            area.height.min(1),
        );
        frame.render_widget(Paragraph::new(self.status_line()), status_area);
    }

    fn status_line(&self) -> Line<'static> {
        if let Some(status) = self.session.status() {
            let color = match status.level {
                NotificationLevel::Info => Color::Green,
                NotificationLevel::Warning => Color::Yellow,
                NotificationLevel::Error => Color::Red,
            };
            return Line::from(Span::styled(
                status.message.clone(),
                Style::default().fg(color),
            ));
        }
        if let Some(link) = self.session.link_at_cursor() {
            return Line::from(Span::styled(
                format!("Press ENTER to open {link}"),
                Style::default().fg(Color::Cyan),
            ));
        }
        let s = &self.session;
        let more = if s.is_exhausted() { "" } else { "+" };
        Line::from(vec![
            Span::styled(
                self.book.title.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(
                " {}/{} {} p{}/{}{more}",
                s.active_index() + 1,
                s.item_count(),
                s.active_path(),
                s.page_index() + 1,
                s.page_count().max(1),
            )),
        ])
        .style(Style::default().fg(Color::DarkGray))
    }
}

/// Draws and dispatches events until the viewer asks to quit.
pub fn run_viewer<B: Backend>(
    terminal: &mut Terminal<B>,
    viewer: &mut Viewer,
    events: &mut dyn EventSource,
) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    let size = terminal.size()?;
    viewer.resize(size.width, size.height);

    loop {
        terminal.draw(|frame| viewer.draw(frame))?;
        if viewer.should_quit() {
            return Ok(());
        }
        if events.poll(POLL_INTERVAL)? {
            let event = events.read()?;
            viewer.handle_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::{Pager, Viewport};
    use crate::test_utils::{
        MemoryBook, RecordingOpener, TestScenarioBuilder, capture_terminal_state,
        create_test_terminal,
    };

    fn viewer(docs: &[(&str, &str)]) -> (Viewer, RecordingOpener) {
        let book = MemoryBook::new(docs);
        let external = RecordingOpener::new();
        let pager = Pager::new(book.paths(), Box::new(book), Viewport::new(80, 24)).unwrap();
        let session = ReaderSession::new(pager, Box::new(external.clone()));
        let context = BookContext {
            title: "Test".into(),
            file_path: "/books/test.epub".into(),
            is_html: false,
        };
        (
            Viewer::new(session, context, ReadingState::ephemeral()),
            external,
        )
    }

    fn numbered(count: usize) -> String {
        (1..=count).map(|i| format!("<p>line {i}</p>")).collect()
    }

    #[test]
    fn first_page_is_drawn_with_cursor_and_status() {
        let xml = numbered(8);
        let (mut v, _) = viewer(&[("ch1.xhtml", &xml)]);
        let mut terminal = create_test_terminal(30, 5);
        let mut events = TestScenarioBuilder::new().quit().build();
        run_viewer(&mut terminal, &mut v, &mut events).unwrap();

        let screen = capture_terminal_state(&terminal);
        let rows: Vec<&str> = screen.lines().collect();
        assert_eq!(rows[0], "> line 1");
        assert_eq!(rows[1], "  line 2");
        assert_eq!(rows[3], "  line 4");
        assert!(rows[4].starts_with("Test 1/1 ch1.xhtml p1/"));
    }

    #[test]
    fn keys_move_cursor_and_pages() {
        let xml = numbered(20);
        let (mut v, _) = viewer(&[("ch1.xhtml", &xml)]);
        let mut terminal = create_test_terminal(30, 5);
        let mut events = TestScenarioBuilder::new()
            .line_down(2)
            .page_down()
            .quit()
            .build();
        run_viewer(&mut terminal, &mut v, &mut events).unwrap();

        assert_eq!(v.session().cursor(), 4);
        assert_eq!(v.session().page_index(), 1);
        let screen = capture_terminal_state(&terminal);
        assert!(screen.starts_with("> line 5"));
        let last = v.state().last_read.as_ref().unwrap();
        assert_eq!(last.item, "ch1.xhtml");
        assert_eq!(last.cursor, 4);
    }

    #[test]
    fn enter_follows_link_to_next_item() {
        let (mut v, _) = viewer(&[
            ("ch1.xhtml", r#"<p>Go to <a href="ch2.xhtml#start">the end</a></p>"#),
            ("ch2.xhtml", "<h1>Finale</h1>"),
        ]);
        let mut terminal = create_test_terminal(40, 4);
        let mut events = TestScenarioBuilder::new().press_enter().quit().build();
        run_viewer(&mut terminal, &mut v, &mut events).unwrap();

        assert_eq!(v.session().active_path(), "ch2.xhtml");
        let screen = capture_terminal_state(&terminal);
        assert!(screen.contains("Finale"));
    }

    #[test]
    fn link_hint_is_shown_on_link_line() {
        let (mut v, _) = viewer(&[(
            "ch1.xhtml",
            r#"<p><a href="http://example.com">site</a></p>"#,
        )]);
        let mut terminal = create_test_terminal(40, 4);
        let mut events = TestScenarioBuilder::new().quit().build();
        run_viewer(&mut terminal, &mut v, &mut events).unwrap();
        assert!(capture_terminal_state(&terminal).contains("Press ENTER to open http://example.com"));
    }

    #[test]
    fn failed_external_open_is_reported() {
        let (mut v, external) = viewer(&[(
            "ch1.xhtml",
            r#"<p><a href="http://example.com">site</a></p>"#,
        )]);
        external.fail_with("no browser");
        let mut terminal = create_test_terminal(40, 4);
        let mut events = TestScenarioBuilder::new().press_enter().quit().build();
        run_viewer(&mut terminal, &mut v, &mut events).unwrap();
        assert!(capture_terminal_state(&terminal).contains("Cannot open http://example.com"));
        assert_eq!(v.session().active_path(), "ch1.xhtml");
    }

    #[test]
    fn ctrl_b_bookmarks_current_line() {
        let xml = numbered(6);
        let (mut v, _) = viewer(&[("ch1.xhtml", &xml)]);
        let mut terminal = create_test_terminal(30, 6);
        let mut events = TestScenarioBuilder::new()
            .line_down(3)
            .press_ctrl_char('b')
            .press_ctrl_char('b')
            .quit()
            .build();
        run_viewer(&mut terminal, &mut v, &mut events).unwrap();

        assert_eq!(v.state().bookmarks.len(), 1);
        assert_eq!(v.state().bookmarks[0].cursor, 3);
        assert!(capture_terminal_state(&terminal).contains("Already bookmarked"));
    }

    #[test]
    fn resize_rewraps_text() {
        let (mut v, _) = viewer(&[("ch1.xhtml", "<p>alpha beta gamma delta</p>")]);
        let mut terminal = create_test_terminal(40, 6);
        let mut events = TestScenarioBuilder::new().resize(13, 6).quit().build();
        run_viewer(&mut terminal, &mut v, &mut events).unwrap();
        // 13 columns minus the gutter leaves 11 for text
        assert_eq!(v.session().total_lines(), 2);
        assert_eq!(v.session().page_lines()[0], "alpha beta");
    }

    #[test]
    fn item_keys_switch_items() {
        let (mut v, _) = viewer(&[("a.xhtml", "<p>a</p>"), ("b.xhtml", "<p>b</p>")]);
        let mut terminal = create_test_terminal(30, 4);
        let mut events = TestScenarioBuilder::new()
            .next_item()
            .next_item()
            .quit()
            .build();
        run_viewer(&mut terminal, &mut v, &mut events).unwrap();
        assert_eq!(v.session().active_path(), "b.xhtml");
        let screen = capture_terminal_state(&terminal);
        assert!(screen.starts_with("> b"));
        assert!(screen.contains("Already at the last item"));
    }

    #[test]
    fn keys_move_back_up() {
        let xml = numbered(20);
        let (mut v, _) = viewer(&[("ch1.xhtml", &xml)]);
        let mut terminal = create_test_terminal(30, 5);
        let mut events = TestScenarioBuilder::new()
            .page_down()
            .page_down()
            .page_up()
            .line_up(1)
            .quit()
            .build();
        run_viewer(&mut terminal, &mut v, &mut events).unwrap();

        // pages hold four lines; back one page lands on line 4, up one on 3
        assert_eq!(v.session().cursor(), 3);
        assert_eq!(v.session().page_index(), 0);
    }

    #[test]
    fn previous_item_key_warns_on_first_item() {
        let (mut v, _) = viewer(&[("a.xhtml", "<p>a</p>"), ("b.xhtml", "<p>b</p>")]);
        let mut terminal = create_test_terminal(30, 4);
        let mut events = TestScenarioBuilder::new().prev_item().quit().build();
        run_viewer(&mut terminal, &mut v, &mut events).unwrap();
        assert_eq!(v.session().active_path(), "a.xhtml");
        assert!(capture_terminal_state(&terminal).contains("Already at the first item"));
    }
}
