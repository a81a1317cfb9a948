//! In-memory collaborators and input scripting for tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use ratatui::Terminal;
use ratatui::backend::TestBackend;

use crate::error::{ReaderError, Result};
use crate::event_source::{Event, KeyCode, KeyModifiers, SimulatedEventSource};
use crate::markup::{TokenSource, XmlTokenSource};
use crate::pager::SourceOpener;
use crate::session::ExternalOpener;

/// A book whose items are XHTML strings keyed by reference path.
#[derive(Debug, Clone, Default)]
pub struct MemoryBook {
    order: Vec<String>,
    docs: HashMap<String, String>,
}

impl MemoryBook {
    pub fn new(docs: &[(&str, &str)]) -> Self {
        Self {
            order: docs.iter().map(|(path, _)| path.to_string()).collect(),
            docs: docs
                .iter()
                .map(|(path, xml)| (path.to_string(), xml.to_string()))
                .collect(),
        }
    }

    /// Item references in reading order.
    pub fn paths(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Forgets the content of `path`, so opening it fails from now on.
    pub fn remove(&mut self, path: &str) {
        self.docs.remove(path);
    }
}

impl SourceOpener for MemoryBook {
    fn open_source(&mut self, path: &str) -> Result<Box<dyn TokenSource>> {
        match self.docs.get(path) {
            Some(xml) => Ok(Box::new(XmlTokenSource::from_bytes(xml.clone().into_bytes()))),
            None => Err(ReaderError::unavailable(path, "no such item")),
        }
    }
}

/// External opener that remembers every reference it was handed and can be
/// told to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingOpener {
    opened: Rc<RefCell<Vec<String>>>,
    failure: Rc<RefCell<Option<String>>>,
}

impl RecordingOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.borrow().clone()
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.borrow_mut() = Some(message.to_string());
    }
}

impl ExternalOpener for RecordingOpener {
    fn open_external(&mut self, reference: &str) -> anyhow::Result<()> {
        if let Some(message) = self.failure.borrow().as_ref() {
            anyhow::bail!("{message}");
        }
        self.opened.borrow_mut().push(reference.to_string());
        Ok(())
    }
}

/// Builder for scripted key input.
#[derive(Default)]
pub struct TestScenarioBuilder {
    events: Vec<Event>,
}

impl TestScenarioBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press_char(mut self, c: char) -> Self {
        self.events.push(SimulatedEventSource::char_key(c));
        self
    }

    pub fn press_ctrl_char(mut self, c: char) -> Self {
        self.events.push(SimulatedEventSource::ctrl_char_key(c));
        self
    }

    pub fn press(mut self, code: KeyCode) -> Self {
        self.events
            .push(SimulatedEventSource::key_event(code, KeyModifiers::empty()));
        self
    }

    pub fn press_enter(self) -> Self {
        self.press(KeyCode::Enter)
    }

    /// Press 'j' n times
    pub fn line_down(mut self, times: usize) -> Self {
        for _ in 0..times {
            self.events.push(SimulatedEventSource::char_key('j'));
        }
        self
    }

    /// Press 'k' n times
    pub fn line_up(mut self, times: usize) -> Self {
        for _ in 0..times {
            self.events.push(SimulatedEventSource::char_key('k'));
        }
        self
    }

    pub fn page_down(self) -> Self {
        self.press_char(' ')
    }

    pub fn page_up(self) -> Self {
        self.press(KeyCode::Backspace)
    }

    pub fn next_item(self) -> Self {
        self.press_char('l')
    }

    pub fn prev_item(self) -> Self {
        self.press_char('h')
    }

    pub fn resize(mut self, width: u16, height: u16) -> Self {
        self.events.push(Event::Resize(width, height));
        self
    }

    pub fn quit(self) -> Self {
        self.press_char('q')
    }

    pub fn build(self) -> SimulatedEventSource {
        SimulatedEventSource::new(self.events)
    }
}

pub fn create_test_terminal(width: u16, height: u16) -> Terminal<TestBackend> {
    let backend = TestBackend::new(width, height);
    Terminal::new(backend).expect("test backend never fails")
}

/// The terminal buffer as text, trailing blanks trimmed.
pub fn capture_terminal_state(terminal: &Terminal<TestBackend>) -> String {
    let buffer = terminal.backend().buffer();
    let mut lines = Vec::new();

    for y in 0..buffer.area.height {
        let mut line = String::new();
        for x in 0..buffer.area.width {
            line.push_str(buffer[(x, y)].symbol());
        }
        lines.push(line.trim_end().to_string());
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}
