//! Streaming conversion of markup tokens into styled paragraph text.
//!
//! A [`DocumentItem`] owns the token source of one chapter while it is open
//! and turns the token stream into an append-only sequence of paragraphs, one
//! paragraph per [`DocumentItem::advance`] call. Inline formatting becomes SGR
//! sequences and link targets become sentinels (see [`crate::hyperlink`]);
//! both are zero-width for the wrapper.

use log::{debug, warn};

use crate::hyperlink;
use crate::markup::{Attribute, Token, TokenSource, attr};
use crate::sgr::{BG_OFF, BG_RED, BOLD, BOLD_OFF, ITALIC, ITALIC_OFF, UNDERLINE, UNDERLINE_OFF};

/// Text written for `<hr>`.
pub const SEPARATOR: &str = "* * *";
/// Appended after each table cell.
pub const CELL_SEPARATOR: &str = " | ";
const DEFAULT_ALT: &str = "Image";
// Consecutive tokenizer errors tolerated before the stream is given up.
const MAX_CONSECUTIVE_ERRORS: usize = 32;

const SUPERSCRIPT_DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];
const SUBSCRIPT_DIGITS: [char; 10] = ['₀', '₁', '₂', '₃', '₄', '₅', '₆', '₇', '₈', '₉'];

/// Outcome of one [`DocumentItem::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The paragraph with this index is complete and will not change again.
    Completed(usize),
    /// The token stream is exhausted; every paragraph has been produced.
    Exhausted,
}

/// One reflowable unit (a chapter file) and its conversion state.
pub struct DocumentItem {
    path: String,
    source: Option<Box<dyn TokenSource>>,
    paragraphs: Vec<String>,
    offset: usize,
    // current paragraph has no visible text yet, or ends in whitespace
    at_break: bool,
    exhausted: bool,
    consecutive_errors: usize,
}

impl std::fmt::Debug for DocumentItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentItem")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("offset", &self.offset)
            .field("paragraphs", &self.paragraphs.len())
            .finish()
    }
}

impl DocumentItem {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: None,
            paragraphs: Vec::new(),
            offset: 0,
            at_break: true,
            exhausted: false,
            consecutive_errors: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    /// Whether the last `advance` reported exhaustion.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Installs a fresh token source and restarts conversion at paragraph 0.
    pub fn open(&mut self, source: Box<dyn TokenSource>) {
        self.close();
        self.source = Some(source);
        self.paragraphs.push(String::new());
    }

    /// Releases the token source and discards all converted paragraphs.
    pub fn close(&mut self) {
        if self.source.take().is_some() {
            debug!("Closed token source for {}", self.path);
        }
        self.paragraphs.clear();
        self.offset = 0;
        self.at_break = true;
        self.exhausted = false;
        self.consecutive_errors = 0;
    }

    /// Index of the paragraph currently being filled.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn paragraph(&self, index: usize) -> Option<&str> {
        self.paragraphs.get(index).map(String::as_str)
    }

    /// Paragraphs produced so far, including the one still being filled.
    pub fn paragraphs(&self) -> &[String] {
        &self.paragraphs
    }

    /// Consumes tokens until the current paragraph is complete.
    pub fn advance(&mut self) -> Advance {
        if self.exhausted {
            return Advance::Exhausted;
        }
        let Some(mut source) = self.source.take() else {
            debug!("advance on closed item {}", self.path);
            return Advance::Exhausted;
        };
        let result = self.convert(source.as_mut());
        self.source = Some(source);
        if result == Advance::Exhausted {
            self.exhausted = true;
        }
        result
    }

    fn convert(&mut self, source: &mut dyn TokenSource) -> Advance {
        loop {
            let token = match self.next_token(source) {
                Some(token) => token,
                None => return self.finish(),
            };
            match token {
                Token::Text(text) => self.push_text(&text),
                Token::Start { name, attrs } => {
                    if let Some(done) = self.start_element(&name, &attrs, source) {
                        return done;
                    }
                }
                Token::End { name } => {
                    if let Some(done) = self.end_element(&name) {
                        return done;
                    }
                }
                Token::Eof => return self.finish(),
            }
        }
    }

    /// Next token, skipping over tokenizer errors. `None` once too many
    /// errors arrive in a row, and from then on until the item is closed.
    fn next_token(&mut self, source: &mut dyn TokenSource) -> Option<Token> {
        if self.consecutive_errors > MAX_CONSECUTIVE_ERRORS {
            return None;
        }
        loop {
            match source.next_token() {
                Ok(token) => {
                    self.consecutive_errors = 0;
                    return Some(token);
                }
                Err(e) => {
                    self.consecutive_errors += 1;
                    warn!("{}: {e}", self.path);
                    if self.consecutive_errors > MAX_CONSECUTIVE_ERRORS {
                        warn!("{}: giving up after repeated markup errors", self.path);
                        return None;
                    }
                }
            }
        }
    }

    fn start_element(
        &mut self,
        name: &str,
        attrs: &[Attribute],
        source: &mut dyn TokenSource,
    ) -> Option<Advance> {
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let done = self.next_paragraph();
                self.push_markup(BOLD);
                return Some(done);
            }
            "hr" => {
                let done = self.next_paragraph();
                self.push_text(SEPARATOR);
                return Some(done);
            }
            "a" => {
                if let Some(href) = attr(attrs, "href") {
                    self.push_markup(&hyperlink::sentinel(href));
                }
                self.push_markup(UNDERLINE);
            }
            "img" | "image" => self.push_image(attrs),
            "i" | "em" => self.push_markup(ITALIC),
            "b" | "strong" => self.push_markup(BOLD),
            "sup" => {
                let digits = self.transliterate_digits(source, &SUPERSCRIPT_DIGITS);
                self.push_text(&digits);
            }
            "sub" => {
                let digits = self.transliterate_digits(source, &SUBSCRIPT_DIGITS);
                self.push_text(&digits);
            }
            "head" | "script" | "style" => {
                if let Err(e) = source.skip_subtree() {
                    warn!("{}: while skipping <{name}>: {e}", self.path);
                }
            }
            _ => {}
        }
        None
    }

    fn end_element(&mut self, name: &str) -> Option<Advance> {
        match name {
            "p" | "div" | "tr" | "li" | "html" | "body" => {
                if !self.current().is_empty() {
                    return Some(self.next_paragraph());
                }
            }
            "td" | "th" => {
                if !self.current().trim_end().ends_with('|') {
                    self.push_markup(CELL_SEPARATOR);
                    self.at_break = true;
                }
            }
            "hr" | "br" => return Some(self.next_paragraph()),
            "a" => self.push_markup(UNDERLINE_OFF),
            "i" | "em" => self.push_markup(ITALIC_OFF),
            "b" | "strong" => self.push_markup(BOLD_OFF),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.push_markup(BOLD_OFF);
                return Some(self.next_paragraph());
            }
            _ => {}
        }
        None
    }

    fn push_image(&mut self, attrs: &[Attribute]) {
        let Some(src) = attr(attrs, "src").or_else(|| attr(attrs, "href")) else {
            return;
        };
        let alt = attr(attrs, "alt")
            .map(collapse_whitespace)
            .filter(|alt| !alt.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ALT.to_string());
        self.push_markup(&hyperlink::sentinel(src));
        self.push_markup(BOLD);
        self.push_markup(BG_RED);
        self.push_markup(&format!("\u{3000}{}\u{3000}", alt.trim()));
        self.push_markup(BOLD_OFF);
        self.push_markup(BG_OFF);
        self.at_break = false;
    }

    /// Reads through the end tag of a `sup`/`sub` element, keeping only
    /// ASCII digits mapped onto `glyphs`.
    fn transliterate_digits(&mut self, source: &mut dyn TokenSource, glyphs: &[char; 10]) -> String {
        let mut out = String::new();
        while let Some(token) = self.next_token(source) {
            match token {
                Token::Text(text) => out.extend(
                    text.chars()
                        .filter_map(|c| c.to_digit(10).map(|d| glyphs[d as usize])),
                ),
                Token::Start { name, .. } => {
                    if let Err(e) = source.skip_subtree() {
                        warn!("{}: while skipping <{name}>: {e}", self.path);
                    }
                }
                Token::End { .. } | Token::Eof => break,
            }
        }
        out
    }

    fn push_text(&mut self, raw: &str) {
        let collapsed = collapse_whitespace(raw);
        let text = if self.at_break {
            collapsed.trim_start_matches(' ')
        } else {
            collapsed.as_str()
        };
        if text.is_empty() {
            return;
        }
        self.at_break = text.ends_with(' ');
        self.current().push_str(text);
    }

    /// Appends zero-width content; whitespace state is unchanged.
    fn push_markup(&mut self, markup: &str) {
        self.current().push_str(markup);
    }

    fn current(&mut self) -> &mut String {
        if self.paragraphs.is_empty() {
            self.paragraphs.push(String::new());
        }
        let last = self.paragraphs.len() - 1;
        &mut self.paragraphs[last]
    }

    fn next_paragraph(&mut self) -> Advance {
        let done = self.offset;
        self.current();
        self.paragraphs.push(String::new());
        self.offset += 1;
        self.at_break = true;
        Advance::Completed(done)
    }

    /// End of stream: a trailing paragraph with content is still delivered.
    fn finish(&mut self) -> Advance {
        if self.current().is_empty() {
            Advance::Exhausted
        } else {
            self.next_paragraph()
        }
    }
}

/// Collapses every run of ASCII whitespace to a single space.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}
