//! SGR (Select Graphic Rendition) helpers: zero-width aware width math and
//! tracking of style spans that are still open at the end of a line.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use unicode_width::UnicodeWidthStr;

pub const BOLD: &str = "\x1b[1m";
pub const BOLD_OFF: &str = "\x1b[22m";
pub const ITALIC: &str = "\x1b[3m";
pub const ITALIC_OFF: &str = "\x1b[23m";
pub const UNDERLINE: &str = "\x1b[4m";
pub const UNDERLINE_OFF: &str = "\x1b[24m";
pub const BG_RED: &str = "\x1b[41m";
pub const BG_OFF: &str = "\x1b[49m";
pub const RESET: &str = "\x1b[m";

static SGR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[([0-9;]*)m").expect("valid SGR regex"));

// SGR sequences plus link sentinels (see `hyperlink`), both occupy no cells.
static ZERO_WIDTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;]*m|\x01[^\x02]*\x02").expect("valid zero-width regex")
});

/// Removes every zero-width sequence, leaving only what ends up on screen.
pub fn strip_zero_width(s: &str) -> Cow<'_, str> {
    ZERO_WIDTH_RE.replace_all(s, "")
}

/// Number of terminal cells `s` occupies once styles and sentinels are gone.
pub fn visible_width(s: &str) -> usize {
    UnicodeWidthStr::width(strip_zero_width(s).as_ref())
}

/// Style classes that each carry their own reset sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleClass {
    Intensity,
    Italic,
    Underline,
    Foreground,
    Background,
}

impl StyleClass {
    pub const ALL: [StyleClass; 5] = [
        StyleClass::Intensity,
        StyleClass::Italic,
        StyleClass::Underline,
        StyleClass::Foreground,
        StyleClass::Background,
    ];

    pub fn reset(self) -> &'static str {
        match self {
            StyleClass::Intensity => BOLD_OFF,
            StyleClass::Italic => ITALIC_OFF,
            StyleClass::Underline => UNDERLINE_OFF,
            StyleClass::Foreground => "\x1b[39m",
            StyleClass::Background => BG_OFF,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Meaning of one SGR directive, with extended colors kept whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SgrAction {
    ResetAll,
    Open { class: StyleClass, params: String },
    Close(StyleClass),
    Other,
}

/// Splits the parameter list of one SGR sequence (`"1;41"`) into actions.
pub fn parse_params(params: &str) -> Vec<SgrAction> {
    if params.is_empty() {
        return vec![SgrAction::ResetAll];
    }
    let parts: Vec<&str> = params.split(';').collect();
    let mut actions = Vec::with_capacity(parts.len());
    let mut i = 0;
    while i < parts.len() {
        let code: u16 = match parts[i].parse() {
            Ok(code) => code,
            Err(_) if parts[i].is_empty() => 0,
            Err(_) => {
                actions.push(SgrAction::Other);
                i += 1;
                continue;
            }
        };
        let part = parts[i];
        let open = |class: StyleClass| SgrAction::Open {
            class,
            params: part.to_string(),
        };
        let action = match code {
            0 => SgrAction::ResetAll,
            1 | 2 => open(StyleClass::Intensity),
            3 => open(StyleClass::Italic),
            4 => open(StyleClass::Underline),
            30..=37 | 90..=97 => open(StyleClass::Foreground),
            40..=47 | 100..=107 => open(StyleClass::Background),
            38 | 48 => {
                // 38;5;n or 38;2;r;g;b
                let len = match parts.get(i + 1) {
                    Some(&"5") => 3,
                    Some(&"2") => 5,
                    _ => 1,
                };
                let end = (i + len).min(parts.len());
                let class = if code == 38 {
                    StyleClass::Foreground
                } else {
                    StyleClass::Background
                };
                actions.push(SgrAction::Open {
                    class,
                    params: parts[i..end].join(";"),
                });
                i = end;
                continue;
            }
            22 => SgrAction::Close(StyleClass::Intensity),
            23 => SgrAction::Close(StyleClass::Italic),
            24 => SgrAction::Close(StyleClass::Underline),
            39 => SgrAction::Close(StyleClass::Foreground),
            49 => SgrAction::Close(StyleClass::Background),
            _ => SgrAction::Other,
        };
        actions.push(action);
        i += 1;
    }
    actions
}

/// Every SGR sequence in `s` with its byte range and parsed actions.
pub fn sequences(s: &str) -> impl Iterator<Item = (std::ops::Range<usize>, Vec<SgrAction>)> + '_ {
    SGR_RE.captures_iter(s).filter_map(|caps| {
        let whole = caps.get(0)?;
        let params = caps.get(1).map_or("", |m| m.as_str());
        Some((whole.range(), parse_params(params)))
    })
}

/// The style spans open after reading some text from a "no style" start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenStyles {
    openers: [String; 5],
}

impl OpenStyles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds every SGR sequence of `text` into the open set.
    pub fn scan(&mut self, text: &str) {
        for (_, actions) in sequences(text) {
            for action in actions {
                self.apply(action);
            }
        }
    }

    pub fn apply(&mut self, action: SgrAction) {
        match action {
            SgrAction::ResetAll => self.openers.iter_mut().for_each(String::clear),
            SgrAction::Open { class, params } => {
                let slot = &mut self.openers[class.index()];
                slot.push_str("\x1b[");
                slot.push_str(&params);
                slot.push('m');
            }
            SgrAction::Close(class) => self.openers[class.index()].clear(),
            SgrAction::Other => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.openers.iter().all(String::is_empty)
    }

    pub fn is_open(&self, class: StyleClass) -> bool {
        !self.openers[class.index()].is_empty()
    }

    /// Sequences that reopen every open span, in class order.
    pub fn openers(&self) -> String {
        self.openers.concat()
    }

    /// Sequences that close every open span.
    pub fn resets(&self) -> String {
        StyleClass::ALL
            .iter()
            .filter(|class| self.is_open(**class))
            .map(|class| class.reset())
            .collect()
    }
}
