//! Turns SGR-styled display lines into ratatui spans.

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

use crate::sgr::{SgrAction, StyleClass, sequences};

#[derive(Debug, Clone, Copy, Default)]
struct PenState {
    bold: bool,
    dim: bool,
    italic: bool,
    underline: bool,
    fg: Option<Color>,
    bg: Option<Color>,
}

impl PenState {
    fn apply(&mut self, action: SgrAction) {
        match action {
            SgrAction::ResetAll => *self = Self::default(),
            SgrAction::Open { class, params } => match class {
                StyleClass::Intensity => {
                    self.bold = params == "1";
                    self.dim = params == "2";
                }
                StyleClass::Italic => self.italic = true,
                StyleClass::Underline => self.underline = true,
                StyleClass::Foreground => self.fg = parse_color(&params, 30),
                StyleClass::Background => self.bg = parse_color(&params, 40),
            },
            SgrAction::Close(class) => match class {
                StyleClass::Intensity => {
                    self.bold = false;
                    self.dim = false;
                }
                StyleClass::Italic => self.italic = false,
                StyleClass::Underline => self.underline = false,
                StyleClass::Foreground => self.fg = None,
                StyleClass::Background => self.bg = None,
            },
            SgrAction::Other => {}
        }
    }

    fn style(&self, base: Style) -> Style {
        let mut style = base;
        let toggles = [
            (self.bold, Modifier::BOLD),
            (self.dim, Modifier::DIM),
            (self.italic, Modifier::ITALIC),
            (self.underline, Modifier::UNDERLINED),
        ];
        for (on, modifier) in toggles {
            if on {
                style = style.add_modifier(modifier);
            }
        }
        if let Some(fg) = self.fg {
            style = style.fg(fg);
        }
        if let Some(bg) = self.bg {
            style = style.bg(bg);
        }
        style
    }
}

/// `base` is 30 for foreground parameters, 40 for background ones.
fn parse_color(params: &str, base: u8) -> Option<Color> {
    let parts: Vec<u8> = params.split(';').filter_map(|p| p.parse().ok()).collect();
    match parts.as_slice() {
        [_, 5, index] => Some(Color::Indexed(*index)),
        [_, 2, r, g, b] => Some(Color::Rgb(*r, *g, *b)),
        [code] if (base..base + 8).contains(code) => Some(ansi_color(code - base, false)),
        [code] if (base + 60..base + 68).contains(code) => Some(ansi_color(code - base - 60, true)),
        _ => None,
    }
}

fn ansi_color(index: u8, bright: bool) -> Color {
    match (index, bright) {
        (0, false) => Color::Black,
        (1, false) => Color::Red,
        (2, false) => Color::Green,
        (3, false) => Color::Yellow,
        (4, false) => Color::Blue,
        (5, false) => Color::Magenta,
        (6, false) => Color::Cyan,
        (7, false) => Color::Gray,
        (0, true) => Color::DarkGray,
        (1, true) => Color::LightRed,
        (2, true) => Color::LightGreen,
        (3, true) => Color::LightYellow,
        (4, true) => Color::LightBlue,
        (5, true) => Color::LightMagenta,
        (6, true) => Color::LightCyan,
        _ => Color::White,
    }
}

/// Converts one display line, starting from `base` with no SGR state.
pub fn to_line(text: &str, base: Style) -> Line<'static> {
    let mut spans = Vec::new();
    let mut pen = PenState::default();
    let mut last = 0;

    for (range, actions) in sequences(text) {
        if range.start > last {
            spans.push(Span::styled(text[last..range.start].to_string(), pen.style(base)));
        }
        for action in actions {
            pen.apply(action);
        }
        last = range.end;
    }
    if last < text.len() {
        spans.push(Span::styled(text[last..].to_string(), pen.style(base)));
    }
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn unstyled_text_is_one_span() {
        let line = to_line("just text", Style::default());
        assert_eq!(line.spans.len(), 1);
        assert_eq!(plain(&line), "just text");
    }

    #[test]
    fn styles_open_and_close() {
        let line = to_line("a \x1b[1mbold\x1b[22m \x1b[4mlink\x1b[24m", Style::default());
        assert_eq!(plain(&line), "a bold link");
        assert_eq!(line.spans[1].content, "bold");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert!(!line.spans[2].style.add_modifier.contains(Modifier::BOLD));
        assert!(line.spans[3].style.add_modifier.contains(Modifier::UNDERLINED));
    }

    #[test]
    fn image_placeholder_gets_red_background() {
        let line = to_line("\x1b[1m\x1b[41m　Map　\x1b[22m\x1b[49m", Style::default());
        assert_eq!(line.spans.len(), 1);
        assert_eq!(line.spans[0].style.bg, Some(Color::Red));
    }

    #[test]
    fn extended_and_bright_colors() {
        assert_eq!(parse_color("38;5;196", 30), Some(Color::Indexed(196)));
        assert_eq!(parse_color("48;2;1;2;3", 40), Some(Color::Rgb(1, 2, 3)));
        assert_eq!(parse_color("94", 30), Some(Color::LightBlue));
        assert_eq!(parse_color("31", 40), None);
    }

    #[test]
    fn base_style_is_kept() {
        let base = Style::default().fg(Color::Yellow);
        let line = to_line("\x1b[3mx", base);
        assert_eq!(line.spans[0].style.fg, Some(Color::Yellow));
        assert!(line.spans[0].style.add_modifier.contains(Modifier::ITALIC));
    }
}
