//! Greedy word wrapping that is aware of zero-width SGR sequences and keeps
//! every produced line self-contained with respect to open styles.

use crate::sgr::{OpenStyles, visible_width};

/// Wraps one paragraph into display lines no wider than `width` cells.
///
/// Words are separated by plain spaces. A word wider than `width` is never
/// split; it gets a line of its own. An empty paragraph yields one empty line.
/// Styles still open at a wrap point are closed at the end of the line and
/// reopened at the start of the next one.
pub fn wrap(paragraph: &str, width: usize) -> Vec<String> {
    carry_styles(split_greedy(paragraph, width))
}

fn split_greedy(paragraph: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut line_width = 0usize;

    for word in paragraph.split(' ').filter(|w| !w.is_empty()) {
        let word_width = visible_width(word);
        if line_width == 0 {
            // only zero-width words so far; glue them to the first visible one
            line.push_str(word);
            line_width = word_width;
        } else if word_width == 0 {
            // trailing markup stays on the line it closes
            line.push_str(word);
        } else if line_width + 1 + word_width <= width {
            line.push(' ');
            line.push_str(word);
            line_width += 1 + word_width;
        } else {
            lines.push(std::mem::take(&mut line));
            line.push_str(word);
            line_width = word_width;
        }
    }
    lines.push(line);
    lines
}

fn carry_styles(mut lines: Vec<String>) -> Vec<String> {
    let last = lines.len().saturating_sub(1);
    let mut open = OpenStyles::new();
    for (i, line) in lines.iter_mut().enumerate() {
        let carried = open.openers();
        open.scan(line);
        line.insert_str(0, &carried);
        if i != last {
            line.push_str(&open.resets());
        }
    }
    lines
}
