use std::fs;

use pageflow::book::open_book;
use pageflow::sgr::strip_zero_width;
use pageflow::test_utils::{MemoryBook, RecordingOpener};
use pageflow::{CursorMove, LinkOutcome, Pager, ReaderSession, RenderLimit, Viewport};
use tempfile::TempDir;

const CHAPTER_ONE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>One</title><style>p { margin: 0 }</style></head>
<body>
  <h1>Chapter <i>One</i></h1>
  <p>It was a <b>bright</b> cold day in April, and the clocks were striking
     thirteen. Water is H<sub>2</sub>O and area is m<sup>2</sup>.</p>
  <table><tr><td>cell1</td><td>cell2</td></tr></table>
  <hr/>
  <p>Continue to <a href="ch2.xhtml#top">the next chapter</a> or see
     <img src="../images/map.png" alt="the map"/>.</p>
</body>
</html>"#;

const CHAPTER_TWO: &str = r#"<html><body><p id="top">Second chapter&nbsp;text.</p></body></html>"#;

fn session(width: usize, height: usize) -> (ReaderSession, RecordingOpener) {
    let book = MemoryBook::new(&[
        ("OEBPS/text/ch1.xhtml", CHAPTER_ONE),
        ("OEBPS/text/ch2.xhtml", CHAPTER_TWO),
    ]);
    let external = RecordingOpener::new();
    let pager = Pager::new(book.paths(), Box::new(book), Viewport::new(width, height)).unwrap();
    (ReaderSession::new(pager, Box::new(external.clone())), external)
}

fn plain_lines(session: &ReaderSession) -> Vec<String> {
    let pager = session.pager();
    (0..pager.total_lines())
        .map(|i| strip_zero_width(pager.line(i).unwrap()).into_owned())
        .collect()
}

#[test]
fn chapter_reflows_into_plain_text() {
    let (mut s, _) = session(200, 50);
    s.ensure_rendered(RenderLimit::Unbounded).unwrap();
    let lines = plain_lines(&s);

    assert_eq!(lines[0], "");
    assert_eq!(lines[1], "Chapter One");
    assert!(lines[2].starts_with("It was a bright cold day in April, and the clocks were striking thirteen."));
    assert!(lines[2].contains("H₂O"));
    assert!(lines[2].contains("m²"));
    // the wrapper drops the separator's trailing space
    assert!(lines.contains(&"cell1 | cell2 |".to_string()));
    assert!(lines.contains(&"* * *".to_string()));
    assert!(!lines.iter().any(|l| l.contains("margin")));
    assert!(!lines.iter().any(|l| l == "One"));
}

#[test]
fn narrow_viewport_keeps_lines_within_width() {
    let (mut s, _) = session(12, 4);
    s.ensure_rendered(RenderLimit::Unbounded).unwrap();
    let pager = s.pager();
    for i in 0..pager.total_lines() {
        let line = pager.line(i).unwrap();
        let visible = pageflow::sgr::visible_width(line);
        let words = strip_zero_width(line).split(' ').filter(|w| !w.is_empty()).count();
        assert!(visible <= 12 || words == 1, "{line:?}");
    }
    let lens = pager.page_len();
    assert!(lens.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*lens.last().unwrap(), pager.total_lines());
    assert!(pager.page_count() > 1);
}

#[test]
fn following_a_link_lands_on_the_next_chapter() {
    let (mut s, external) = session(200, 50);
    s.ensure_rendered(RenderLimit::Unbounded).unwrap();
    let link_line = (0..s.total_lines())
        .find(|&i| s.pager().link_at(i) == Some("ch2.xhtml"))
        .expect("link line");
    s.move_cursor(CursorMove::To(link_line)).unwrap();

    assert_eq!(s.activate_link_at_cursor(), LinkOutcome::Navigated(1));
    assert_eq!(s.cursor(), 0);
    assert_eq!(s.page_index(), 0);
    assert_eq!(plain_lines(&s), vec!["Second chapter\u{a0}text."]);
    assert!(external.opened().is_empty());
}

#[test]
fn image_link_opens_externally() {
    // narrow enough that the image does not share a line with the chapter link
    let (mut s, external) = session(9, 50);
    s.ensure_rendered(RenderLimit::Unbounded).unwrap();
    let image_line = (0..s.total_lines())
        .find(|&i| s.pager().link_at(i) == Some("../images/map.png"))
        .expect("image line");
    s.move_cursor(CursorMove::To(image_line)).unwrap();

    assert_eq!(
        s.activate_link_at_cursor(),
        LinkOutcome::OpenedExternally("OEBPS/images/map.png".into())
    );
    assert_eq!(external.opened(), vec!["OEBPS/images/map.png".to_string()]);
}

#[test]
fn resize_preserves_reading_position() {
    let (mut s, _) = session(30, 3);
    s.move_cursor(CursorMove::To(5)).unwrap();
    let before = s.position();
    s.set_viewport(60, 6).unwrap();
    assert_eq!(s.position(), before);
    assert_eq!(s.page_index(), s.pager().page_of(5));
}

#[test]
fn loose_xhtml_file_opens_as_single_item_book() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("story.xhtml");
    fs::write(&path, CHAPTER_TWO).unwrap();

    let book = open_book(&path, false).unwrap();
    assert!(book.is_html);
    assert_eq!(book.info.title, "story");
    assert_eq!(book.items.len(), 1);

    let pager = Pager::new(book.items, book.opener, Viewport::new(80, 10)).unwrap();
    let mut s = ReaderSession::new(pager, book.external);
    s.ensure_rendered(RenderLimit::Unbounded).unwrap();
    assert_eq!(s.page_lines(), &["Second chapter\u{a0}text.".to_string()]);
}
