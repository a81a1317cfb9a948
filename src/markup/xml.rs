use std::borrow::Cow;
use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::token::{Attribute, MarkupError, Token, TokenSource};

/// Streaming XHTML tokenizer over any buffered reader.
///
/// Self-closing elements are reported as a start followed by an end, and end
/// tag names are not checked against their start tags so sloppy markup still
/// streams through.
pub struct XmlTokenSource {
    reader: Reader<Box<dyn BufRead>>,
    buf: Vec<u8>,
    done: bool,
}

impl XmlTokenSource {
    pub fn new(input: Box<dyn BufRead>) -> Self {
        let mut reader = Reader::from_reader(input);
        let config = reader.config_mut();
        config.trim_text(false);
        config.expand_empty_elements = true;
        config.check_end_names = false;
        Self {
            reader,
            buf: Vec::with_capacity(1024),
            done: false,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(Box::new(std::io::Cursor::new(bytes)))
    }

    fn error(&self, message: impl ToString) -> MarkupError {
        MarkupError {
            position: self.reader.buffer_position() as u64,
            message: message.to_string(),
        }
    }

    fn decode<'b>(&self, bytes: &'b [u8]) -> Result<Cow<'b, str>, MarkupError> {
        self.reader
            .decoder()
            .decode(bytes)
            .map_err(|e| self.error(format!("decode error: {e:?}")))
    }

    fn start_token(&self, e: &BytesStart<'_>) -> Result<Token, MarkupError> {
        let name = self.decode(e.local_name().as_ref())?.to_ascii_lowercase();
        let mut attrs = Vec::new();
        for attr in e.attributes().flatten() {
            let key = match self.decode(attr.key.as_ref()) {
                Ok(key) => key.to_ascii_lowercase(),
                Err(_) => continue,
            };
            let value = match self.decode(&attr.value) {
                Ok(value) => unescape_lossy(&value),
                Err(_) => continue,
            };
            attrs.push(Attribute::new(key, value));
        }
        Ok(Token::Start { name, attrs })
    }
}

impl TokenSource for XmlTokenSource {
    fn next_token(&mut self) -> Result<Token, MarkupError> {
        loop {
            if self.done {
                return Ok(Token::Eof);
            }
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event.into_owned(),
                Err(e) => return Err(self.error(format!("xml error: {e:?}"))),
            };
            let token = match event {
                Event::Start(e) => self.start_token(&e)?,
                Event::End(e) => Token::End {
                    name: self.decode(e.local_name().as_ref())?.to_ascii_lowercase(),
                },
                Event::Text(e) => {
                    let text = e
                        .decode()
                        .map_err(|err| self.error(format!("decode error: {err:?}")))?;
                    Token::Text(text.into_owned())
                }
                Event::CData(e) => Token::Text(self.decode(&e)?.into_owned()),
                Event::GeneralRef(e) => {
                    let name = e
                        .decode()
                        .map_err(|err| self.error(format!("decode error: {err:?}")))?;
                    Token::Text(resolve_entity(&name))
                }
                Event::Eof => {
                    self.done = true;
                    Token::Eof
                }
                // comments, doctype, processing instructions
                _ => continue,
            };
            return Ok(token);
        }
    }
}

// HTML named entities (`&nbsp;`, `&mdash;`) and character references;
// unknown names are kept verbatim
fn resolve_entity(name: &str) -> String {
    unescape_lossy(&format!("&{name};"))
}

fn unescape_lossy(raw: &str) -> String {
    match quick_xml::escape::unescape(raw) {
        Ok(text) => text.into_owned(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(xml: &str) -> Vec<Token> {
        let mut source = XmlTokenSource::from_bytes(xml.as_bytes().to_vec());
        let mut out = Vec::new();
        loop {
            match source.next_token() {
                Ok(Token::Eof) => break,
                Ok(token) => out.push(token),
                Err(_) => continue,
            }
        }
        out
    }

    #[test]
    fn self_closing_elements_expand_to_start_and_end() {
        let toks = tokens("<p>a<br/>b</p>");
        assert_eq!(
            toks,
            vec![
                Token::start("p"),
                Token::text("a"),
                Token::start("br"),
                Token::end("br"),
                Token::text("b"),
                Token::end("p"),
            ]
        );
    }

    #[test]
    fn names_are_local_and_lowercase() {
        let toks = tokens(r#"<svg:IMAGE xlink:href="c.png"></svg:IMAGE>"#);
        assert_eq!(
            toks,
            vec![
                Token::start_with("image", &[("xlink:href", "c.png")]),
                Token::end("image"),
            ]
        );
    }

    #[test]
    fn entities_become_text() {
        let toks = tokens("<p>Tom &amp; Jerry&nbsp;&#33;</p>");
        let text: String = toks
            .iter()
            .filter_map(|t| match t {
                Token::Text(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Tom & Jerry\u{a0}!");
    }

    #[test]
    fn html_named_entities_resolve() {
        let text: String = tokens("<p>a&mdash;b &eacute;t&eacute; &bogus; y</p>")
            .iter()
            .filter_map(|t| match t {
                Token::Text(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "a\u{2014}b \u{e9}t\u{e9} &bogus; y");
    }

    #[test]
    fn attribute_values_are_unescaped() {
        let toks = tokens(r#"<a href="a.xhtml?x=1&amp;y=2">x</a>"#);
        assert_eq!(toks[0], Token::start_with("a", &[("href", "a.xhtml?x=1&y=2")]));
    }

    #[test]
    fn eof_repeats() {
        let mut source = XmlTokenSource::from_bytes(b"<p/>".to_vec());
        while source.next_token().unwrap() != Token::Eof {}
        assert_eq!(source.next_token().unwrap(), Token::Eof);
    }
}
