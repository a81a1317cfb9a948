/// One parse event from a document item's markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text(String),
    Start { name: String, attrs: Vec<Attribute> },
    End { name: String },
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Token {
    pub fn start(name: &str) -> Self {
        Token::Start {
            name: name.to_string(),
            attrs: Vec::new(),
        }
    }

    pub fn start_with(name: &str, attrs: &[(&str, &str)]) -> Self {
        Token::Start {
            name: name.to_string(),
            attrs: attrs
                .iter()
                .map(|(name, value)| Attribute::new(*name, *value))
                .collect(),
        }
    }

    pub fn end(name: &str) -> Self {
        Token::End {
            name: name.to_string(),
        }
    }

    pub fn text(text: &str) -> Self {
        Token::Text(text.to_string())
    }
}

/// Looks up an attribute by local name (`xlink:href` matches `href`).
pub fn attr<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|a| local_name(&a.name).eq_ignore_ascii_case(name))
        .map(|a| a.value.as_str())
}

pub fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Markup token stream for one document item.
///
/// Element names are reported lower-cased and without a namespace prefix.
pub trait TokenSource {
    /// Next parse event. Returns [`Token::Eof`] forever once exhausted.
    /// Errors describe malformed input; callers may keep reading.
    fn next_token(&mut self) -> Result<Token, MarkupError>;

    /// Consumes tokens through the end tag matching the most recent start tag.
    fn skip_subtree(&mut self) -> Result<(), MarkupError> {
        let mut depth = 1usize;
        loop {
            match self.next_token()? {
                Token::Start { .. } => depth += 1,
                Token::End { .. } => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Token::Eof => return Ok(()),
                Token::Text(_) => {}
            }
        }
    }
}

/// A tokenizer-level problem with the markup (bad syntax, bad encoding).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed markup at byte {position}: {message}")]
pub struct MarkupError {
    pub position: u64,
    pub message: String,
}

/// Replays a fixed list of tokens; handy for building documents in code.
#[derive(Debug, Default)]
pub struct VecTokenSource {
    tokens: std::collections::VecDeque<Token>,
}

impl VecTokenSource {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into(),
        }
    }
}

impl TokenSource for VecTokenSource {
    fn next_token(&mut self) -> Result<Token, MarkupError> {
        Ok(self.tokens.pop_front().unwrap_or(Token::Eof))
    }
}
