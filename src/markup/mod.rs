//! Markup token streams feeding the reflow converter.

pub mod token;
pub mod xml;

pub use token::{Attribute, MarkupError, Token, TokenSource, VecTokenSource, attr};
pub use xml::XmlTokenSource;
