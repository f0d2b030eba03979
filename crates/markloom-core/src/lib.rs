mod block;
mod document;
mod emit;
mod emphasis;
mod error;
mod highlight;
mod html;
mod inline;
mod label;
mod link_table;
mod reader;
mod token;

pub use document::{Document, Options, markdown_to_html};
pub use emit::encode;
pub use error::{DocumentError, Result};
pub use highlight::{Highlighter, PlainHighlighter};
pub use link_table::{LinkTable, LinkTarget};
pub use reader::{Line, LineReader};
pub use token::{
    Anchor, Container, ContainerKind, Encoding, FencedCode, Image, Marker, Text, Token,
};
