use std::fmt;

/// A single item read from (or written to) the wire.
///
/// `ListEnd` is only ever produced by [`crate::Reader::next_item`]: it is the
/// sentinel that lets a caller walk a list without knowing its length ahead
/// of time, mirroring the self-describing nature of the encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Number(i64),
    String(Vec<u8>),
    Word(String),
    ListStart,
    ListEnd,
}

impl Item {
    pub fn kind(&self) -> &'static str {
        match self {
            Item::Number(_) => "number",
            Item::String(_) => "string",
            Item::Word(_) => "word",
            Item::ListStart => "list-start",
            Item::ListEnd => "list-end",
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Number(n) => write!(f, "{}", n),
            Item::String(s) => write!(f, "{}:{}", s.len(), String::from_utf8_lossy(s)),
            Item::Word(w) => write!(f, "{}", w),
            Item::ListStart => write!(f, "("),
            Item::ListEnd => write!(f, ")"),
        }
    }
}
