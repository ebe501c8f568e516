use std::io::BufRead;

use crate::error::{Error, Result, MAX_TOKEN_LEN};
use crate::token::Item;

/// Reads the self-describing token stream described by the protocol's
/// encoding: numbers, length-prefixed byte-strings, bare words, and
/// parenthesised lists.
///
/// `Reader` is deliberately hand-rolled rather than built on a parser
/// combinator crate: the grammar is stateful (a byte-string's length is only
/// known after reading its own digits, and the payload that follows must be
/// read verbatim rather than matched against), which does not fit the
/// slice-in/slice-out shape combinator parsers want when the input is a
/// blocking, unbounded socket stream.
pub struct Reader<R> {
    inner: R,
}

impl<R: BufRead> Reader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads the next item from the stream: a number, a byte-string, a word,
    /// or a list delimiter. Skips any run of whitespace that precedes it.
    pub fn next_item(&mut self) -> Result<Item> {
        self.skip_whitespace()?;

        let c = self.peek_byte()?;
        match c {
            b'(' => {
                self.consume_byte()?;
                Ok(Item::ListStart)
            }
            b')' => {
                self.consume_byte()?;
                Ok(Item::ListEnd)
            }
            b'0'..=b'9' => self.read_number_or_string(),
            b'a'..=b'z' | b'A'..=b'Z' => self.read_word(),
            other => Err(Error::Malformed(format!(
                "unexpected byte {:?} at start of token",
                other as char
            ))),
        }
    }

    /// Consumes exactly one well-balanced item, discarding it. If the item is
    /// a list, every item up to and including its matching `)` is consumed.
    pub fn skip_item(&mut self) -> Result<()> {
        match self.next_item()? {
            Item::ListStart => loop {
                self.skip_whitespace()?;
                if self.peek_byte()? == b')' {
                    self.consume_byte()?;
                    return Ok(());
                }
                self.skip_item()?;
            },
            Item::ListEnd => Err(Error::UnbalancedList),
            _ => Ok(()),
        }
    }

    /// Reads an item that must be a bare word.
    pub fn word(&mut self) -> Result<String> {
        match self.next_item()? {
            Item::Word(w) => Ok(w),
            other => Err(Error::UnexpectedItem {
                want: "word",
                have: other.kind().to_string(),
            }),
        }
    }

    /// Reads an item that must be a number.
    pub fn number(&mut self) -> Result<i64> {
        match self.next_item()? {
            Item::Number(n) => Ok(n),
            other => Err(Error::UnexpectedItem {
                want: "number",
                have: other.kind().to_string(),
            }),
        }
    }

    /// Reads an item that must be a byte-string.
    pub fn byte_string(&mut self) -> Result<Vec<u8>> {
        match self.next_item()? {
            Item::String(s) => Ok(s),
            other => Err(Error::UnexpectedItem {
                want: "string",
                have: other.kind().to_string(),
            }),
        }
    }

    /// Reads an item that must open a list.
    pub fn list_start(&mut self) -> Result<()> {
        match self.next_item()? {
            Item::ListStart => Ok(()),
            other => Err(Error::UnexpectedItem {
                want: "list-start",
                have: other.kind().to_string(),
            }),
        }
    }

    /// Reads an item that must close a list.
    pub fn list_end(&mut self) -> Result<()> {
        match self.next_item()? {
            Item::ListEnd => Ok(()),
            other => Err(Error::UnexpectedItem {
                want: "list-end",
                have: other.kind().to_string(),
            }),
        }
    }

    /// True if the next non-whitespace byte closes the list that is
    /// currently being read, without consuming it. Used by the schema reader
    /// to decide whether trailing optional fields are present.
    pub fn at_list_end(&mut self) -> Result<bool> {
        self.skip_whitespace()?;
        Ok(self.peek_byte()? == b')')
    }

    fn read_number_or_string(&mut self) -> Result<Item> {
        let digits = self.read_digits()?;
        if self.peek_byte().ok() == Some(b':') {
            self.consume_byte()?;

            let len: usize = digits
                .parse()
                .map_err(|_| Error::Malformed(format!("invalid string length {:?}", digits)))?;
            if len > MAX_TOKEN_LEN {
                return Err(Error::TokenTooLarge { len });
            }

            let mut buf = vec![0u8; len];
            self.inner.read_exact(&mut buf)?;
            Ok(Item::String(buf))
        } else {
            let n: i64 = digits
                .parse()
                .map_err(|_| Error::Malformed(format!("invalid number {:?}", digits)))?;
            Ok(Item::Number(n))
        }
    }

    fn read_word(&mut self) -> Result<Item> {
        let mut word = String::new();
        loop {
            let c = match self.peek_byte() {
                Ok(c) => c,
                Err(Error::UnexpectedEof) => break,
                Err(e) => return Err(e),
            };

            if c.is_ascii_alphanumeric() || c == b'-' {
                word.push(c as char);
                self.consume_byte()?;
                if word.len() > MAX_TOKEN_LEN {
                    return Err(Error::TokenTooLarge { len: word.len() });
                }
            } else {
                break;
            }
        }

        Ok(Item::Word(word))
    }

    fn read_digits(&mut self) -> Result<String> {
        let mut digits = String::new();
        loop {
            let c = match self.peek_byte() {
                Ok(c) => c,
                Err(Error::UnexpectedEof) => break,
                Err(e) => return Err(e),
            };

            if c.is_ascii_digit() {
                digits.push(c as char);
                self.consume_byte()?;
            } else {
                break;
            }
        }

        if digits.is_empty() {
            Err(Error::Malformed("expected at least one digit".to_string()))
        } else {
            Ok(digits)
        }
    }

    fn skip_whitespace(&mut self) -> Result<()> {
        loop {
            match self.peek_byte() {
                Ok(c) if c == b' ' || c == b'\n' || c == b'\r' || c == b'\t' => {
                    self.consume_byte()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn peek_byte(&mut self) -> Result<u8> {
        let buf = self.inner.fill_buf()?;
        buf.first().copied().ok_or(Error::UnexpectedEof)
    }

    fn consume_byte(&mut self) -> Result<()> {
        self.inner.consume(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn reader(input: &[u8]) -> Reader<Cursor<&[u8]>> {
        Reader::new(Cursor::new(input))
    }

    #[test]
    fn test_word() -> anyhow::Result<()> {
        let mut r = reader(b"success");
        assert_eq!(r.word()?, "success");
        Ok(())
    }

    #[test]
    fn test_number() -> anyhow::Result<()> {
        let mut r = reader(b"42");
        assert_eq!(r.number()?, 42);
        Ok(())
    }

    #[test]
    fn test_byte_string() -> anyhow::Result<()> {
        let mut r = reader(b"5:hello");
        assert_eq!(r.byte_string()?, b"hello");
        Ok(())
    }

    #[test]
    fn test_nested_list_skip() -> anyhow::Result<()> {
        let mut r = reader(b"( success ( 1 2:ab ) ) ");
        r.list_start()?;
        assert_eq!(r.word()?, "success");
        r.skip_item()?;
        r.list_end()?;
        Ok(())
    }

    #[test]
    fn test_unbalanced_list_is_an_error() {
        let mut r = reader(b")");
        assert!(r.skip_item().is_err());
    }

    #[test]
    fn test_oversized_string_is_rejected() {
        let mut r = reader(b"99999999999:short");
        assert!(r.byte_string().is_err());
    }
}
