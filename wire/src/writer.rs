use std::io::Write;

use crate::error::Result;

/// Writes the token stream described by the protocol's encoding. This is the
/// dual of [`crate::Reader`]: every `write_*` method emits exactly one token,
/// and callers are responsible for balancing [`Writer::list_start`] /
/// [`Writer::list_end`] pairs, exactly as a [`crate::Reader`] caller is
/// responsible for balancing reads.
pub struct Writer<W> {
    inner: W,
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn list_start(&mut self) -> Result<&mut Self> {
        write!(self.inner, "( ")?;
        Ok(self)
    }

    pub fn list_end(&mut self) -> Result<&mut Self> {
        write!(self.inner, ") ")?;
        Ok(self)
    }

    pub fn number(&mut self, n: i64) -> Result<&mut Self> {
        write!(self.inner, "{} ", n)?;
        Ok(self)
    }

    pub fn byte_string(&mut self, s: &[u8]) -> Result<&mut Self> {
        write!(self.inner, "{}:", s.len())?;
        self.inner.write_all(s)?;
        write!(self.inner, " ")?;
        Ok(self)
    }

    pub fn word(&mut self, w: &str) -> Result<&mut Self> {
        write!(self.inner, "{} ", w)?;
        Ok(self)
    }

    pub fn boolean(&mut self, b: bool) -> Result<&mut Self> {
        self.word(if b { "true" } else { "false" })
    }

    /// Writes a `success` response list wrapping the items emitted by `body`.
    pub fn success<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.list_start()?;
        self.word("success")?;
        self.list_start()?;
        body(self)?;
        self.list_end()?;
        self.list_end()?;
        Ok(())
    }

    /// Writes a `failure` response carrying one or more `(code msg file
    /// line)` error records, per §7.
    pub fn failure(&mut self, errors: &[crate::ProtocolError]) -> Result<()> {
        self.list_start()?;
        self.word("failure")?;
        self.list_start()?;
        for err in errors {
            self.list_start()?;
            self.number(err.code)?;
            self.byte_string(err.message.as_bytes())?;
            self.byte_string(err.file.as_deref().unwrap_or("").as_bytes())?;
            self.number(err.line.unwrap_or(0) as i64)?;
            self.list_end()?;
        }
        self.list_end()?;
        self.list_end()?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.inner.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_scalar_tokens() -> anyhow::Result<()> {
        let mut w = Writer::new(Vec::new());
        w.list_start()?.word("success")?.number(42)?.byte_string(b"hi")?.list_end()?;
        assert_eq!(w.into_inner(), b"( success 42 2:hi ) ");
        Ok(())
    }

    #[test]
    fn test_write_success_envelope() -> anyhow::Result<()> {
        let mut w = Writer::new(Vec::new());
        w.success(|w| w.word("dir").map(|_| ()))?;
        assert_eq!(w.into_inner(), b"( success ( dir ) ) ");
        Ok(())
    }
}
