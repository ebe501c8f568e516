use derive_more::Display;

/// An opaque directory/file handle assigned by the server while streaming an
/// edit script, so that later commands (`close-dir`, `apply-textdelta`, ...)
/// can refer back to an earlier `open-dir`/`add-file` without re-sending the
/// path. Displayed as a bare decimal, the same way the grounding codebase's
/// `git-fast-import` `Mark` displays itself (there as `:N`, here without the
/// leading colon since the wire protocol has no such convention).
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(usize);

/// Hands out sequential [`Token`]s for the lifetime of one edit script.
#[derive(Debug, Default)]
pub struct TokenGenerator {
    next: usize,
}

impl TokenGenerator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn next_token(&mut self) -> Token {
        let token = Token(self.next);
        self.next += 1;
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_sequential_and_distinct() {
        let mut gen = TokenGenerator::new();
        let a = gen.next_token();
        let b = gen.next_token();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "0");
        assert_eq!(b.to_string(), "1");
    }
}
