/// A named, bidirectional byte-stream transformer applied when a blob is
/// read out to a client ("to working copy") or written in from one ("to
/// repository"), per the glossary's "content filter" entry.
pub trait ContentFilter: Send + Sync {
    fn name(&self) -> &'static str;
    fn to_working_copy(&self, repository_bytes: &[u8]) -> Vec<u8>;
    fn to_repository(&self, working_copy_bytes: &[u8]) -> Vec<u8>;
}

/// The no-op filter: every regular file goes through this.
#[derive(Debug, Default)]
pub struct IdentityFilter;

impl ContentFilter for IdentityFilter {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn to_working_copy(&self, repository_bytes: &[u8]) -> Vec<u8> {
        repository_bytes.to_vec()
    }

    fn to_repository(&self, working_copy_bytes: &[u8]) -> Vec<u8> {
        working_copy_bytes.to_vec()
    }
}

/// Materialises a symlink tree entry's blob (which Git stores as the raw
/// link target) into the `link <target>` textual form the protocol's
/// cousin implementation uses for `svn:special` files, and back.
#[derive(Debug, Default)]
pub struct SymlinkFilter;

const LINK_PREFIX: &[u8] = b"link ";

impl ContentFilter for SymlinkFilter {
    fn name(&self) -> &'static str {
        "symlink"
    }

    fn to_working_copy(&self, repository_bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(LINK_PREFIX.len() + repository_bytes.len());
        out.extend_from_slice(LINK_PREFIX);
        out.extend_from_slice(repository_bytes);
        out
    }

    fn to_repository(&self, working_copy_bytes: &[u8]) -> Vec<u8> {
        working_copy_bytes
            .strip_prefix(LINK_PREFIX)
            .unwrap_or(working_copy_bytes)
            .to_vec()
    }
}

/// A stand-in for large-object externalisation (glossary). No large-file
/// storage proxy is wired up (§1 excludes third-party hosting integrations),
/// so this filter is presently identity; it exists as a named seam so a
/// real backend can be dropped in without changing callers.
#[derive(Debug, Default)]
pub struct LargeObjectFilter;

impl ContentFilter for LargeObjectFilter {
    fn name(&self) -> &'static str {
        "large-object"
    }

    fn to_working_copy(&self, repository_bytes: &[u8]) -> Vec<u8> {
        repository_bytes.to_vec()
    }

    fn to_repository(&self, working_copy_bytes: &[u8]) -> Vec<u8> {
        working_copy_bytes.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symlink_filter_round_trip() {
        let filter = SymlinkFilter;
        let working = filter.to_working_copy(b"../target");
        assert_eq!(working, b"link ../target");
        assert_eq!(filter.to_repository(&working), b"../target");
    }

    #[test]
    fn test_identity_filter_is_a_no_op() {
        let filter = IdentityFilter;
        assert_eq!(filter.to_working_copy(b"abc"), b"abc");
        assert_eq!(filter.to_repository(b"abc"), b"abc");
    }
}
