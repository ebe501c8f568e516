use globset::Glob;

use crate::error::{Error, Result};

/// One line of a directory's `.svnprops` dotfile: a glob pattern and the
/// properties it contributes to matching file names, e.g.
/// `*.png = svn:mime-type=image/png`.
pub struct AutoPropRule {
    matcher: globset::GlobMatcher,
    pub props: Vec<(String, String)>,
}

impl AutoPropRule {
    pub fn matches(&self, file_name: &str) -> bool {
        self.matcher.is_match(file_name)
    }
}

/// Parses a `.svnprops` file's content into a list of rules, applied in
/// file order (later rules may override earlier ones for the same name).
/// Blank lines and lines starting with `#` are ignored.
pub fn parse(content: &[u8]) -> Result<Vec<AutoPropRule>> {
    let text = String::from_utf8_lossy(content);
    let mut rules = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (pattern, rest) = line
            .split_once('=')
            .ok_or_else(|| Error::MalformedAutoProps(line.to_string()))?;
        let pattern = pattern.trim();
        let matcher = Glob::new(pattern)
            .map_err(|e| Error::MalformedAutoProps(format!("{}: {}", pattern, e)))?
            .compile_matcher();

        let props = rest
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((name, value)) => Ok((name.trim().to_string(), value.trim().to_string())),
                None => Ok((pair.to_string(), String::new())),
            })
            .collect::<Result<Vec<_>>>()?;

        rules.push(AutoPropRule { matcher, props });
    }

    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auto_props() -> anyhow::Result<()> {
        let rules = parse(b"*.png = svn:mime-type=image/png\n*.sh = svn:executable=*\n")?;
        assert_eq!(rules.len(), 2);
        assert!(rules[0].matches("logo.png"));
        assert!(!rules[0].matches("logo.gif"));
        assert_eq!(rules[0].props, vec![("svn:mime-type".to_string(), "image/png".to_string())]);
        Ok(())
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() -> anyhow::Result<()> {
        let rules = parse(b"# a comment\n\n*.txt = svn:mime-type=text/plain\n")?;
        assert_eq!(rules.len(), 1);
        Ok(())
    }
}
