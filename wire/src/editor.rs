use std::io::Write;

use crate::error::Result;
use crate::token_gen::Token;
use crate::writer::Writer;

/// A `copy-from` pair attached to an `add-dir`/`add-file` command when the
/// server can prove the new entry originated in an older revision (§4.3).
#[derive(Debug, Clone)]
pub struct CopyFrom {
    pub path: String,
    pub rev: i64,
}

/// A single operation in the tree-structured edit script the delta reporter
/// streams to the client, or the commit editor reads back from it. This is a
/// closed sum (§9: "tagged variants instead of class hierarchies") rather
/// than a trait object per command, matching how the grounding codebase
/// represents `FileCommand` (`Modify` / `Delete` / `Copy` / `Rename` /
/// `DeleteAll`) as one enum instead of a hierarchy.
#[derive(Debug, Clone)]
pub enum EditorCommand {
    TargetRev(i64),
    OpenRoot {
        rev: Option<i64>,
        token: Token,
    },
    DeleteEntry {
        path: String,
        rev: Option<i64>,
        parent_token: Token,
    },
    AddDir {
        path: String,
        parent_token: Token,
        child_token: Token,
        copy_from: Option<CopyFrom>,
    },
    OpenDir {
        path: String,
        parent_token: Token,
        child_token: Token,
        rev: i64,
    },
    AbsentDir {
        path: String,
        parent_token: Token,
    },
    ChangeDirProp {
        token: Token,
        name: String,
        value: Option<Vec<u8>>,
    },
    CloseDir {
        token: Token,
    },
    AddFile {
        path: String,
        parent_token: Token,
        token: Token,
        copy_from: Option<CopyFrom>,
    },
    OpenFile {
        path: String,
        parent_token: Token,
        token: Token,
        rev: i64,
    },
    AbsentFile {
        path: String,
        parent_token: Token,
    },
    ApplyTextDelta {
        token: Token,
        base_checksum: Option<String>,
    },
    TextDeltaChunk {
        token: Token,
        chunk: Vec<u8>,
    },
    TextDeltaEnd {
        token: Token,
    },
    ChangeFileProp {
        token: Token,
        name: String,
        value: Option<Vec<u8>>,
    },
    CloseFile {
        token: Token,
        text_checksum: Option<String>,
    },
    CloseEdit,
    AbortEdit,
}

impl EditorCommand {
    /// Writes the command in wire format: `( word arg1 arg2 ... )`.
    pub fn write<W: Write>(&self, w: &mut Writer<W>) -> Result<()> {
        match self {
            EditorCommand::TargetRev(rev) => self.simple(w, "target-rev", |w| {
                w.number(*rev)?;
                Ok(())
            }),
            EditorCommand::OpenRoot { rev, token } => self.simple(w, "open-root", |w| {
                write_optional_rev(w, *rev)?;
                w.byte_string(token.to_string().as_bytes())?;
                Ok(())
            }),
            EditorCommand::DeleteEntry {
                path,
                rev,
                parent_token,
            } => self.simple(w, "delete-entry", |w| {
                w.byte_string(path.as_bytes())?;
                write_optional_rev(w, *rev)?;
                w.byte_string(parent_token.to_string().as_bytes())?;
                Ok(())
            }),
            EditorCommand::AddDir {
                path,
                parent_token,
                child_token,
                copy_from,
            } => self.simple(w, "add-dir", |w| {
                w.byte_string(path.as_bytes())?;
                w.byte_string(parent_token.to_string().as_bytes())?;
                w.byte_string(child_token.to_string().as_bytes())?;
                write_copy_from(w, copy_from)?;
                Ok(())
            }),
            EditorCommand::OpenDir {
                path,
                parent_token,
                child_token,
                rev,
            } => self.simple(w, "open-dir", |w| {
                w.byte_string(path.as_bytes())?;
                w.byte_string(parent_token.to_string().as_bytes())?;
                w.byte_string(child_token.to_string().as_bytes())?;
                w.number(*rev)?;
                Ok(())
            }),
            EditorCommand::AbsentDir { path, parent_token } => {
                self.simple(w, "absent-dir", |w| {
                    w.byte_string(path.as_bytes())?;
                    w.byte_string(parent_token.to_string().as_bytes())?;
                    Ok(())
                })
            }
            EditorCommand::ChangeDirProp { token, name, value } => {
                self.simple(w, "change-dir-prop", |w| {
                    w.byte_string(token.to_string().as_bytes())?;
                    w.byte_string(name.as_bytes())?;
                    write_optional_prop_value(w, value)?;
                    Ok(())
                })
            }
            EditorCommand::CloseDir { token } => self.simple(w, "close-dir", |w| {
                w.byte_string(token.to_string().as_bytes())?;
                Ok(())
            }),
            EditorCommand::AddFile {
                path,
                parent_token,
                token,
                copy_from,
            } => self.simple(w, "add-file", |w| {
                w.byte_string(path.as_bytes())?;
                w.byte_string(parent_token.to_string().as_bytes())?;
                w.byte_string(token.to_string().as_bytes())?;
                write_copy_from(w, copy_from)?;
                Ok(())
            }),
            EditorCommand::OpenFile {
                path,
                parent_token,
                token,
                rev,
            } => self.simple(w, "open-file", |w| {
                w.byte_string(path.as_bytes())?;
                w.byte_string(parent_token.to_string().as_bytes())?;
                w.byte_string(token.to_string().as_bytes())?;
                w.number(*rev)?;
                Ok(())
            }),
            EditorCommand::AbsentFile { path, parent_token } => {
                self.simple(w, "absent-file", |w| {
                    w.byte_string(path.as_bytes())?;
                    w.byte_string(parent_token.to_string().as_bytes())?;
                    Ok(())
                })
            }
            EditorCommand::ApplyTextDelta {
                token,
                base_checksum,
            } => self.simple(w, "apply-textdelta", |w| {
                w.byte_string(token.to_string().as_bytes())?;
                match base_checksum {
                    Some(sum) => {
                        w.list_start()?;
                        w.byte_string(sum.as_bytes())?;
                        w.list_end()?;
                    }
                    None => {
                        w.list_start()?;
                        w.list_end()?;
                    }
                }
                Ok(())
            }),
            EditorCommand::TextDeltaChunk { token, chunk } => {
                self.simple(w, "textdelta-chunk", |w| {
                    w.byte_string(token.to_string().as_bytes())?;
                    w.byte_string(chunk)?;
                    Ok(())
                })
            }
            EditorCommand::TextDeltaEnd { token } => self.simple(w, "textdelta-end", |w| {
                w.byte_string(token.to_string().as_bytes())?;
                Ok(())
            }),
            EditorCommand::ChangeFileProp { token, name, value } => {
                self.simple(w, "change-file-prop", |w| {
                    w.byte_string(token.to_string().as_bytes())?;
                    w.byte_string(name.as_bytes())?;
                    write_optional_prop_value(w, value)?;
                    Ok(())
                })
            }
            EditorCommand::CloseFile {
                token,
                text_checksum,
            } => self.simple(w, "close-file", |w| {
                w.byte_string(token.to_string().as_bytes())?;
                match text_checksum {
                    Some(sum) => {
                        w.list_start()?;
                        w.byte_string(sum.as_bytes())?;
                        w.list_end()?;
                    }
                    None => {
                        w.list_start()?;
                        w.list_end()?;
                    }
                }
                Ok(())
            }),
            EditorCommand::CloseEdit => self.simple(w, "close-edit", |_| Ok(())),
            EditorCommand::AbortEdit => self.simple(w, "abort-edit", |_| Ok(())),
        }
    }

    fn simple<W: Write, F>(&self, w: &mut Writer<W>, word: &str, body: F) -> Result<()>
    where
        F: FnOnce(&mut Writer<W>) -> Result<()>,
    {
        w.list_start()?;
        w.word(word)?;
        w.list_start()?;
        body(w)?;
        w.list_end()?;
        w.list_end()?;
        Ok(())
    }
}

fn write_optional_rev<W: Write>(w: &mut Writer<W>, rev: Option<i64>) -> Result<()> {
    w.list_start()?;
    if let Some(rev) = rev {
        w.number(rev)?;
    }
    w.list_end()?;
    Ok(())
}

fn write_copy_from<W: Write>(w: &mut Writer<W>, copy_from: &Option<CopyFrom>) -> Result<()> {
    w.list_start()?;
    if let Some(copy_from) = copy_from {
        w.byte_string(copy_from.path.as_bytes())?;
        w.number(copy_from.rev)?;
    }
    w.list_end()?;
    Ok(())
}

fn write_optional_prop_value<W: Write>(w: &mut Writer<W>, value: &Option<Vec<u8>>) -> Result<()> {
    w.list_start()?;
    if let Some(value) = value {
        w.byte_string(value)?;
    }
    w.list_end()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_root_roundtrip_shape() -> anyhow::Result<()> {
        let mut gen = crate::TokenGenerator::new();
        let token = gen.next_token();

        let mut w = Writer::new(Vec::new());
        EditorCommand::OpenRoot {
            rev: Some(0),
            token,
        }
        .write(&mut w)?;

        let out = String::from_utf8(w.into_inner())?;
        assert_eq!(out, "( open-root ( ( 0 ) 1:0 ) ) ");
        Ok(())
    }

    #[test]
    fn test_close_edit_has_no_arguments() -> anyhow::Result<()> {
        let mut w = Writer::new(Vec::new());
        EditorCommand::CloseEdit.write(&mut w)?;
        assert_eq!(w.into_inner(), b"( close-edit ( ) ) ");
        Ok(())
    }
}
