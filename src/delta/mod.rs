//! The delta reporter (§4.3): turns a client-supplied working-copy report
//! into a tree-structured edit script against a target revision. Backs
//! `update`, `switch`, `diff`, `status`, `replay` and `replay-range` (§4.2).

mod textdelta;

use std::collections::BTreeMap;
use std::io::Write as IoWrite;
use std::sync::{Arc, Mutex};

use svn_branch::{Engine, PathHistory};
use svn_objstore::{FileMode, ObjectId, Repository, Tree, TreeEntry};
use svn_props::Pipeline;
use svn_wire::{CopyFrom, EditorCommand, Token, TokenGenerator, Writer};

use crate::error::Result;

/// Wc-entry metadata svn clients expect alongside real versioned properties
/// (§4.3). Only the revision is synthesised; last-author/committed-date would
/// need a dependency on a date-formatting crate the rest of the workspace
/// doesn't otherwise need, so they're left for the client to pick up from
/// `log`/`rev-prop` instead.
const ENTRY_COMMITTED_REV: &str = "svn:entry:committed-rev";

const CHUNK_SIZE: usize = 32 * 1024;

/// How deeply a reported path should be compared (§4.3). `Unknown` falls
/// back to `Infinity`, per the resolved open question on missing depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Empty,
    Files,
    Immediates,
    Infinity,
    Unknown,
}

impl Depth {
    pub fn from_word(word: &str) -> Self {
        match word {
            "empty" => Depth::Empty,
            "files" => Depth::Files,
            "immediates" => Depth::Immediates,
            "infinity" => Depth::Infinity,
            _ => Depth::Unknown,
        }
    }

    fn effective(self) -> Depth {
        if matches!(self, Depth::Unknown) {
            Depth::Infinity
        } else {
            self
        }
    }

    /// The depth a subdirectory should be walked at, once we've already
    /// descended one level under `self`.
    fn child_depth(self) -> Depth {
        match self.effective() {
            Depth::Immediates => Depth::Empty,
            other => other,
        }
    }
}

/// One `set-path`/`link-path` entry from the report (§4.3).
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub path: Vec<u8>,
    pub rev: u64,
    pub start_empty: bool,
    pub depth: Depth,
    pub lock_token: Option<String>,
    /// For `link-path`: the path in the *source* tree this entry's content
    /// should be read from instead of `path`.
    pub link_path: Option<Vec<u8>>,
}

/// The fully-parsed report, after `finish-report` (§4.3).
#[derive(Debug, Default)]
pub struct Report {
    entries: Vec<ReportEntry>,
    deleted: Vec<Vec<u8>>,
}

impl Report {
    /// Builds a report directly from its entries, bypassing `read_report`:
    /// used by `replay`/`replay-range` (§4.2 scenario), which synthesise a
    /// single whole-tree entry instead of reading one off the wire.
    pub fn from_entries(entries: Vec<ReportEntry>) -> Self {
        Self {
            entries,
            deleted: Vec::new(),
        }
    }

    /// The entry covering `path` most specifically: the longest reported
    /// prefix of `path`, falling back to the anchor (`""`) entry that every
    /// well-formed report carries.
    fn entry_for(&self, path: &[u8]) -> Option<&ReportEntry> {
        self.entries
            .iter()
            .filter(|e| path == e.path.as_slice() || path.starts_with(&append_slash(&e.path)))
            .max_by_key(|e| e.path.len())
    }

    fn is_deleted(&self, path: &[u8]) -> bool {
        self.deleted.iter().any(|d| d == path)
    }

    /// Whether `path` was named explicitly by a `set-path`/`delete-path`/
    /// `link-path` report entry, or is an ancestor of one (§4.3's "forced
    /// path set" — such a path is always visited regardless of the depth
    /// that would otherwise prune it, and any directory on the way to it
    /// must be opened to reach it).
    fn is_forced(&self, path: &[u8]) -> bool {
        let prefix = append_slash(path);
        self.entries.iter().any(|e| e.path == path || e.path.starts_with(&prefix))
            || self.deleted.iter().any(|d| d == path || d.starts_with(&prefix))
    }
}

fn append_slash(path: &[u8]) -> Vec<u8> {
    if path.is_empty() {
        Vec::new()
    } else {
        let mut v = path.to_vec();
        v.push(b'/');
        v
    }
}

/// Reads report sub-commands off the wire until `finish-report` or
/// `abort-report` (§4.3). Returns `None` if the client aborted.
pub fn read_report<R: std::io::BufRead>(reader: &mut svn_wire::Reader<R>) -> Result<Option<Report>> {
    use svn_wire::{Field, FieldKind};

    let mut report = Report::default();

    loop {
        reader.list_start()?;
        let command = reader.word()?;

        match command.as_str() {
            "set-path" => {
                let schema = [
                    Field::new("path", FieldKind::String),
                    Field::new("rev", FieldKind::Number),
                    Field::new("start-empty", FieldKind::Bool),
                    Field::new("lock-token", FieldKind::optional(FieldKind::String)),
                    Field::new("depth", FieldKind::optional(FieldKind::Word)),
                ];
                let record = svn_wire::read_record(reader, &schema)?;
                report.entries.push(ReportEntry {
                    path: record.required("path")?.as_bytes()?.to_vec(),
                    rev: record.required("rev")?.as_number()? as u64,
                    start_empty: record.required("start-empty")?.as_bool()?,
                    depth: depth_of(&record)?,
                    lock_token: optional_string(&record, "lock-token")?,
                    link_path: None,
                });
            }
            "delete-path" => {
                let schema = [Field::new("path", FieldKind::String)];
                let record = svn_wire::read_record(reader, &schema)?;
                report.deleted.push(record.required("path")?.as_bytes()?.to_vec());
            }
            "link-path" => {
                let schema = [
                    Field::new("path", FieldKind::String),
                    Field::new("url", FieldKind::String),
                    Field::new("rev", FieldKind::Number),
                    Field::new("start-empty", FieldKind::Bool),
                    Field::new("lock-token", FieldKind::optional(FieldKind::String)),
                    Field::new("depth", FieldKind::optional(FieldKind::Word)),
                ];
                let record = svn_wire::read_record(reader, &schema)?;
                report.entries.push(ReportEntry {
                    path: record.required("path")?.as_bytes()?.to_vec(),
                    rev: record.required("rev")?.as_number()? as u64,
                    start_empty: record.required("start-empty")?.as_bool()?,
                    depth: depth_of(&record)?,
                    lock_token: optional_string(&record, "lock-token")?,
                    link_path: Some(path_from_url(record.required("url")?.as_bytes()?)),
                });
            }
            "finish-report" => {
                reader.list_end()?;
                reader.list_end()?;
                return Ok(Some(report));
            }
            "abort-report" => {
                reader.list_end()?;
                reader.list_end()?;
                return Ok(None);
            }
            other => return Err(crate::error::Error::UnknownCommand(other.to_string())),
        }
        reader.list_end()?;
    }
}

fn depth_of(record: &svn_wire::Record) -> Result<Depth> {
    Ok(match record.get("depth")?.as_word() {
        Ok(w) => Depth::from_word(w),
        Err(_) => Depth::Unknown,
    })
}

fn optional_string(record: &svn_wire::Record, name: &'static str) -> Result<Option<String>> {
    match record.get(name)? {
        v if v.is_absent() => Ok(None),
        v => Ok(Some(String::from_utf8_lossy(v.as_bytes()?).into_owned())),
    }
}

fn path_from_url(url: &[u8]) -> Vec<u8> {
    let url = String::from_utf8_lossy(url);
    match url.rsplit_once('!') {
        Some((_, rest)) => rest.trim_start_matches('/').as_bytes().to_vec(),
        None => url.into_owned().into_bytes(),
    }
}

/// Drives the tree-diff between a client's reported working copy and a
/// target revision, streaming the resulting edit script to a
/// `Writer<W>` passed explicitly into [`Driver::drive`].
pub struct Driver<'a> {
    engine: &'a Engine,
    repo: Arc<Mutex<Repository>>,
    history: &'a PathHistory<'a>,
    pipeline: Pipeline<'a>,
    tokens: TokenGenerator,
    target_rev: u64,
    text_deltas: bool,
    compress: bool,
}

impl<'a> Driver<'a> {
    pub fn new(
        engine: &'a Engine,
        history: &'a PathHistory<'a>,
        pipeline: Pipeline<'a>,
        target_rev: u64,
        text_deltas: bool,
        compress: bool,
    ) -> Self {
        Self {
            engine,
            repo: engine.repo(),
            history,
            pipeline,
            tokens: TokenGenerator::new(),
            target_rev,
            text_deltas,
            compress,
        }
    }

    pub fn drive<W: IoWrite>(&mut self, report: &Report, writer: &mut Writer<W>) -> Result<()> {
        let new_root = self.engine.tree_for_revision(self.target_rev)?;

        let anchor = report.entry_for(b"").cloned().unwrap_or(ReportEntry {
            path: Vec::new(),
            rev: 0,
            start_empty: true,
            depth: Depth::Infinity,
            lock_token: None,
            link_path: None,
        });

        EditorCommand::TargetRev(self.target_rev as i64).write(writer)?;

        let root_token = self.tokens.next_token();
        EditorCommand::OpenRoot {
            rev: Some(anchor.rev as i64),
            token: root_token,
        }
        .write(writer)?;

        let old_root = self.old_root_for(&anchor)?;
        let mut body = Writer::new(Vec::new());
        self.diff_dir(report, old_root, new_root, b"", root_token, anchor.depth.effective(), &mut body)?;
        writer.get_mut().write_all(&body.into_inner())?;

        EditorCommand::CloseDir { token: root_token }.write(writer)?;
        EditorCommand::CloseEdit.write(writer)?;
        writer.flush()?;
        Ok(())
    }

    fn old_root_for(&self, entry: &ReportEntry) -> Result<Option<ObjectId>> {
        if entry.start_empty {
            return Ok(None);
        }
        Ok(Some(self.engine.tree_for_revision(entry.rev)?))
    }

    /// The content a client is presumed to already have at `path`, resolved
    /// against whichever report entry covers it most specifically.
    fn old_entry_at(&self, report: &Report, path: &[u8]) -> Result<Option<(FileMode, ObjectId)>> {
        if report.is_deleted(path) {
            return Ok(None);
        }

        let entry = match report.entry_for(path) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        if entry.start_empty {
            return Ok(None);
        }

        let source_path = match &entry.link_path {
            Some(link) => {
                let suffix = &path[entry.path.len()..];
                let mut full = link.clone();
                full.extend_from_slice(suffix);
                full
            }
            None => path.to_vec(),
        };

        let root = self.engine.tree_for_revision(entry.rev)?;
        let repo = self.repo.lock().unwrap();
        svn_branch::resolve(&repo, root, &source_path).map_err(Into::into)
    }

    /// Writes the edit-script commands for `new`'s children (but not `new`'s
    /// own open/close header or directory-property changes: the caller
    /// decides whether those are worth emitting based on whether this
    /// buffer turned out non-empty, §4.3/§9's "header deferral").
    #[allow(clippy::too_many_arguments)]
    fn diff_dir<W: IoWrite>(
        &mut self,
        report: &Report,
        old: Option<ObjectId>,
        new: ObjectId,
        path: &[u8],
        token: Token,
        depth: Depth,
        writer: &mut Writer<W>,
    ) -> Result<()> {
        let repo = Arc::clone(&self.repo);
        let new_entries = repo.lock().unwrap().find_tree(new)?.entries().to_vec();
        let old_entries = match old {
            Some(id) => repo.lock().unwrap().find_tree(id)?.entries().to_vec(),
            None => Vec::new(),
        };

        for new_entry in &new_entries {
            let child_path = join(path, &new_entry.name);
            let forced = report.is_forced(&child_path);
            if matches!(depth, Depth::Empty) && !forced {
                continue;
            }
            if new_entry.mode.is_dir() && matches!(depth, Depth::Files) && !forced {
                continue;
            }

            let old_at_child = self.old_entry_at(report, &child_path)?;
            match old_at_child {
                Some((old_mode, old_id)) if old_mode == new_entry.mode && old_id == new_entry.id => {}
                Some((old_mode, old_id)) if old_mode.is_dir() && new_entry.mode.is_dir() => {
                    self.diff_changed_dir(report, old_id, new_entry, &child_path, token, depth.child_depth(), writer)?;
                }
                Some((old_mode, old_id)) if !old_mode.is_dir() && !new_entry.mode.is_dir() => {
                    self.diff_changed_file(&old_entries, old_mode, old_id, &new_entries, new_entry, &child_path, token, writer)?;
                }
                Some(_) => {
                    EditorCommand::DeleteEntry {
                        path: path_string(&child_path),
                        rev: None,
                        parent_token: token,
                    }
                    .write(writer)?;
                    self.emit_add(report, &new_entries, token, &child_path, new_entry, depth, writer)?;
                }
                None => {
                    self.emit_add(report, &new_entries, token, &child_path, new_entry, depth, writer)?;
                }
            }
        }

        for old_entry in &old_entries {
            let child_path = join(path, &old_entry.name);
            if report.is_deleted(&child_path) {
                continue;
            }
            let forced = report.is_forced(&child_path);
            if matches!(depth, Depth::Empty) && !forced {
                continue;
            }
            if old_entry.mode.is_dir() && matches!(depth, Depth::Files) && !forced {
                continue;
            }
            if !new_entries.iter().any(|e| e.name == old_entry.name) {
                EditorCommand::DeleteEntry {
                    path: path_string(&child_path),
                    rev: None,
                    parent_token: token,
                }
                .write(writer)?;
            }
        }

        Ok(())
    }

    /// A subdirectory present on both sides whose tree id changed. Recurses
    /// into a private buffer first and only opens the directory at all if
    /// that buffer (or the directory's own properties) actually changed.
    #[allow(clippy::too_many_arguments)]
    fn diff_changed_dir<W: IoWrite>(
        &mut self,
        report: &Report,
        old_id: ObjectId,
        new_entry: &TreeEntry,
        child_path: &[u8],
        parent_token: Token,
        child_depth: Depth,
        writer: &mut Writer<W>,
    ) -> Result<()> {
        let child_token = self.tokens.next_token();

        let old_props = self.dir_properties(old_id)?;
        let new_props = self.dir_properties(new_entry.id)?;

        let mut body = Writer::new(Vec::new());
        self.diff_dir(report, Some(old_id), new_entry.id, child_path, child_token, child_depth, &mut body)?;
        let body = body.into_inner();

        if body.is_empty() && old_props == new_props {
            return Ok(());
        }

        let old_rev = self.history.last_change(child_path, self.target_rev).unwrap_or(0).max(0) as i64;
        EditorCommand::OpenDir {
            path: path_string(child_path),
            parent_token,
            child_token,
            rev: old_rev,
        }
        .write(writer)?;
        emit_prop_diff(child_token, &old_props, &new_props, true, writer)?;
        writer.get_mut().write_all(&body)?;
        EditorCommand::CloseDir { token: child_token }.write(writer)?;
        Ok(())
    }

    /// A file present on both sides, same kind, whose mode and/or content
    /// changed: `open-file`, property diff, delta against the real old
    /// content (if the content actually differs), `close-file`.
    #[allow(clippy::too_many_arguments)]
    fn diff_changed_file<W: IoWrite>(
        &mut self,
        old_siblings: &[TreeEntry],
        old_mode: FileMode,
        old_id: ObjectId,
        new_siblings: &[TreeEntry],
        new_entry: &TreeEntry,
        child_path: &[u8],
        parent_token: Token,
        writer: &mut Writer<W>,
    ) -> Result<()> {
        let child_token = self.tokens.next_token();
        let old_rev = self.history.last_change(child_path, self.target_rev).unwrap_or(0).max(0) as i64;

        EditorCommand::OpenFile {
            path: path_string(child_path),
            parent_token,
            token: child_token,
            rev: old_rev,
        }
        .write(writer)?;

        let old_entry = TreeEntry {
            name: new_entry.name.clone(),
            mode: old_mode,
            id: old_id,
        };
        let old_props = self.file_properties(old_siblings, &old_entry)?;
        let new_props = self.file_properties(new_siblings, new_entry)?;
        emit_prop_diff(child_token, &old_props, &new_props, false, writer)?;
        self.emit_entry_props(child_token, child_path, false, writer)?;

        self.stream_file_content(child_token, Some(old_id), new_entry.id, writer)?;
        Ok(())
    }

    fn emit_add<W: IoWrite>(
        &mut self,
        report: &Report,
        siblings: &[TreeEntry],
        parent_token: Token,
        child_path: &[u8],
        entry: &TreeEntry,
        depth: Depth,
        writer: &mut Writer<W>,
    ) -> Result<()> {
        let copy_from = self
            .history
            .copy_from(child_path, self.target_rev)
            .ok()
            .flatten()
            .map(|(path, rev)| CopyFrom {
                path: path_string(&path),
                rev: rev as i64,
            });

        if entry.mode.is_dir() {
            if matches!(depth, Depth::Files) && !report.is_forced(child_path) {
                return Ok(());
            }
            let child_token = self.tokens.next_token();
            EditorCommand::AddDir {
                path: path_string(child_path),
                parent_token,
                child_token,
                copy_from,
            }
            .write(writer)?;
            let new_props = self.dir_properties(entry.id)?;
            emit_prop_diff(child_token, &BTreeMap::new(), &new_props, true, writer)?;
            self.diff_dir(report, None, entry.id, child_path, child_token, depth.child_depth(), writer)?;
            EditorCommand::CloseDir { token: child_token }.write(writer)?;
        } else {
            let child_token = self.tokens.next_token();
            EditorCommand::AddFile {
                path: path_string(child_path),
                parent_token,
                token: child_token,
                copy_from,
            }
            .write(writer)?;
            let new_props = self.file_properties(siblings, entry)?;
            emit_prop_diff(child_token, &BTreeMap::new(), &new_props, false, writer)?;
            self.emit_entry_props(child_token, child_path, false, writer)?;
            self.stream_file_content(child_token, None, entry.id, writer)?;
        }
        Ok(())
    }

    fn dir_properties(&self, tree_id: ObjectId) -> Result<BTreeMap<String, String>> {
        let repo = self.repo.lock().unwrap();
        let tree = repo.find_tree(tree_id)?;
        Ok(self.pipeline.dir_properties(&repo, &tree)?)
    }

    fn file_properties(&self, siblings: &[TreeEntry], entry: &TreeEntry) -> Result<BTreeMap<String, String>> {
        let repo = self.repo.lock().unwrap();
        let dir = Tree::new(siblings.to_vec());
        let auto_props = self.pipeline.auto_props_for_dir(&repo, &dir)?;
        let name = String::from_utf8_lossy(&entry.name).into_owned();
        Ok(self.pipeline.file_properties(&repo, &name, entry, &auto_props)?)
    }

    /// Writes the `svn:entry:*` wc-entry properties a file carries on
    /// `add-file`/`open-file` (§4.3). `is_dir` is accepted for symmetry with
    /// a future directory entry-prop but is currently unused since only
    /// files get one today.
    fn emit_entry_props<W: IoWrite>(&self, token: Token, path: &[u8], _is_dir: bool, writer: &mut Writer<W>) -> Result<()> {
        let rev = self.history.last_change(path, self.target_rev).unwrap_or(0).max(0);
        EditorCommand::ChangeFileProp {
            token,
            name: ENTRY_COMMITTED_REV.to_string(),
            value: Some(rev.to_string().into_bytes()),
        }
        .write(writer)?;
        Ok(())
    }

    fn stream_file_content<W: IoWrite>(
        &mut self,
        token: Token,
        old: Option<ObjectId>,
        new: ObjectId,
        writer: &mut Writer<W>,
    ) -> Result<()> {
        let repo = Arc::clone(&self.repo);
        let new_content = repo.lock().unwrap().read_blob(new)?;
        let needs_delta = old != Some(new);

        if self.text_deltas && needs_delta {
            let old_content = match old {
                Some(id) => repo.lock().unwrap().read_blob(id)?,
                None => Vec::new(),
            };
            let window = textdelta::encode_window(&old_content, &new_content, self.compress);

            EditorCommand::ApplyTextDelta {
                token,
                base_checksum: None,
            }
            .write(writer)?;

            for chunk in window.chunks(CHUNK_SIZE) {
                EditorCommand::TextDeltaChunk {
                    token,
                    chunk: chunk.to_vec(),
                }
                .write(writer)?;
            }
            EditorCommand::TextDeltaEnd { token }.write(writer)?;
        }

        let checksum = md5_hex(&new_content);
        EditorCommand::CloseFile {
            token,
            text_checksum: Some(checksum),
        }
        .write(writer)?;
        Ok(())
    }
}

/// Emits `change-dir-prop`/`change-file-prop` commands for every key added,
/// changed, or removed between `old` and `new` (§4.3).
fn emit_prop_diff<W: IoWrite>(
    token: Token,
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
    is_dir: bool,
    writer: &mut Writer<W>,
) -> Result<()> {
    for (name, value) in new {
        if old.get(name) != Some(value) {
            write_prop_change(token, name.clone(), Some(value.clone().into_bytes()), is_dir, writer)?;
        }
    }
    for name in old.keys() {
        if !new.contains_key(name) {
            write_prop_change(token, name.clone(), None, is_dir, writer)?;
        }
    }
    Ok(())
}

fn write_prop_change<W: IoWrite>(
    token: Token,
    name: String,
    value: Option<Vec<u8>>,
    is_dir: bool,
    writer: &mut Writer<W>,
) -> Result<()> {
    if is_dir {
        EditorCommand::ChangeDirProp { token, name, value }.write(writer)?;
    } else {
        EditorCommand::ChangeFileProp { token, name, value }.write(writer)?;
    }
    Ok(())
}

fn join(parent: &[u8], name: &[u8]) -> Vec<u8> {
    if parent.is_empty() {
        return name.to_vec();
    }
    let mut out = parent.to_vec();
    out.push(b'/');
    out.extend_from_slice(name);
    out
}

fn path_string(path: &[u8]) -> String {
    String::from_utf8_lossy(path).into_owned()
}

fn md5_hex(data: &[u8]) -> String {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use svn_objstore::{FileMode, Signature, TreeEntry};
    use svn_persist::Connection;
    use svn_props::MemoryClassificationCache;

    use super::*;

    fn sig() -> Signature {
        Signature {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            time: std::time::SystemTime::now(),
        }
    }

    fn setup() -> anyhow::Result<(tempfile::TempDir, Engine)> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;

        let blob = repo.insert_blob(b"hello\n")?;
        let tree = repo.insert_tree(&[TreeEntry {
            name: b"README".to_vec(),
            mode: FileMode::Regular,
            id: blob,
        }])?;
        let c1 = repo.insert_commit(&[], tree, &sig(), &sig(), "initial\n")?;
        repo.compare_and_set_ref("refs/heads/trunk", None, c1)?;

        let blob2 = repo.insert_blob(b"hello\nworld\n")?;
        let tree2 = repo.insert_tree(&[TreeEntry {
            name: b"README".to_vec(),
            mode: FileMode::Regular,
            id: blob2,
        }])?;
        let c2 = repo.insert_commit(&[c1], tree2, &sig(), &sig(), "update\n")?;
        repo.compare_and_set_ref("refs/heads/trunk", Some(c1), c2)?;

        let repo = Arc::new(Mutex::new(repo));
        let store = Arc::new(Mutex::new(Connection::open_in_memory()?));
        let engine = Engine::new(repo, store, "trunk");
        engine.sync()?;

        Ok((dir, engine))
    }

    #[test]
    fn test_full_checkout_emits_add_for_every_entry() -> anyhow::Result<()> {
        let (_dir, engine) = setup()?;
        let history = PathHistory::new(&engine, false);
        let cache = MemoryClassificationCache::default();
        let mut driver = Driver::new(&engine, &history, Pipeline::new(&cache), 1, true, false);

        let mut report = Report::default();
        report.entries.push(ReportEntry {
            path: Vec::new(),
            rev: 0,
            start_empty: true,
            depth: Depth::Infinity,
            lock_token: None,
            link_path: None,
        });

        let mut writer = Writer::new(Vec::new());
        driver.drive(&report, &mut writer)?;
        let out = String::from_utf8(writer.into_inner())?;

        assert!(out.contains("add-file"));
        assert!(out.contains("close-edit"));
        Ok(())
    }

    #[test]
    fn test_update_between_revisions_emits_open_file() -> anyhow::Result<()> {
        let (_dir, engine) = setup()?;
        let history = PathHistory::new(&engine, false);
        let cache = MemoryClassificationCache::default();
        let mut driver = Driver::new(&engine, &history, Pipeline::new(&cache), 2, true, false);

        let mut report = Report::default();
        report.entries.push(ReportEntry {
            path: Vec::new(),
            rev: 1,
            start_empty: false,
            depth: Depth::Infinity,
            lock_token: None,
            link_path: None,
        });

        let mut writer = Writer::new(Vec::new());
        driver.drive(&report, &mut writer)?;
        let out = String::from_utf8(writer.into_inner())?;

        assert!(out.contains("apply-textdelta"));
        assert!(!out.contains("add-file"));
        Ok(())
    }

    #[test]
    fn test_executable_flag_change_without_content_change_skips_delta() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;

        let blob = repo.insert_blob(b"#!/bin/sh\necho hi\n")?;
        let tree1 = repo.insert_tree(&[TreeEntry {
            name: b"run.sh".to_vec(),
            mode: FileMode::Regular,
            id: blob,
        }])?;
        let c1 = repo.insert_commit(&[], tree1, &sig(), &sig(), "add\n")?;
        repo.compare_and_set_ref("refs/heads/trunk", None, c1)?;

        let tree2 = repo.insert_tree(&[TreeEntry {
            name: b"run.sh".to_vec(),
            mode: FileMode::Executable,
            id: blob,
        }])?;
        let c2 = repo.insert_commit(&[c1], tree2, &sig(), &sig(), "chmod\n")?;
        repo.compare_and_set_ref("refs/heads/trunk", Some(c1), c2)?;

        let repo = Arc::new(Mutex::new(repo));
        let store = Arc::new(Mutex::new(Connection::open_in_memory()?));
        let engine = Engine::new(repo, store, "trunk");
        engine.sync()?;

        let history = PathHistory::new(&engine, false);
        let cache = MemoryClassificationCache::default();
        let mut driver = Driver::new(&engine, &history, Pipeline::new(&cache), 2, true, false);

        let mut report = Report::default();
        report.entries.push(ReportEntry {
            path: Vec::new(),
            rev: 1,
            start_empty: false,
            depth: Depth::Infinity,
            lock_token: None,
            link_path: None,
        });

        let mut writer = Writer::new(Vec::new());
        driver.drive(&report, &mut writer)?;
        let out = String::from_utf8(writer.into_inner())?;

        assert!(out.contains("change-file-prop"));
        assert!(out.contains("svn:executable"));
        assert!(!out.contains("apply-textdelta"));
        Ok(())
    }

    #[test]
    fn test_new_subdirectory_emits_ignore_property_from_dotfile() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;

        let ignore_blob = repo.insert_blob(b"*.o\n")?;
        let file_blob = repo.insert_blob(b"hi\n")?;
        let sub_tree = repo.insert_tree(&[
            TreeEntry {
                name: b".svnignore".to_vec(),
                mode: FileMode::Regular,
                id: ignore_blob,
            },
            TreeEntry {
                name: b"file.txt".to_vec(),
                mode: FileMode::Regular,
                id: file_blob,
            },
        ])?;
        let root_tree = repo.insert_tree(&[TreeEntry {
            name: b"sub".to_vec(),
            mode: FileMode::Tree,
            id: sub_tree,
        }])?;
        let c1 = repo.insert_commit(&[], root_tree, &sig(), &sig(), "add\n")?;
        repo.compare_and_set_ref("refs/heads/trunk", None, c1)?;

        let repo = Arc::new(Mutex::new(repo));
        let store = Arc::new(Mutex::new(Connection::open_in_memory()?));
        let engine = Engine::new(repo, store, "trunk");
        engine.sync()?;

        let history = PathHistory::new(&engine, false);
        let cache = MemoryClassificationCache::default();
        let mut driver = Driver::new(&engine, &history, Pipeline::new(&cache), 1, true, false);

        let mut report = Report::default();
        report.entries.push(ReportEntry {
            path: Vec::new(),
            rev: 0,
            start_empty: true,
            depth: Depth::Infinity,
            lock_token: None,
            link_path: None,
        });

        let mut writer = Writer::new(Vec::new());
        driver.drive(&report, &mut writer)?;
        let out = String::from_utf8(writer.into_inner())?;

        assert!(out.contains("change-dir-prop"));
        assert!(out.contains("svn:ignore"));
        Ok(())
    }

    #[test]
    fn test_depth_empty_still_visits_a_path_named_in_the_report() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;

        let file_blob = repo.insert_blob(b"hi\n")?;
        let sub_tree = repo.insert_tree(&[TreeEntry {
            name: b"file.txt".to_vec(),
            mode: FileMode::Regular,
            id: file_blob,
        }])?;
        let root_tree = repo.insert_tree(&[TreeEntry {
            name: b"sub".to_vec(),
            mode: FileMode::Tree,
            id: sub_tree,
        }])?;
        let c1 = repo.insert_commit(&[], root_tree, &sig(), &sig(), "add\n")?;
        repo.compare_and_set_ref("refs/heads/trunk", None, c1)?;

        let repo = Arc::new(Mutex::new(repo));
        let store = Arc::new(Mutex::new(Connection::open_in_memory()?));
        let engine = Engine::new(repo, store, "trunk");
        engine.sync()?;

        let history = PathHistory::new(&engine, false);
        let cache = MemoryClassificationCache::default();
        let mut driver = Driver::new(&engine, &history, Pipeline::new(&cache), 1, true, false);

        let mut report = Report::default();
        report.entries.push(ReportEntry {
            path: Vec::new(),
            rev: 0,
            start_empty: true,
            depth: Depth::Empty,
            lock_token: None,
            link_path: None,
        });
        report.entries.push(ReportEntry {
            path: b"sub/file.txt".to_vec(),
            rev: 0,
            start_empty: true,
            depth: Depth::Empty,
            lock_token: None,
            link_path: None,
        });

        let mut writer = Writer::new(Vec::new());
        driver.drive(&report, &mut writer)?;
        let out = String::from_utf8(writer.into_inner())?;

        assert!(out.contains("add-dir"));
        assert!(out.contains("add-file"));
        Ok(())
    }

    #[test]
    fn test_depth_empty_prunes_a_path_not_named_in_the_report() -> anyhow::Result<()> {
        let (_dir, engine) = setup()?;
        let history = PathHistory::new(&engine, false);
        let cache = MemoryClassificationCache::default();
        let mut driver = Driver::new(&engine, &history, Pipeline::new(&cache), 1, true, false);

        let mut report = Report::default();
        report.entries.push(ReportEntry {
            path: Vec::new(),
            rev: 0,
            start_empty: true,
            depth: Depth::Empty,
            lock_token: None,
            link_path: None,
        });

        let mut writer = Writer::new(Vec::new());
        driver.drive(&report, &mut writer)?;
        let out = String::from_utf8(writer.into_inner())?;

        assert!(!out.contains("add-file"));
        Ok(())
    }
}
