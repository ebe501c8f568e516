//! The commit editor (§4.4): the write path. The client drives the same
//! tree-structured edit-script vocabulary the delta reporter speaks (§4.3),
//! but in the opposite direction — the server reads commands instead of
//! writing them — over an in-memory tree overlay keyed by tokens the client
//! chooses itself, not the server's own [`svn_wire::Token`].
//!
//! `EditorCommand::write` wraps each optional argument (`rev`, `copy-from`,
//! `base-checksum`, `text-checksum`, a prop's `value`) in its own
//! zero-or-one-item sublist, a shape the generic [`svn_wire::read_record`]
//! schema doesn't model (it only knows trailing-optional fields, not
//! optional fields wrapped in their own list). So this module parses
//! commands by hand, mirroring `EditorCommand::write`'s shapes directly
//! against [`svn_wire::Reader`]'s primitives.

use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::time::SystemTime;

use svn_branch::paths;
use svn_hooks::HookKind;
use svn_objstore::{FileMode, ObjectId, Signature, TreeEntry};
use svn_props::property_names;
use svn_wire::Reader;

use crate::delta::textdelta;
use crate::error::{Error, Result};
use crate::shared::RepoContext;

/// The outcome of a successful commit (§4.4's `success((new-rev, ...))`
/// reply).
#[derive(Debug, Clone)]
pub struct CommitResult {
    pub new_rev: u64,
    pub timestamp: SystemTime,
    pub author: String,
    /// Set only if the post-commit hook ran and failed: the commit itself
    /// already landed, so this is reported rather than turned into an error
    /// (§4.4a: "post-commit failures are surfaced, not rolled back").
    pub post_commit_error: Option<String>,
}

enum NodeBody {
    Dir(DirNode),
    File(FileNode),
}

struct DirNode {
    base: Option<ObjectId>,
    changes: BTreeMap<Vec<u8>, ChildChange>,
}

#[derive(Clone, Copy)]
enum ChildChange {
    Upsert(usize),
    Remove,
}

struct FileNode {
    base: Option<(FileMode, ObjectId)>,
    mode: FileMode,
    content: Option<Vec<u8>>,
    pending: Option<PendingDelta>,
    resolved: Option<ObjectId>,
}

struct PendingDelta {
    base_content: Vec<u8>,
    window: Vec<u8>,
}

/// The mutable arena tree built up as the client streams its edit script,
/// rooted at `base_root` (the tip at the time the commit started). Every
/// client-chosen token names a slot in `arena` via `tokens`.
struct Editor<'a> {
    context: &'a RepoContext,
    base_root: ObjectId,
    arena: Vec<NodeBody>,
    tokens: HashMap<String, usize>,
    root: Option<usize>,
}

fn unknown_token(token: &str) -> Error {
    svn_wire::Error::Malformed(format!("reference to unopened token {:?}", token)).into()
}

fn path_lossy(path: &[u8]) -> String {
    String::from_utf8_lossy(path).into_owned()
}

fn child_name(path: &[u8]) -> Vec<u8> {
    paths::split_parent(path).map(|(_, name)| name).unwrap_or_default()
}

impl<'a> Editor<'a> {
    fn new(context: &'a RepoContext, base_root: ObjectId) -> Self {
        Self {
            context,
            base_root,
            arena: Vec::new(),
            tokens: HashMap::new(),
            root: None,
        }
    }

    fn push(&mut self, body: NodeBody) -> usize {
        self.arena.push(body);
        self.arena.len() - 1
    }

    fn dir_mut(&mut self, token: &str) -> Result<&mut DirNode> {
        let idx = *self.tokens.get(token).ok_or_else(|| unknown_token(token))?;
        match &mut self.arena[idx] {
            NodeBody::Dir(d) => Ok(d),
            NodeBody::File(_) => Err(Error::NotDirectory(token.to_string())),
        }
    }

    fn file_mut(&mut self, token: &str) -> Result<&mut FileNode> {
        let idx = *self.tokens.get(token).ok_or_else(|| unknown_token(token))?;
        match &mut self.arena[idx] {
            NodeBody::File(f) => Ok(f),
            NodeBody::Dir(_) => Err(Error::NotFile(token.to_string())),
        }
    }

    /// Resolves `path` against the base revision's root (§4.4: `open-dir`
    /// and `open-file` always refer back to the commit's starting point,
    /// never to another node still open in this same edit).
    fn resolve_base(&self, path: &[u8]) -> Result<Option<(FileMode, ObjectId)>> {
        let repo = self.context.repo.lock().unwrap();
        Ok(svn_branch::resolve(&repo, self.base_root, path)?)
    }

    fn resolve_copy_from(&self, path: &str, rev: i64) -> Result<(FileMode, ObjectId)> {
        let root = self.context.engine.tree_for_revision(rev.max(0) as u64)?;
        let repo = self.context.repo.lock().unwrap();
        svn_branch::resolve(&repo, root, path.as_bytes())?.ok_or_else(|| Error::NotFound(path.to_string()))
    }

    fn open_root(&mut self, base_rev: u64, token: String) -> Result<()> {
        let base = if base_rev == 0 { None } else { Some(self.base_root) };
        let idx = self.push(NodeBody::Dir(DirNode {
            base,
            changes: BTreeMap::new(),
        }));
        self.root = Some(idx);
        self.tokens.insert(token, idx);
        Ok(())
    }

    fn delete_entry(&mut self, path: &[u8], parent: &str) -> Result<()> {
        self.dir_mut(parent)?.changes.insert(child_name(path), ChildChange::Remove);
        Ok(())
    }

    fn add_dir(&mut self, path: &[u8], parent: &str, child: &str, copy_from: Option<(String, i64)>) -> Result<()> {
        let base = match copy_from {
            Some((src_path, src_rev)) => match self.resolve_copy_from(&src_path, src_rev)? {
                (mode, id) if mode.is_dir() => Some(id),
                _ => return Err(Error::NotDirectory(src_path)),
            },
            None => None,
        };

        let idx = self.push(NodeBody::Dir(DirNode {
            base,
            changes: BTreeMap::new(),
        }));
        self.tokens.insert(child.to_string(), idx);
        self.dir_mut(parent)?.changes.insert(child_name(path), ChildChange::Upsert(idx));
        Ok(())
    }

    fn open_dir(&mut self, path: &[u8], parent: &str, child: &str) -> Result<()> {
        let (mode, id) = self.resolve_base(path)?.ok_or_else(|| Error::NotFound(path_lossy(path)))?;
        if !mode.is_dir() {
            return Err(Error::NotDirectory(path_lossy(path)));
        }

        let idx = self.push(NodeBody::Dir(DirNode {
            base: Some(id),
            changes: BTreeMap::new(),
        }));
        self.tokens.insert(child.to_string(), idx);
        self.dir_mut(parent)?.changes.insert(child_name(path), ChildChange::Upsert(idx));
        Ok(())
    }

    fn add_file(&mut self, path: &[u8], parent: &str, token: &str, copy_from: Option<(String, i64)>) -> Result<()> {
        let base = match copy_from {
            Some((src_path, src_rev)) => match self.resolve_copy_from(&src_path, src_rev)? {
                (mode, id) if !mode.is_dir() => Some((mode, id)),
                _ => return Err(Error::NotFile(src_path)),
            },
            None => None,
        };
        let mode = base.map(|(m, _)| m).unwrap_or(FileMode::Regular);

        let idx = self.push(NodeBody::File(FileNode {
            base,
            mode,
            content: None,
            pending: None,
            resolved: None,
        }));
        self.tokens.insert(token.to_string(), idx);
        self.dir_mut(parent)?.changes.insert(child_name(path), ChildChange::Upsert(idx));
        Ok(())
    }

    fn open_file(&mut self, path: &[u8], parent: &str, token: &str) -> Result<()> {
        let (mode, id) = self.resolve_base(path)?.ok_or_else(|| Error::NotFound(path_lossy(path)))?;
        if mode.is_dir() {
            return Err(Error::NotFile(path_lossy(path)));
        }

        let idx = self.push(NodeBody::File(FileNode {
            base: Some((mode, id)),
            mode,
            content: None,
            pending: None,
            resolved: None,
        }));
        self.tokens.insert(token.to_string(), idx);
        self.dir_mut(parent)?.changes.insert(child_name(path), ChildChange::Upsert(idx));
        Ok(())
    }

    /// Only `svn:ignore` has a durable effect: it's synthesised as a
    /// `.svnignore` child, the same dotfile the read-side pipeline sources
    /// it from (§4.6's property write-back scoping; see DESIGN.md). Every
    /// other directory property is accepted and silently dropped — there is
    /// no side-channel property table in a content-addressed store to put
    /// it in.
    fn change_dir_prop(&mut self, token: &str, name: &str, value: Option<Vec<u8>>) -> Result<()> {
        if name != property_names::IGNORE {
            return Ok(());
        }

        match value {
            Some(content) => {
                let idx = self.push(NodeBody::File(FileNode {
                    base: None,
                    mode: FileMode::Regular,
                    content: Some(content),
                    pending: None,
                    resolved: None,
                }));
                self.dir_mut(token)?.changes.insert(b".svnignore".to_vec(), ChildChange::Upsert(idx));
            }
            None => {
                self.dir_mut(token)?.changes.insert(b".svnignore".to_vec(), ChildChange::Remove);
            }
        }
        Ok(())
    }

    /// Only `svn:executable`/`svn:special` round-trip, as mode bits on the
    /// tree entry (§4.6). Everything else — `svn:mime-type`, `svn:externals`,
    /// custom properties — is accepted without error but not persisted; a
    /// subsequent checkout re-derives what it can from content alone.
    fn change_file_prop(&mut self, token: &str, name: &str, value: Option<Vec<u8>>) -> Result<()> {
        let file = self.file_mut(token)?;
        match name {
            property_names::EXECUTABLE => {
                file.mode = if value.is_some() { FileMode::Executable } else { FileMode::Regular };
            }
            property_names::SPECIAL => {
                file.mode = if value.is_some() { FileMode::Symlink } else { FileMode::Regular };
            }
            _ => {}
        }
        Ok(())
    }

    fn begin_delta(&mut self, token: &str) -> Result<()> {
        let base_id = self.file_mut(token)?.base.map(|(_, id)| id);
        let base_content = match base_id {
            Some(id) => self.context.repo.lock().unwrap().read_blob(id)?,
            None => Vec::new(),
        };
        self.file_mut(token)?.pending = Some(PendingDelta {
            base_content,
            window: Vec::new(),
        });
        Ok(())
    }

    fn append_delta_chunk(&mut self, token: &str, chunk: Vec<u8>) -> Result<()> {
        let file = self.file_mut(token)?;
        let pending = file
            .pending
            .as_mut()
            .ok_or_else(|| svn_wire::Error::Malformed(format!("textdelta-chunk with no open window on {:?}", token)))?;
        pending.window.extend_from_slice(&chunk);
        Ok(())
    }

    fn end_delta(&mut self, token: &str) -> Result<()> {
        let file = self.file_mut(token)?;
        let pending = file
            .pending
            .take()
            .ok_or_else(|| svn_wire::Error::Malformed(format!("textdelta-end with no open window on {:?}", token)))?;
        file.content = Some(textdelta::apply_window(&pending.base_content, &pending.window));
        Ok(())
    }

    fn close_dir(&mut self, token: &str) -> Result<()> {
        self.dir_mut(token)?;
        Ok(())
    }

    fn close_file(&mut self, token: &str, text_checksum: Option<String>) -> Result<()> {
        let idx = *self.tokens.get(token).ok_or_else(|| unknown_token(token))?;
        let (content, base) = match &self.arena[idx] {
            NodeBody::File(f) => (f.content.clone(), f.base),
            NodeBody::Dir(_) => return Err(Error::NotFile(token.to_string())),
        };

        let resolved = match content {
            Some(bytes) => {
                if let Some(expected) = &text_checksum {
                    let actual = md5_hex(&bytes);
                    if &actual != expected {
                        return Err(Error::ChecksumMismatch(token.to_string()));
                    }
                }
                self.context.repo.lock().unwrap().insert_blob(&bytes)?
            }
            None => match base {
                Some((_, id)) => id,
                None => self.context.repo.lock().unwrap().insert_blob(b"")?,
            },
        };

        if let NodeBody::File(f) = &mut self.arena[idx] {
            f.resolved = Some(resolved);
        }
        Ok(())
    }

    /// Serialises the whole overlay into real tree objects, post-order
    /// (§4.4: "serialised into new tree objects, post-order, once the whole
    /// edit script has been read").
    fn finish(&mut self) -> Result<ObjectId> {
        let idx = self
            .root
            .ok_or_else(|| svn_wire::Error::Malformed("commit never sent open-root".to_string()))?;
        let (mode, id) = self.serialize(idx)?;
        debug_assert!(mode.is_dir());
        Ok(id)
    }

    fn serialize(&mut self, idx: usize) -> Result<(FileMode, ObjectId)> {
        match &self.arena[idx] {
            NodeBody::File(f) => {
                let id = f
                    .resolved
                    .ok_or_else(|| svn_wire::Error::Malformed("file opened but never closed".to_string()))?;
                Ok((f.mode, id))
            }
            NodeBody::Dir(_) => self.serialize_dir(idx),
        }
    }

    fn serialize_dir(&mut self, idx: usize) -> Result<(FileMode, ObjectId)> {
        let (base, changes) = match &self.arena[idx] {
            NodeBody::Dir(d) => (d.base, d.changes.clone()),
            NodeBody::File(_) => unreachable!("serialize_dir called on a file node"),
        };

        let mut entries: BTreeMap<Vec<u8>, TreeEntry> = BTreeMap::new();
        if let Some(base_id) = base {
            let tree = self.context.repo.lock().unwrap().find_tree(base_id)?;
            for entry in tree.entries() {
                entries.insert(entry.name.clone(), entry.clone());
            }
        }

        for (name, change) in changes {
            match change {
                ChildChange::Remove => {
                    entries.remove(&name);
                }
                ChildChange::Upsert(child_idx) => {
                    let (mode, id) = self.serialize(child_idx)?;
                    entries.insert(name.clone(), TreeEntry { name, mode, id });
                }
            }
        }

        let ordered: Vec<TreeEntry> = entries.into_values().collect();
        let tree_id = self.context.repo.lock().unwrap().insert_tree(&ordered)?;
        Ok((FileMode::Tree, tree_id))
    }
}

fn md5_hex(data: &[u8]) -> String {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn read_optional_number<R: BufRead>(reader: &mut Reader<R>) -> Result<Option<i64>> {
    reader.list_start()?;
    let value = if reader.at_list_end()? { None } else { Some(reader.number()?) };
    reader.list_end()?;
    Ok(value)
}

fn read_copy_from<R: BufRead>(reader: &mut Reader<R>) -> Result<Option<(String, i64)>> {
    reader.list_start()?;
    let value = if reader.at_list_end()? {
        None
    } else {
        let path = String::from_utf8_lossy(&reader.byte_string()?).into_owned();
        let rev = reader.number()?;
        Some((path, rev))
    };
    reader.list_end()?;
    Ok(value)
}

fn read_optional_checksum<R: BufRead>(reader: &mut Reader<R>) -> Result<Option<String>> {
    reader.list_start()?;
    let value = if reader.at_list_end()? {
        None
    } else {
        Some(String::from_utf8_lossy(&reader.byte_string()?).into_owned())
    };
    reader.list_end()?;
    Ok(value)
}

fn read_optional_prop_value<R: BufRead>(reader: &mut Reader<R>) -> Result<Option<Vec<u8>>> {
    reader.list_start()?;
    let value = if reader.at_list_end()? { None } else { Some(reader.byte_string()?) };
    reader.list_end()?;
    Ok(value)
}

fn read_token<R: BufRead>(reader: &mut Reader<R>) -> Result<String> {
    Ok(String::from_utf8_lossy(&reader.byte_string()?).into_owned())
}

/// Reads commands off the wire until `close-edit`/`abort-edit`, driving
/// `editor` as it goes. Returns `true` if the edit completed, `false` if the
/// client aborted it.
fn read_commands<R: BufRead>(reader: &mut Reader<R>, editor: &mut Editor, base_rev: u64) -> Result<bool> {
    loop {
        reader.list_start()?;
        let word = reader.word()?;
        reader.list_start()?;

        let mut done = None;
        match word.as_str() {
            "target-rev" => {
                reader.number()?;
            }
            "open-root" => {
                read_optional_number(reader)?;
                let token = read_token(reader)?;
                editor.open_root(base_rev, token)?;
            }
            "delete-entry" => {
                let path = reader.byte_string()?;
                read_optional_number(reader)?;
                let parent = read_token(reader)?;
                editor.delete_entry(&path, &parent)?;
            }
            "add-dir" => {
                let path = reader.byte_string()?;
                let parent = read_token(reader)?;
                let child = read_token(reader)?;
                let copy_from = read_copy_from(reader)?;
                editor.add_dir(&path, &parent, &child, copy_from)?;
            }
            "open-dir" => {
                let path = reader.byte_string()?;
                let parent = read_token(reader)?;
                let child = read_token(reader)?;
                reader.number()?;
                editor.open_dir(&path, &parent, &child)?;
            }
            "change-dir-prop" => {
                let token = read_token(reader)?;
                let name = read_token(reader)?;
                let value = read_optional_prop_value(reader)?;
                editor.change_dir_prop(&token, &name, value)?;
            }
            "close-dir" => {
                let token = read_token(reader)?;
                editor.close_dir(&token)?;
            }
            "add-file" => {
                let path = reader.byte_string()?;
                let parent = read_token(reader)?;
                let token = read_token(reader)?;
                let copy_from = read_copy_from(reader)?;
                editor.add_file(&path, &parent, &token, copy_from)?;
            }
            "open-file" => {
                let path = reader.byte_string()?;
                let parent = read_token(reader)?;
                let token = read_token(reader)?;
                reader.number()?;
                editor.open_file(&path, &parent, &token)?;
            }
            "apply-textdelta" => {
                let token = read_token(reader)?;
                read_optional_checksum(reader)?;
                editor.begin_delta(&token)?;
            }
            "textdelta-chunk" => {
                let token = read_token(reader)?;
                let chunk = reader.byte_string()?;
                editor.append_delta_chunk(&token, chunk)?;
            }
            "textdelta-end" => {
                let token = read_token(reader)?;
                editor.end_delta(&token)?;
            }
            "change-file-prop" => {
                let token = read_token(reader)?;
                let name = read_token(reader)?;
                let value = read_optional_prop_value(reader)?;
                editor.change_file_prop(&token, &name, value)?;
            }
            "close-file" => {
                let token = read_token(reader)?;
                let checksum = read_optional_checksum(reader)?;
                editor.close_file(&token, checksum)?;
            }
            "close-edit" => done = Some(true),
            "abort-edit" => done = Some(false),
            other => return Err(Error::UnknownCommand(other.to_string())),
        }

        reader.list_end()?;
        reader.list_end()?;

        if let Some(completed) = done {
            return Ok(completed);
        }
    }
}

/// Runs one `commit` end to end (§4.4): reads the client's edit script,
/// builds and serialises the resulting tree, creates a commit on top of the
/// branch's current tip, and compare-and-sets the branch ref onto it —
/// gated by the pre-commit hook and followed by the (non-blocking)
/// post-commit hook. Serialises with every other commit against the same
/// repository via `context.commit_lock`.
pub fn run<R: BufRead>(
    context: &RepoContext,
    author: &str,
    log_message: &str,
    lock_tokens: &[(Vec<u8>, Option<String>)],
    reader: &mut Reader<R>,
) -> Result<CommitResult> {
    let _commit_guard = context.commit_lock.lock().unwrap();

    let base_rev = context.engine.latest_revision()?;
    let base_root = context.engine.tree_for_revision(base_rev)?;
    let prior_commit = context.engine.commit_id_for_revision(base_rev)?;

    let mut editor = Editor::new(context, base_root);
    if !read_commands(reader, &mut editor, base_rev)? {
        return Err(Error::RequestCancelled);
    }
    let new_tree = editor.finish()?;

    let modified_paths: Vec<Vec<u8>> = {
        let repo = context.repo.lock().unwrap();
        crate::treediff::changed_paths(&repo, base_root, new_tree)?
            .into_iter()
            .map(|(path, _)| path)
            .collect()
    };
    context.locks.check_commit_tokens(author, &modified_paths, lock_tokens)?;

    let now = SystemTime::now();
    let signature = Signature {
        name: author.to_string(),
        email: format!("{}@svnbridge.local", author),
        time: now,
    };

    let parents: Vec<ObjectId> = prior_commit.into_iter().collect();
    let new_commit = {
        let repo = context.repo.lock().unwrap();
        repo.insert_commit(&parents, new_tree, &signature, &signature, log_message)?
    };

    let pre_commit = context.hooks.run(
        HookKind::PreCommit,
        &[new_commit.to_hex()],
        &[("SVN_AUTHOR", author)],
    )?;
    if pre_commit.ran && !pre_commit.success {
        return Err(Error::HookFailure);
    }

    let updated = {
        let repo = context.repo.lock().unwrap();
        repo.compare_and_set_ref(context.engine.ref_name(), prior_commit, new_commit)?
    };
    if !updated {
        return Err(Error::Conflict);
    }

    let new_rev = context.engine.sync()?;

    let post_commit_error = match context
        .hooks
        .run(HookKind::PostCommit, &[new_commit.to_hex()], &[("SVN_AUTHOR", author)])
    {
        Ok(outcome) if outcome.ran && !outcome.success => Some("post-commit hook reported failure".to_string()),
        Ok(_) => None,
        Err(e) => Some(e.to_string()),
    };

    Ok(CommitResult {
        new_rev,
        timestamp: now,
        author: author.to_string(),
        post_commit_error,
    })
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Cursor};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use svn_branch::Engine;
    use svn_objstore::Repository;
    use svn_persist::Connection;
    use svn_wire::Writer;

    use super::*;
    use crate::locks::LockRegistry;
    use crate::shared::PersistClassificationCache;

    fn context(dir: &std::path::Path) -> RepoContext {
        let repo = Repository::init_bare(dir).unwrap();
        let repo = Arc::new(Mutex::new(repo));
        let store = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let engine = Engine::new(Arc::clone(&repo), Arc::clone(&store), "trunk");
        engine.sync().unwrap();

        RepoContext {
            repo,
            store: Arc::clone(&store),
            engine,
            cache: PersistClassificationCache { store: Arc::clone(&store) },
            hooks: svn_hooks::HookRunner::new(dir.join("hooks"), Duration::from_secs(5)),
            rename_detection: true,
            locks: LockRegistry::new(store, "trunk".to_string()),
            commit_lock: Mutex::new(()),
            uuid: "00000000-0000-0000-0000-000000000000".to_string(),
        }
    }

    /// Writes one editor command in the `( word ( args... ) )` shape every
    /// `EditorCommand::write` variant uses, so tests build real wire bytes
    /// via `Writer`'s primitives instead of hand-typing binary delta
    /// windows inside string literals.
    fn write_command<F>(writer: &mut Writer<Vec<u8>>, word: &str, body: F) -> svn_wire::Result<()>
    where
        F: FnOnce(&mut Writer<Vec<u8>>) -> svn_wire::Result<()>,
    {
        writer.list_start()?;
        writer.word(word)?;
        writer.list_start()?;
        body(writer)?;
        writer.list_end()?;
        writer.list_end()?;
        Ok(())
    }

    fn empty_optional(writer: &mut Writer<Vec<u8>>) -> svn_wire::Result<()> {
        writer.list_start()?;
        writer.list_end()?;
        Ok(())
    }

    fn reader_for(bytes: Vec<u8>) -> Reader<BufReader<Cursor<Vec<u8>>>> {
        Reader::new(BufReader::new(Cursor::new(bytes)))
    }

    /// Builds an edit script adding a single file `name` with content
    /// `content`, closing it with `checksum` (the real md5 of `content` if
    /// `None`).
    fn single_file_add(name: &[u8], content: &[u8], checksum: Option<String>) -> anyhow::Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());

        write_command(&mut writer, "open-root", |w| {
            empty_optional(w)?;
            w.byte_string(b"0")?;
            Ok(())
        })?;
        write_command(&mut writer, "add-file", |w| {
            w.byte_string(name)?;
            w.byte_string(b"0")?;
            w.byte_string(b"1")?;
            empty_optional(w)?;
            Ok(())
        })?;
        write_command(&mut writer, "apply-textdelta", |w| {
            w.byte_string(b"1")?;
            empty_optional(w)?;
            Ok(())
        })?;
        let window = textdelta::encode_window(b"", content, false);
        write_command(&mut writer, "textdelta-chunk", |w| {
            w.byte_string(b"1")?;
            w.byte_string(&window)?;
            Ok(())
        })?;
        write_command(&mut writer, "textdelta-end", |w| {
            w.byte_string(b"1")?;
            Ok(())
        })?;
        write_command(&mut writer, "close-file", |w| {
            w.byte_string(b"1")?;
            let sum = checksum.clone().unwrap_or_else(|| md5_hex(content));
            w.list_start()?;
            w.byte_string(sum.as_bytes())?;
            w.list_end()?;
            Ok(())
        })?;
        write_command(&mut writer, "close-dir", |w| {
            w.byte_string(b"0")?;
            Ok(())
        })?;
        write_command(&mut writer, "close-edit", |_| Ok(()))?;

        Ok(writer.into_inner())
    }

    #[test]
    fn test_commit_adds_a_new_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = context(dir.path());

        let wire = single_file_add(b"hello.txt", b"hello", None)?;
        let mut reader = reader_for(wire);

        let result = run(&ctx, "alice", "add hello\n", &[], &mut reader)?;
        assert_eq!(result.new_rev, 1);
        assert_eq!(result.author, "alice");
        assert!(result.post_commit_error.is_none());

        let tree = ctx.engine.tree_for_revision(1)?;
        let repo = ctx.repo.lock().unwrap();
        let entry = repo.find_tree(tree)?.get(b"hello.txt").cloned().unwrap();
        assert_eq!(repo.read_blob(entry.id)?, b"hello");
        Ok(())
    }

    #[test]
    fn test_commit_without_open_root_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = context(dir.path());

        let mut writer = Writer::new(Vec::new());
        write_command(&mut writer, "close-edit", |_| Ok(()))?;
        let mut reader = reader_for(writer.into_inner());

        assert!(run(&ctx, "alice", "empty\n", &[], &mut reader).is_err());
        Ok(())
    }

    #[test]
    fn test_abort_edit_is_reported_as_cancelled() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = context(dir.path());

        let mut writer = Writer::new(Vec::new());
        write_command(&mut writer, "open-root", |w| {
            empty_optional(w)?;
            w.byte_string(b"0")?;
            Ok(())
        })?;
        write_command(&mut writer, "abort-edit", |_| Ok(()))?;
        let mut reader = reader_for(writer.into_inner());

        let err = run(&ctx, "alice", "nvm\n", &[], &mut reader).unwrap_err();
        assert!(matches!(err, Error::RequestCancelled));
        Ok(())
    }

    #[test]
    fn test_checksum_mismatch_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = context(dir.path());

        let wire = single_file_add(b"a", b"x", Some("0".repeat(32)))?;
        let mut reader = reader_for(wire);

        let err = run(&ctx, "alice", "bad checksum\n", &[], &mut reader).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch(_)));
        Ok(())
    }

    #[test]
    fn test_committing_over_a_locked_path_without_its_token_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = context(dir.path());
        ctx.locks.lock(
            "bob",
            &[crate::locks::LockTarget {
                path: b"/a".to_vec(),
                current_rev: None,
            }],
            None,
            false,
        )?;

        let wire = single_file_add(b"a", b"hello", None)?;
        let mut reader = reader_for(wire);

        let err = run(&ctx, "alice", "msg\n", &[], &mut reader).unwrap_err();
        assert!(matches!(err, Error::NoUser(_)));
        Ok(())
    }

    #[test]
    fn test_committing_over_a_locked_path_with_the_wrong_token_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = context(dir.path());
        ctx.locks.lock(
            "bob",
            &[crate::locks::LockTarget {
                path: b"/a".to_vec(),
                current_rev: None,
            }],
            None,
            false,
        )?;

        let wire = single_file_add(b"a", b"hello", None)?;
        let mut reader = reader_for(wire);

        let err = run(&ctx, "alice", "msg\n", &[(b"/a".to_vec(), Some("wrong-token".to_string()))], &mut reader).unwrap_err();
        assert!(matches!(err, Error::LockOwnerMismatch(_)));
        Ok(())
    }

    #[test]
    fn test_committing_over_a_locked_path_with_its_token_succeeds() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = context(dir.path());
        let rows = ctx.locks.lock(
            "alice",
            &[crate::locks::LockTarget {
                path: b"/a".to_vec(),
                current_rev: None,
            }],
            None,
            false,
        )?;

        let wire = single_file_add(b"a", b"hello", None)?;
        let mut reader = reader_for(wire);

        let result = run(&ctx, "alice", "msg\n", &[(b"/a".to_vec(), Some(rows[0].token.clone()))], &mut reader)?;
        assert_eq!(result.new_rev, 1);
        Ok(())
    }

    #[test]
    fn test_committing_an_unrelated_path_ignores_an_unrelated_lock() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = context(dir.path());
        ctx.locks.lock(
            "bob",
            &[crate::locks::LockTarget {
                path: b"/other".to_vec(),
                current_rev: None,
            }],
            None,
            false,
        )?;

        let wire = single_file_add(b"a", b"hello", None)?;
        let mut reader = reader_for(wire);

        let result = run(&ctx, "alice", "msg\n", &[], &mut reader)?;
        assert_eq!(result.new_rev, 1);
        Ok(())
    }
}
