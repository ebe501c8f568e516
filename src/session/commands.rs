//! Command handlers (§4.2, §6): one function per registry entry in
//! `super::REGISTRY`. Each reads its own argument list (via
//! [`svn_wire::read_record`] where the shape is homogeneous, or by hand
//! against [`svn_wire::Reader`] where it isn't, following
//! [`crate::commit_editor`]'s precedent for nested optional/tuple shapes)
//! and writes its own reply — there is no shared response envelope beyond
//! `Writer::success`/`Writer::failure`.

use std::collections::BTreeMap;

use svn_branch::{PathHistory, RevisionView};
use svn_persist::LockRow;
use svn_props::Pipeline;
use svn_wire::{Field, FieldKind, Record};

use super::{format_date, parse_date, read_bool, read_optional_number, read_optional_string, write_optional_number, write_optional_string, Session};
use crate::delta::{read_report, Depth, Driver, Report, ReportEntry};
use crate::error::{Error, Result};
use crate::locks::LockTarget;
use crate::shared::RepoContext;

fn string_field(record: &Record, name: &'static str) -> Result<Vec<u8>> {
    Ok(record.required(name)?.as_bytes()?.to_vec())
}

fn optional_rev(record: &Record, name: &'static str) -> Result<Option<i64>> {
    match record.get(name)? {
        v if v.is_absent() => Ok(None),
        v => Ok(Some(v.as_number()?)),
    }
}

/// Builds a read-only view (engine + path history + property pipeline) for
/// one command: these three collaborators are re-created per command rather
/// than cached on `RepoContext` (§9's grounding: matches how
/// `crate::delta::Driver` and `RevisionView`'s own test fixtures build a
/// fresh `PathHistory` per use — only its internal LRU caches are meant to
/// outlive a single call, and they don't, here, which is a known simplicity
/// tradeoff recorded in DESIGN.md).
fn view<'a>(ctx: &'a RepoContext, history: &'a PathHistory<'a>) -> RevisionView<'a> {
    RevisionView::new(&ctx.engine, history, Pipeline::new(&ctx.cache))
}

// ---------------------------------------------------------------------
// Read-only revision/path queries
// ---------------------------------------------------------------------

pub(super) fn get_latest_rev(session: &mut Session) -> Result<()> {
    let record = svn_wire::read_record(&mut session.reader, &[])?;
    let _ = record;
    let ctx = session.require_repo()?;
    let rev = ctx.engine.latest_revision()?;
    session.writer.success(|w| {
        w.number(rev as i64)?;
        Ok(())
    })?;
    session.writer.flush()?;
    Ok(())
}

pub(super) fn get_dated_rev(session: &mut Session) -> Result<()> {
    let schema = [Field::new("date", FieldKind::String)];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let date = String::from_utf8_lossy(record.required("date")?.as_bytes()?).into_owned();
    let when = parse_date(&date)?;

    let ctx = session.require_repo()?;
    let rev = ctx.engine.dated_revision(when)?;
    session.writer.success(|w| {
        w.number(rev as i64)?;
        Ok(())
    })?;
    session.writer.flush()?;
    Ok(())
}

pub(super) fn check_path(session: &mut Session) -> Result<()> {
    let schema = [Field::new("path", FieldKind::String), Field::new("rev", FieldKind::optional(FieldKind::Number))];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let path = string_field(&record, "path")?;
    let rev = session.resolve_rev(optional_rev(&record, "rev")?)?;

    let ctx = session.require_repo()?;
    let root = ctx.engine.tree_for_revision(rev)?;
    let repo = ctx.repo.lock().unwrap();
    let kind = match svn_branch::resolve(&repo, root, &path)? {
        None => "none",
        Some((mode, _)) if mode.is_dir() => "dir",
        Some(_) => "file",
    };

    session.writer.success(|w| {
        w.word(kind)?;
        Ok(())
    })?;
    session.writer.flush()?;
    Ok(())
}

pub(super) fn stat(session: &mut Session) -> Result<()> {
    let schema = [Field::new("path", FieldKind::String), Field::new("rev", FieldKind::optional(FieldKind::Number))];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let path = string_field(&record, "path")?;
    let rev = session.resolve_rev(optional_rev(&record, "rev")?)?;

    let ctx = session.require_repo()?;
    let history = PathHistory::new(&ctx.engine, ctx.rename_detection);
    let entry = view(&ctx, &history).stat(&path, rev)?;

    session.writer.success(|w| {
        w.list_start()?;
        if let Some(entry) = &entry {
            write_entry(w, entry)?;
        }
        w.list_end()?;
        Ok(())
    })?;
    session.writer.flush()?;
    Ok(())
}

fn write_entry<W: std::io::Write>(w: &mut svn_wire::Writer<W>, entry: &svn_branch::Entry) -> svn_wire::Result<()> {
    w.word(match entry.kind {
        svn_branch::EntryKind::File => "file",
        svn_branch::EntryKind::Directory => "dir",
    })?;
    write_optional_number(w, entry.size.map(|s| s as i64))?;
    w.boolean(!entry.properties.is_empty())?;
    w.number(entry.created_revision as i64)?;
    w.byte_string(format_date(entry.date).as_bytes())?;
    w.byte_string(entry.author.as_bytes())?;
    Ok(())
}

pub(super) fn get_dir(session: &mut Session) -> Result<()> {
    let schema = [
        Field::new("path", FieldKind::String),
        Field::new("want-props", FieldKind::Bool),
        Field::new("want-contents", FieldKind::Bool),
        Field::new("rev", FieldKind::optional(FieldKind::Number)),
    ];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let path = string_field(&record, "path")?;
    let want_props = record.required("want-props")?.as_bool()?;
    let rev = session.resolve_rev(optional_rev(&record, "rev")?)?;

    let ctx = session.require_repo()?;
    let history = PathHistory::new(&ctx.engine, ctx.rename_detection);
    let view = view(&ctx, &history);

    let dir_entry = view.stat(&path, rev)?.ok_or_else(|| Error::NotFound(String::from_utf8_lossy(&path).into_owned()))?;
    if dir_entry.kind != svn_branch::EntryKind::Directory {
        return Err(Error::NotDirectory(String::from_utf8_lossy(&path).into_owned()));
    }
    let children = view.list_dir(&path, rev)?.unwrap_or_default();

    session.writer.success(|w| {
        w.number(dir_entry.created_revision as i64)?;
        w.list_start()?;
        if want_props {
            for (name, value) in &dir_entry.properties {
                w.byte_string(name.as_bytes())?;
                w.byte_string(value.as_bytes())?;
            }
        }
        w.list_end()?;
        w.list_start()?;
        for (name, entry) in &children {
            w.list_start()?;
            w.byte_string(name)?;
            write_entry(w, entry)?;
            w.list_end()?;
        }
        w.list_end()?;
        Ok(())
    })?;
    session.writer.flush()?;
    Ok(())
}

const CONTENT_CHUNK_SIZE: usize = 32 * 1024;

pub(super) fn get_file(session: &mut Session) -> Result<()> {
    let schema = [
        Field::new("path", FieldKind::String),
        Field::new("want-props", FieldKind::Bool),
        Field::new("want-contents", FieldKind::Bool),
        Field::new("rev", FieldKind::optional(FieldKind::Number)),
    ];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let path = string_field(&record, "path")?;
    let want_props = record.required("want-props")?.as_bool()?;
    let want_contents = record.required("want-contents")?.as_bool()?;
    let rev = session.resolve_rev(optional_rev(&record, "rev")?)?;

    let ctx = session.require_repo()?;
    let history = PathHistory::new(&ctx.engine, ctx.rename_detection);
    let entry = view(&ctx, &history)
        .stat(&path, rev)?
        .ok_or_else(|| Error::NotFound(String::from_utf8_lossy(&path).into_owned()))?;
    if entry.kind != svn_branch::EntryKind::File {
        return Err(Error::NotFile(String::from_utf8_lossy(&path).into_owned()));
    }

    let root = ctx.engine.tree_for_revision(rev)?;
    let content = {
        let repo = ctx.repo.lock().unwrap();
        match svn_branch::resolve(&repo, root, &path)? {
            Some((_, id)) => repo.read_blob(id)?,
            None => Vec::new(),
        }
    };

    session.writer.success(|w| {
        write_optional_string(w, entry.checksum.as_deref().map(str::as_bytes))?;
        w.number(entry.created_revision as i64)?;
        w.list_start()?;
        if want_props {
            for (name, value) in &entry.properties {
                w.byte_string(name.as_bytes())?;
                w.byte_string(value.as_bytes())?;
            }
        }
        w.list_end()?;
        Ok(())
    })?;

    if want_contents {
        for chunk in content.chunks(CONTENT_CHUNK_SIZE) {
            session.writer.byte_string(chunk)?;
        }
    }
    session.writer.byte_string(b"")?;
    session.writer.flush()?;
    Ok(())
}

pub(super) fn get_locations(session: &mut Session) -> Result<()> {
    let schema = [
        Field::new("path", FieldKind::String),
        Field::new("peg-rev", FieldKind::Number),
        Field::new("revs", FieldKind::list_of(FieldKind::Number)),
    ];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let path = string_field(&record, "path")?;
    let peg_rev = record.required("peg-rev")?.as_number()? as u64;
    let revs: Vec<u64> = record
        .required("revs")?
        .as_list()?
        .iter()
        .map(|v| v.as_number().map(|n| n as u64))
        .collect::<svn_wire::Result<_>>()?;

    let ctx = session.require_repo()?;
    let history = PathHistory::new(&ctx.engine, ctx.rename_detection);
    let locations = svn_branch::get_locations(&ctx.engine, &history, &path, peg_rev, &revs)?;

    for (rev, located_path) in &locations {
        session.writer.list_start()?;
        session.writer.number(*rev as i64)?;
        session.writer.byte_string(located_path)?;
        session.writer.list_end()?;
    }
    session.writer.success(|_| Ok(()))?;
    session.writer.flush()?;
    Ok(())
}

pub(super) fn get_location_segments(session: &mut Session) -> Result<()> {
    let schema = [
        Field::new("path", FieldKind::String),
        Field::new("peg-rev", FieldKind::optional(FieldKind::Number)),
        Field::new("start-rev", FieldKind::optional(FieldKind::Number)),
        Field::new("end-rev", FieldKind::optional(FieldKind::Number)),
    ];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let path = string_field(&record, "path")?;

    let ctx = session.require_repo()?;
    let latest = ctx.engine.latest_revision()?;
    let peg = session.resolve_rev(optional_rev(&record, "peg-rev")?)?;
    let start = optional_rev(&record, "start-rev")?.map(|n| n as u64).unwrap_or(0);
    let end = optional_rev(&record, "end-rev")?.map(|n| n as u64).unwrap_or(latest);

    let history = PathHistory::new(&ctx.engine, ctx.rename_detection);
    let segments = svn_branch::location_segments(&ctx.engine, &history, &path, peg, start, end)?;

    for segment in &segments {
        session.writer.list_start()?;
        session.writer.number(segment.start as i64)?;
        session.writer.number(segment.end as i64)?;
        session.writer.byte_string(&segment.path)?;
        session.writer.list_end()?;
    }
    session.writer.success(|_| Ok(()))?;
    session.writer.flush()?;
    Ok(())
}

pub(super) fn log(session: &mut Session) -> Result<()> {
    let schema = [
        Field::new("paths", FieldKind::list_of(FieldKind::String)),
        Field::new("changed-paths", FieldKind::Bool),
        Field::new("start", FieldKind::optional(FieldKind::Number)),
        Field::new("end", FieldKind::optional(FieldKind::Number)),
        Field::new("limit", FieldKind::optional(FieldKind::Number)),
    ];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let want_changed_paths = record.required("changed-paths")?.as_bool()?;
    let limit = optional_rev(&record, "limit")?.map(|n| n as usize);

    let ctx = session.require_repo()?;
    let latest = ctx.engine.latest_revision()?;
    let start = optional_rev(&record, "start")?.map(|n| n as u64).unwrap_or(latest);
    let end = optional_rev(&record, "end")?.map(|n| n as u64).unwrap_or(0);
    let (hi, lo) = (start.max(end), start.min(end));

    let mut emitted = 0usize;
    for rev in (lo.max(1)..=hi).rev() {
        if limit.is_some_and(|limit| emitted >= limit) {
            break;
        }
        let commit = match ctx.engine.commit_for_revision(rev)? {
            Some(commit) => commit,
            None => continue,
        };

        let paths = if want_changed_paths {
            let repo = ctx.repo.lock().unwrap();
            let old_root = ctx.engine.tree_for_revision(rev - 1)?;
            let new_root = ctx.engine.tree_for_revision(rev)?;
            crate::treediff::changed_paths(&repo, old_root, new_root)?
        } else {
            Vec::new()
        };

        session.writer.list_start()?;
        session.writer.list_start()?;
        for (path, action) in &paths {
            session.writer.list_start()?;
            session.writer.byte_string(path)?;
            session.writer.word(match action {
                'A' => "A",
                'D' => "D",
                _ => "M",
            })?;
            session.writer.list_start()?;
            session.writer.list_end()?;
            session.writer.list_end()?;
        }
        session.writer.list_end()?;
        session.writer.number(rev as i64)?;
        session.writer.byte_string(commit.author.name.as_bytes())?;
        session.writer.byte_string(format_date(commit.committer.time).as_bytes())?;
        session.writer.byte_string(commit.message.as_bytes())?;
        session.writer.list_end()?;
        emitted += 1;
    }

    session.writer.success(|_| Ok(()))?;
    session.writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------
// Revision properties (synthesised, §3: "there is no revision-property
// storage table"): `svn:author`, `svn:date`, `svn:log` straight off the
// commit object.
// ---------------------------------------------------------------------

fn synthesized_revprops(commit: &svn_objstore::Commit) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    props.insert("svn:author".to_string(), commit.author.name.clone());
    props.insert("svn:date".to_string(), format_date(commit.committer.time));
    props.insert("svn:log".to_string(), commit.message.clone());
    props
}

pub(super) fn rev_prop(session: &mut Session) -> Result<()> {
    let schema = [Field::new("rev", FieldKind::Number), Field::new("name", FieldKind::String)];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let rev = record.required("rev")?.as_number()? as u64;
    let name = String::from_utf8_lossy(record.required("name")?.as_bytes()?).into_owned();

    let ctx = session.require_repo()?;
    let value = match ctx.engine.commit_for_revision(rev)? {
        Some(commit) => synthesized_revprops(&commit).get(&name).cloned(),
        None => None,
    };

    session.writer.success(|w| write_optional_string(w, value.as_deref().map(str::as_bytes)))?;
    session.writer.flush()?;
    Ok(())
}

pub(super) fn rev_proplist(session: &mut Session) -> Result<()> {
    let schema = [Field::new("rev", FieldKind::Number)];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let rev = record.required("rev")?.as_number()? as u64;

    let ctx = session.require_repo()?;
    let props = match ctx.engine.commit_for_revision(rev)? {
        Some(commit) => synthesized_revprops(&commit),
        None => BTreeMap::new(),
    };

    session.writer.success(|w| {
        w.list_start()?;
        for (name, value) in &props {
            w.byte_string(name.as_bytes())?;
            w.byte_string(value.as_bytes())?;
        }
        w.list_end()?;
        Ok(())
    })?;
    session.writer.flush()?;
    Ok(())
}

pub(super) fn get_iprops(session: &mut Session) -> Result<()> {
    let schema = [Field::new("path", FieldKind::String), Field::new("rev", FieldKind::optional(FieldKind::Number))];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let path = string_field(&record, "path")?;
    let rev = session.resolve_rev(optional_rev(&record, "rev")?)?;

    let ctx = session.require_repo()?;
    let history = PathHistory::new(&ctx.engine, ctx.rename_detection);
    let v = view(&ctx, &history);

    let mut inherited = Vec::new();
    for ancestor in ancestor_paths(&path) {
        if let Some(entry) = v.stat(&ancestor, rev)? {
            if !entry.properties.is_empty() {
                inherited.push((ancestor, entry.properties));
            }
        }
    }

    session.writer.success(|w| {
        w.list_start()?;
        for (ancestor_path, props) in &inherited {
            w.list_start()?;
            w.byte_string(ancestor_path)?;
            w.list_start()?;
            for (name, value) in props {
                w.byte_string(name.as_bytes())?;
                w.byte_string(value.as_bytes())?;
            }
            w.list_end()?;
            w.list_end()?;
        }
        w.list_end()?;
        Ok(())
    })?;
    session.writer.flush()?;
    Ok(())
}

fn ancestor_paths(path: &[u8]) -> Vec<Vec<u8>> {
    let mut out = vec![Vec::new()];
    let mut acc: Vec<u8> = Vec::new();
    for part in svn_branch::components(path) {
        if !acc.is_empty() {
            acc.push(b'/');
        }
        acc.extend_from_slice(part);
        out.push(acc.clone());
    }
    out.pop();
    out
}

/// `reparent` only ever moves the client's anchor within the repository and
/// branch a session already resolved at greeting time (§3's open question on
/// reparent across repositories): a request naming a different repository
/// or branch is rejected rather than silently switched, since nothing else
/// in this design models a session owning more than one `RepoContext`.
pub(super) fn reparent(session: &mut Session) -> Result<()> {
    let schema = [Field::new("url", FieldKind::String)];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let url = String::from_utf8_lossy(record.required("url")?.as_bytes()?).into_owned();

    let (base_url, repository_path) = super::parse_repo_url(&url)?;
    let (_, branch) = session.context.repository_for_path(&repository_path)?;
    if branch != session.branch {
        return Err(Error::UnknownRepository(url));
    }
    session.repository_url = format!("{}/{}", base_url, repository_path);

    session.writer.success(|_| Ok(()))?;
    session.writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------
// Commit (the write path, §4.4)
// ---------------------------------------------------------------------

pub(super) fn commit(session: &mut Session) -> Result<()> {
    let log_message;
    let lock_tokens;

    {
        session.reader.list_start()?;
        log_message = session.reader.byte_string()?;
        lock_tokens = read_lock_tokens(session)?;
        let _keep_locks = read_bool(&mut session.reader)?;
        read_and_discard_revprops(session)?;
        session.reader.list_end()?;
    }
    let log_message = String::from_utf8_lossy(&log_message).into_owned();

    let ctx = session.require_repo()?;
    let author = session.user_name().to_string();
    let result = crate::commit_editor::run(&ctx, &author, &log_message, &lock_tokens, &mut session.reader)?;

    if let Some(hook_error) = &result.post_commit_error {
        log::warn!("[session {}] post-commit hook failed: {}", session.session_id, hook_error);
    }

    session.writer.success(|w| {
        w.number(result.new_rev as i64)?;
        w.byte_string(format_date(result.timestamp).as_bytes())?;
        write_optional_string(w, Some(result.author.as_bytes()))?;
        Ok(())
    })?;
    session.writer.flush()?;
    Ok(())
}

fn read_lock_tokens(session: &mut Session) -> Result<Vec<(Vec<u8>, Option<String>)>> {
    session.reader.list_start()?;
    let mut tokens = Vec::new();
    while !session.reader.at_list_end()? {
        session.reader.list_start()?;
        let path = session.reader.byte_string()?;
        let token = session.reader.byte_string()?;
        session.reader.list_end()?;
        tokens.push((path, Some(String::from_utf8_lossy(&token).into_owned())));
    }
    session.reader.list_end()?;
    Ok(tokens)
}

fn read_and_discard_revprops(session: &mut Session) -> Result<()> {
    session.reader.list_start()?;
    while !session.reader.at_list_end()? {
        session.reader.skip_item()?;
    }
    session.reader.list_end()?;
    Ok(())
}

// ---------------------------------------------------------------------
// Report-driven commands: update/switch/status/diff read a client report
// (§4.3) and stream back an edit script via `crate::delta::Driver`. Each
// handler reads its own leading args, then pushes the report-reading-and-
// driving work as a step (§4.2/§9's "step stack") rather than doing it
// inline, so the command loop's `drain_steps` is genuinely what keeps
// reading from the client here, not direct recursion.
// ---------------------------------------------------------------------

fn push_report_step(session: &mut Session, target_rev: u64, text_deltas: bool) {
    session.push_step(Box::new(move |session: &mut Session| run_report_driven(session, target_rev, text_deltas)));
}

fn run_report_driven(session: &mut Session, target_rev: u64, text_deltas: bool) -> Result<()> {
    let ctx = session.require_repo()?;
    let report = match read_report(&mut session.reader)? {
        Some(report) => report,
        None => return Ok(()),
    };

    let history = PathHistory::new(&ctx.engine, ctx.rename_detection);
    let pipeline = Pipeline::new(&ctx.cache);
    let mut driver = Driver::new(&ctx.engine, &history, pipeline, target_rev, text_deltas, session.svndiff1_negotiated());
    driver.drive(&report, &mut session.writer)?;
    Ok(())
}

pub(super) fn update(session: &mut Session) -> Result<()> {
    let schema = [
        Field::new("target", FieldKind::String),
        Field::new("recurse", FieldKind::Bool),
        Field::new("rev", FieldKind::optional(FieldKind::Number)),
        Field::new("depth", FieldKind::optional(FieldKind::Word)),
    ];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let rev = session.resolve_rev(optional_rev(&record, "rev")?)?;
    push_report_step(session, rev, true);
    Ok(())
}

pub(super) fn switch(session: &mut Session) -> Result<()> {
    let schema = [
        Field::new("target", FieldKind::String),
        Field::new("recurse", FieldKind::Bool),
        Field::new("switch-url", FieldKind::String),
        Field::new("rev", FieldKind::optional(FieldKind::Number)),
        Field::new("depth", FieldKind::optional(FieldKind::Word)),
    ];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let rev = session.resolve_rev(optional_rev(&record, "rev")?)?;
    // `switch-url` is parsed only to validate it names this same session's
    // repository+branch (§3's open question on reparent applies equally
    // here): a cross-branch switch isn't representable with one `RepoContext`
    // per session, and is rejected rather than silently ignored.
    let switch_url = String::from_utf8_lossy(record.required("switch-url")?.as_bytes()?).into_owned();
    let (_, repository_path) = super::parse_repo_url(&switch_url)?;
    let (_, branch) = session.context.repository_for_path(&repository_path)?;
    if branch != session.branch {
        return Err(Error::UnknownRepository(switch_url));
    }
    push_report_step(session, rev, true);
    Ok(())
}

pub(super) fn status(session: &mut Session) -> Result<()> {
    let schema = [
        Field::new("target", FieldKind::String),
        Field::new("recurse", FieldKind::Bool),
        Field::new("rev", FieldKind::optional(FieldKind::Number)),
        Field::new("depth", FieldKind::optional(FieldKind::Word)),
    ];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let rev = session.resolve_rev(optional_rev(&record, "rev")?)?;
    push_report_step(session, rev, false);
    Ok(())
}

pub(super) fn diff(session: &mut Session) -> Result<()> {
    let schema = [
        Field::new("target", FieldKind::String),
        Field::new("recurse", FieldKind::Bool),
        Field::new("ignore-ancestry", FieldKind::Bool),
        Field::new("versus-url", FieldKind::String),
        Field::new("rev", FieldKind::optional(FieldKind::Number)),
        Field::new("depth", FieldKind::optional(FieldKind::Word)),
        Field::new("text-deltas", FieldKind::optional(FieldKind::Bool)),
    ];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let rev = session.resolve_rev(optional_rev(&record, "rev")?)?;
    let text_deltas = match record.get("text-deltas")? {
        v if v.is_absent() => true,
        v => v.as_bool()?,
    };
    push_report_step(session, rev, text_deltas);
    Ok(())
}

/// Builds the single-entry report `replay`/`replay-range` need to reuse
/// `Driver::drive` without a client-supplied report: the whole branch root,
/// anchored at `base_rev` (§4.2's replay scenarios).
fn whole_tree_report(base_rev: u64) -> Report {
    Report::from_entries(vec![ReportEntry {
        path: Vec::new(),
        rev: base_rev,
        start_empty: base_rev == 0,
        depth: Depth::Infinity,
        lock_token: None,
        link_path: None,
    }])
}

pub(super) fn replay(session: &mut Session) -> Result<()> {
    let schema = [
        Field::new("rev", FieldKind::Number),
        Field::new("send-deltas", FieldKind::Bool),
        Field::new("low-water-mark", FieldKind::optional(FieldKind::Number)),
    ];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let rev = record.required("rev")?.as_number()? as u64;
    let low_water_mark = optional_rev(&record, "low-water-mark")?.map(|n| n as u64).unwrap_or(rev.saturating_sub(1));
    let send_deltas = record.required("send-deltas")?.as_bool()?;

    let ctx = session.require_repo()?;
    let history = PathHistory::new(&ctx.engine, ctx.rename_detection);
    let pipeline = Pipeline::new(&ctx.cache);
    let mut driver = Driver::new(&ctx.engine, &history, pipeline, rev, send_deltas, session.svndiff1_negotiated());
    let report = whole_tree_report(low_water_mark);
    driver.drive(&report, &mut session.writer)?;

    session.writer.success(|_| Ok(()))?;
    session.writer.flush()?;
    Ok(())
}

pub(super) fn replay_range(session: &mut Session) -> Result<()> {
    let schema = [
        Field::new("start-rev", FieldKind::Number),
        Field::new("end-rev", FieldKind::Number),
        Field::new("send-deltas", FieldKind::Bool),
        Field::new("low-water-mark", FieldKind::optional(FieldKind::Number)),
    ];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let start = record.required("start-rev")?.as_number()? as u64;
    let end = record.required("end-rev")?.as_number()? as u64;
    let send_deltas = record.required("send-deltas")?.as_bool()?;

    let ctx = session.require_repo()?;
    for rev in start..=end {
        let commit = ctx.engine.commit_for_revision(rev)?;
        let props = commit.as_ref().map(synthesized_revprops).unwrap_or_default();
        session.writer.success(|w| {
            w.list_start()?;
            for (name, value) in &props {
                w.byte_string(name.as_bytes())?;
                w.byte_string(value.as_bytes())?;
            }
            w.list_end()?;
            Ok(())
        })?;

        let history = PathHistory::new(&ctx.engine, ctx.rename_detection);
        let pipeline = Pipeline::new(&ctx.cache);
        let mut driver = Driver::new(&ctx.engine, &history, pipeline, rev, send_deltas, session.svndiff1_negotiated());
        let report = whole_tree_report(rev.saturating_sub(1));
        driver.drive(&report, &mut session.writer)?;
    }

    session.writer.success(|_| Ok(()))?;
    session.writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------
// Locking (§4.5)
// ---------------------------------------------------------------------

fn write_lock_row<W: std::io::Write>(w: &mut svn_wire::Writer<W>, row: &LockRow) -> svn_wire::Result<()> {
    w.byte_string(&row.path)?;
    w.byte_string(row.token.as_bytes())?;
    w.byte_string(row.owner.as_bytes())?;
    write_optional_string(w, row.comment.as_deref().map(str::as_bytes))?;
    w.byte_string(format_date(row.created_at).as_bytes())?;
    Ok(())
}

pub(super) fn lock(session: &mut Session) -> Result<()> {
    let schema = [
        Field::new("path", FieldKind::String),
        Field::new("steal", FieldKind::Bool),
        Field::new("comment", FieldKind::optional(FieldKind::String)),
        Field::new("current-rev", FieldKind::optional(FieldKind::Number)),
    ];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let path = string_field(&record, "path")?;
    let comment = match record.get("comment")? {
        v if v.is_absent() => None,
        v => Some(String::from_utf8_lossy(v.as_bytes()?).into_owned()),
    };
    let steal = record.required("steal")?.as_bool()?;
    let current_rev = optional_rev(&record, "current-rev")?;

    let ctx = session.require_repo()?;
    let owner = session.user_name().to_string();
    let target = LockTarget { path, current_rev };
    let rows = ctx.locks.lock(&owner, &[target], comment, steal)?;

    session.writer.success(|w| write_lock_row(w, &rows[0]))?;
    session.writer.flush()?;
    Ok(())
}

pub(super) fn lock_many(session: &mut Session) -> Result<()> {
    let comment;
    let steal;
    let targets;
    {
        session.reader.list_start()?;
        comment = read_optional_string(&mut session.reader)?.map(|b| String::from_utf8_lossy(&b).into_owned());
        steal = read_bool(&mut session.reader)?;

        session.reader.list_start()?;
        let mut parsed = Vec::new();
        while !session.reader.at_list_end()? {
            session.reader.list_start()?;
            let path = session.reader.byte_string()?;
            let current_rev = read_optional_number(&mut session.reader)?;
            session.reader.list_end()?;
            parsed.push(LockTarget { path, current_rev });
        }
        session.reader.list_end()?;
        targets = parsed;
        session.reader.list_end()?;
    }

    let ctx = session.require_repo()?;
    let owner = session.user_name().to_string();
    let rows = ctx.locks.lock(&owner, &targets, comment, steal)?;

    session.writer.success(|w| {
        w.list_start()?;
        for row in &rows {
            w.list_start()?;
            write_lock_row(w, row)?;
            w.list_end()?;
        }
        w.list_end()?;
        Ok(())
    })?;
    session.writer.flush()?;
    Ok(())
}

pub(super) fn unlock(session: &mut Session) -> Result<()> {
    let schema = [
        Field::new("path", FieldKind::String),
        Field::new("force", FieldKind::Bool),
        Field::new("token", FieldKind::optional(FieldKind::String)),
    ];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let path = string_field(&record, "path")?;
    let token = match record.get("token")? {
        v if v.is_absent() => None,
        v => Some(String::from_utf8_lossy(v.as_bytes()?).into_owned()),
    };
    let force = record.required("force")?.as_bool()?;

    let ctx = session.require_repo()?;
    ctx.locks.unlock(&[(path, token)], force)?;

    session.writer.success(|_| Ok(()))?;
    session.writer.flush()?;
    Ok(())
}

pub(super) fn unlock_many(session: &mut Session) -> Result<()> {
    let force;
    let targets;
    {
        session.reader.list_start()?;
        force = read_bool(&mut session.reader)?;

        session.reader.list_start()?;
        let mut parsed = Vec::new();
        while !session.reader.at_list_end()? {
            session.reader.list_start()?;
            let path = session.reader.byte_string()?;
            let token = read_optional_string(&mut session.reader)?.map(|b| String::from_utf8_lossy(&b).into_owned());
            session.reader.list_end()?;
            parsed.push((path, token));
        }
        session.reader.list_end()?;
        targets = parsed;
        session.reader.list_end()?;
    }

    let ctx = session.require_repo()?;
    ctx.locks.unlock(&targets, force)?;

    session.writer.success(|_| Ok(()))?;
    session.writer.flush()?;
    Ok(())
}

pub(super) fn get_lock(session: &mut Session) -> Result<()> {
    let schema = [Field::new("path", FieldKind::String)];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let path = string_field(&record, "path")?;

    let ctx = session.require_repo()?;
    let row = ctx.locks.get_lock(&path)?;

    session.writer.success(|w| {
        w.list_start()?;
        if let Some(row) = &row {
            write_lock_row(w, row)?;
        }
        w.list_end()?;
        Ok(())
    })?;
    session.writer.flush()?;
    Ok(())
}

pub(super) fn get_locks(session: &mut Session) -> Result<()> {
    let schema = [Field::new("path", FieldKind::String)];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;
    let path = string_field(&record, "path")?;

    let ctx = session.require_repo()?;
    let rows = ctx.locks.get_locks(&path)?;

    session.writer.success(|w| {
        w.list_start()?;
        for row in &rows {
            w.list_start()?;
            write_lock_row(w, row)?;
            w.list_end()?;
        }
        w.list_end()?;
        Ok(())
    })?;
    session.writer.flush()?;
    Ok(())
}
