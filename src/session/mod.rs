//! The session engine (§2, §4.2, CORE): owns one client socket end to end,
//! drives the greeting/auth/announce state machine, then loops reading
//! command frames and dispatching them through a small static registry.
//!
//! Every command frame on the wire has the shape `( word ( args... ) )`: the
//! loop reads the word, the matched handler reads its own argument list with
//! [`svn_wire::read_record`] (which balances that inner list itself), then
//! the loop closes the outer one. This gives every handler a uniform
//! signature (`fn(&mut Session) -> Result<()>`) regardless of how many
//! fields its command takes.

pub mod auth;
mod commands;
mod wire_ext;

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use svn_wire::{Field, FieldKind, Reader, Writer};

use crate::error::{Error, Result};
use crate::shared::{RepoContext, SharedContext};

pub(crate) use wire_ext::*;

/// A registered piece of follow-on work (§4.2, §9's "step stack"): commands
/// whose reply spans more than one round of reading off the wire (the
/// report-then-edit commands, and `commit`'s edit script) register one
/// rather than reading everything inline, so the command loop always has a
/// single place — [`Session::drain_steps`] — that "keeps reading from the
/// client" on their behalf before it goes back to the top-level loop.
type Step = Box<dyn FnOnce(&mut Session) -> Result<()>>;

/// One entry in the command dispatch table (§4.2's "registry is a map from
/// atom to handler"). `requires_user` is the permission-check run before
/// `handler`: every write command needs an authenticated identity, since
/// anonymous commits have no author to attribute.
struct CommandSpec {
    word: &'static str,
    requires_user: bool,
    handler: fn(&mut Session) -> Result<()>,
}

macro_rules! cmd {
    ($word:literal, $handler:path) => {
        CommandSpec {
            word: $word,
            requires_user: false,
            handler: $handler,
        }
    };
    ($word:literal, $handler:path, write) => {
        CommandSpec {
            word: $word,
            requires_user: true,
            handler: $handler,
        }
    };
}

static REGISTRY: &[CommandSpec] = &[
    cmd!("get-latest-rev", commands::get_latest_rev),
    cmd!("get-dated-rev", commands::get_dated_rev),
    cmd!("check-path", commands::check_path),
    cmd!("stat", commands::stat),
    cmd!("get-dir", commands::get_dir),
    cmd!("get-file", commands::get_file),
    cmd!("get-locations", commands::get_locations),
    cmd!("get-location-segments", commands::get_location_segments),
    cmd!("log", commands::log),
    cmd!("rev-prop", commands::rev_prop),
    cmd!("rev-proplist", commands::rev_proplist),
    cmd!("get-iprops", commands::get_iprops),
    cmd!("reparent", commands::reparent),
    cmd!("commit", commands::commit, write),
    cmd!("replay", commands::replay),
    cmd!("replay-range", commands::replay_range),
    cmd!("update", commands::update),
    cmd!("switch", commands::switch),
    cmd!("status", commands::status),
    cmd!("diff", commands::diff),
    cmd!("lock", commands::lock, write),
    cmd!("lock-many", commands::lock_many, write),
    cmd!("unlock", commands::unlock, write),
    cmd!("unlock-many", commands::unlock_many, write),
    cmd!("get-lock", commands::get_lock),
    cmd!("get-locks", commands::get_locks),
];

/// Capability atoms this server always advertises (§6). `svndiff1` is added
/// conditionally when the deployment enables compression.
const MANDATORY_CAPABILITIES: &[&str] = &["edit-pipeline", "absent-entries", "depth", "inherited-props", "log-revprops"];

/// The per-connection state a session carries for its whole lifetime (§3's
/// "Session state"). `repo`/`branch` are set once repository resolution
/// (state 2 of §4.2) succeeds and never change afterward — `reparent` only
/// ever moves the anchor within that same repository+branch (see
/// DESIGN.md's note on this).
pub struct Session {
    reader: Reader<BufReader<TcpStream>>,
    writer: Writer<BufWriter<TcpStream>>,
    context: Arc<SharedContext>,
    session_id: u64,
    peer: SocketAddr,
    user: auth::User,
    repo: Option<Arc<RepoContext>>,
    branch: String,
    repository_url: String,
    client_capabilities: Vec<String>,
    steps: Vec<Step>,
}

impl Session {
    fn new(context: Arc<SharedContext>, stream: TcpStream, peer: SocketAddr, session_id: u64) -> Result<Self> {
        let write_half = stream.try_clone()?;
        Ok(Self {
            reader: Reader::new(BufReader::new(stream)),
            writer: Writer::new(BufWriter::new(write_half)),
            context,
            session_id,
            peer,
            user: None,
            repo: None,
            branch: String::new(),
            repository_url: String::new(),
            client_capabilities: Vec::new(),
            steps: Vec::new(),
        })
    }

    fn push_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Drains every pending step before the loop reads a new command (§4.2,
    /// §9). A step may itself push a follow-on step; this keeps running
    /// until none remain, rather than assuming exactly one.
    fn drain_steps(&mut self) -> Result<()> {
        while let Some(step) = self.steps.pop() {
            step(self)?;
        }
        Ok(())
    }

    fn require_repo(&self) -> Result<Arc<RepoContext>> {
        self.repo
            .clone()
            .ok_or_else(|| Error::UnknownRepository("no repository selected".to_string()))
    }

    fn branch(&self) -> &str {
        &self.branch
    }

    fn user_name(&self) -> &str {
        self.user.as_deref().unwrap_or("")
    }

    /// Whether this connection negotiated `svndiff1`: the server must have
    /// advertised it (§6, gated on `compression_enabled`) and the client
    /// must have echoed it back in its own capability list.
    fn svndiff1_negotiated(&self) -> bool {
        self.context.config.compression_enabled && self.client_capabilities.iter().any(|c| c == "svndiff1")
    }

    /// Resolves an optional revision argument (absent ⇒ latest) against the
    /// session's repository.
    fn resolve_rev(&self, rev: Option<i64>) -> Result<u64> {
        let ctx = self.require_repo()?;
        match rev {
            Some(r) if r >= 0 => Ok(r as u64),
            Some(r) => Err(Error::NotFound(format!("negative revision {}", r))),
            None => Ok(ctx.engine.latest_revision()?),
        }
    }

    fn report_error(&mut self, error: Error) -> Result<()> {
        let protocol_error = error.to_protocol_error();
        if protocol_error.is_warning() {
            log::info!("[session {}] {}", self.session_id, protocol_error);
        } else {
            log::error!("[session {}] {}", self.session_id, protocol_error);
        }
        self.writer.failure(&[protocol_error])?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Entry point the acceptor calls for each accepted connection (§2's
/// "Acceptor: listens on a TCP port, accepts sockets, hands each to the
/// session engine on a worker").
pub fn run(context: Arc<SharedContext>, stream: TcpStream, peer: SocketAddr, session_id: u64) -> Result<()> {
    stream.set_read_timeout(Some(context.config.idle_timeout))?;
    let mut session = Session::new(context, stream, peer, session_id)?;

    greet(&mut session)?;
    if session.repo.is_none() {
        // Repository resolution failed and a failure response was already
        // sent (§4.2 state 2): nothing more to do on this connection.
        return Ok(());
    }

    session
        .writer
        .get_mut()
        .get_ref()
        .set_read_timeout(Some(session.context.config.auth_timeout))?;
    let user = auth::authenticate(&mut session.reader, &mut session.writer, &session.context.config.user_db, &session.context.config.realm)?;
    session.user = user;

    session
        .writer
        .get_mut()
        .get_ref()
        .set_read_timeout(Some(session.context.config.idle_timeout))?;
    announce(&mut session)?;

    command_loop(&mut session)
}

/// §4.2 state 1 (Greeting) + state 2 (repository resolution). On resolution
/// failure, writes the `failure` response and leaves `session.repo` unset so
/// `run` knows to stop without attempting auth.
fn greet(session: &mut Session) -> Result<()> {
    let compression = if session.context.config.compression_enabled {
        Some("svndiff1")
    } else {
        None
    };

    session.writer.success(|w| {
        w.number(2)?;
        w.number(2)?;
        w.list_start()?;
        w.list_end()?;
        w.list_start()?;
        for cap in MANDATORY_CAPABILITIES {
            w.word(cap)?;
        }
        if let Some(cap) = compression {
            w.word(cap)?;
        }
        w.list_end()?;
        Ok(())
    })?;
    session.writer.flush()?;

    let schema = [
        Field::new("ver", FieldKind::Number),
        Field::new("caps", FieldKind::list_of(FieldKind::Word)),
        Field::new("url", FieldKind::String),
    ];
    let record = svn_wire::read_record(&mut session.reader, &schema)?;

    let ver = record.required("ver")?.as_number()?;
    if ver != 2 {
        session.report_error(Error::UnsupportedVersion(ver))?;
        return Ok(());
    }

    session.client_capabilities = record
        .required("caps")?
        .as_list()?
        .iter()
        .filter_map(|v| v.as_word().ok().map(str::to_string))
        .collect();

    let url = String::from_utf8_lossy(record.required("url")?.as_bytes()?).into_owned();
    let (base_url, repository_path) = parse_repo_url(&url)?;

    match session.context.repository_for_path(&repository_path) {
        Ok((ctx, branch)) => {
            session.repo = Some(ctx);
            session.branch = branch;
            session.repository_url = format!("{}/{}", base_url, repository_path);
        }
        Err(e) => session.report_error(e)?,
    }

    Ok(())
}

/// §4.2 state 4 (Announce): `success(uuid, base-url, ())`.
fn announce(session: &mut Session) -> Result<()> {
    let ctx = session.require_repo()?;
    let uuid = ctx.uuid.clone();
    let url = session.repository_url.clone();

    session.writer.success(|w| {
        w.byte_string(uuid.as_bytes())?;
        w.byte_string(url.as_bytes())?;
        w.list_start()?;
        w.list_end()?;
        Ok(())
    })?;
    session.writer.flush()?;
    Ok(())
}

/// §4.2 state 5: read `(word (args))`, dispatch, repeat until the client
/// disconnects. A disconnect mid-read surfaces as `Error::Wire` wrapping
/// [`svn_wire::Error::UnexpectedEof`] from the very first `list_start` of a
/// new frame — anywhere else, it's a genuine transport error and the
/// connection is dropped (§7).
fn command_loop(session: &mut Session) -> Result<()> {
    loop {
        session.drain_steps()?;

        match session.reader.list_start() {
            Ok(()) => {}
            Err(svn_wire::Error::UnexpectedEof) => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        let word = session.reader.word()?;
        let outcome = dispatch(session, &word);
        session.reader.list_end()?;

        if let Err(e) = outcome {
            session.report_error(e)?;
        }
    }
}

fn dispatch(session: &mut Session, word: &str) -> Result<()> {
    let spec = match REGISTRY.iter().find(|spec| spec.word == word) {
        Some(spec) => spec,
        None => {
            session.reader.skip_item()?;
            return Err(Error::UnknownCommand(word.to_string()));
        }
    };

    if spec.requires_user && session.user.is_none() {
        session.reader.skip_item()?;
        return Err(Error::Unwritable(word.to_string()));
    }

    (spec.handler)(session)
}

/// Splits `svn://host[:port]/<repository-path>` into `(base-url,
/// repository-path)` (§6). The scheme is fixed; anything else is a
/// malformed request rather than an unmapped repository.
fn parse_repo_url(url: &str) -> Result<(String, String)> {
    let rest = url
        .strip_prefix("svn://")
        .ok_or_else(|| svn_wire::Error::Malformed(format!("unsupported url scheme in {:?}", url)))?;

    let (host_port, path) = rest.split_once('/').unwrap_or((rest, ""));
    Ok((format!("svn://{}", host_port), path.trim_end_matches('/').to_string()))
}

/// Idle-timeout helper: some platforms return `WouldBlock` rather than a
/// clean EOF-style error once a read timeout set via `set_read_timeout`
/// elapses. Surfaced as a dedicated error so callers can tell a genuinely
/// idle client apart from a protocol violation, matching §5's "a
/// configurable idle timeout on socket reads".
pub(crate) fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo_url_splits_host_and_path() -> anyhow::Result<()> {
        let (base, path) = parse_repo_url("svn://example.com:3690/repo/trunk")?;
        assert_eq!(base, "svn://example.com:3690");
        assert_eq!(path, "repo/trunk");
        Ok(())
    }

    #[test]
    fn test_parse_repo_url_without_path_is_repository_root() -> anyhow::Result<()> {
        let (base, path) = parse_repo_url("svn://example.com")?;
        assert_eq!(base, "svn://example.com");
        assert_eq!(path, "");
        Ok(())
    }

    #[test]
    fn test_parse_repo_url_rejects_other_schemes() {
        assert!(parse_repo_url("http://example.com/repo").is_err());
    }

    /// Drives the whole session state machine end to end over a real
    /// loopback socket (§2a's "integration tests ... drive the session
    /// engine end-to-end over an in-process TcpStream pair"): greeting,
    /// anonymous auth, announce, then `get-latest-rev` against a freshly
    /// initialised repository with no commits (§8 scenario 2).
    #[test]
    fn test_get_latest_rev_on_empty_repository() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        RepoContext::init(dir.path())?;

        let mut config = crate::config::ServerConfig::default();
        config.repository_mapping = vec![crate::config::RepositoryMappingEntry {
            url_prefix: String::new(),
            repository_path: dir.path().to_path_buf(),
            default_branch: "trunk".to_string(),
        }];
        let context = Arc::new(SharedContext::new(config));

        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;

        let server = std::thread::spawn(move || -> Result<()> {
            let (stream, peer) = listener.accept()?;
            run(context, stream, peer, 1)
        });

        let client_stream = TcpStream::connect(addr)?;
        let mut reader = Reader::new(BufReader::new(client_stream.try_clone()?));
        let mut writer = Writer::new(BufWriter::new(client_stream));

        // Greeting: read the server's capability advertisement, reply with
        // our protocol version, an empty capability list, and the URL.
        reader.list_start()?;
        assert_eq!(reader.word()?, "success");
        reader.list_start()?;
        let min_ver = reader.number()?;
        let max_ver = reader.number()?;
        assert_eq!((min_ver, max_ver), (2, 2));
        reader.list_start()?;
        reader.list_end()?; // server mechanism list placeholder in the greeting body is empty
        reader.list_start()?;
        while !reader.at_list_end()? {
            reader.word()?;
        }
        reader.list_end()?;
        reader.list_end()?;
        reader.list_end()?;

        writer.list_start()?;
        writer.number(2)?;
        writer.list_start()?;
        writer.list_end()?;
        writer.byte_string(b"svn://example.com/")?;
        writer.list_end()?;
        writer.flush()?;

        // Authentication: anonymous mechanism, no token.
        reader.list_start()?;
        assert_eq!(reader.word()?, "success");
        reader.list_start()?;
        reader.list_start()?;
        while !reader.at_list_end()? {
            reader.word()?;
        }
        reader.list_end()?;
        reader.byte_string()?;
        reader.list_end()?;
        reader.list_end()?;

        writer.list_start()?;
        writer.word("ANONYMOUS")?;
        writer.byte_string(b"")?;
        writer.list_end()?;
        writer.flush()?;

        // Announce: (success (uuid base-url ())).
        reader.list_start()?;
        assert_eq!(reader.word()?, "success");
        reader.list_start()?;
        reader.byte_string()?;
        reader.byte_string()?;
        reader.list_start()?;
        reader.list_end()?;
        reader.list_end()?;
        reader.list_end()?;

        // get-latest-rev: ( get-latest-rev ( ) ), expect ( success ( 0 ) ).
        writer.list_start()?;
        writer.word("get-latest-rev")?;
        writer.list_start()?;
        writer.list_end()?;
        writer.list_end()?;
        writer.flush()?;

        reader.list_start()?;
        assert_eq!(reader.word()?, "success");
        reader.list_start()?;
        assert_eq!(reader.number()?, 0);
        reader.list_end()?;
        reader.list_end()?;

        drop(writer);
        server.join().unwrap()?;
        Ok(())
    }
}
