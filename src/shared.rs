//! The single shared-context value (§9: "Global mutable state: limited to
//! the acceptor's shared context... provide a single shared-context value
//! passed explicitly to every subsystem; disallow process-wide singletons").

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use svn_branch::Engine;
use svn_objstore::{ObjectId, Repository};
use svn_persist::Connection;
use svn_props::ClassificationCache;

use crate::config::{RepositoryMappingEntry, ServerConfig};
use crate::error::{Error, Result};
use crate::locks::LockRegistry;

/// Adapts `svn_persist::Connection`'s blob-classification table to
/// `svn_props::ClassificationCache`, keeping `svn-props` free of a direct
/// `rusqlite` dependency (§2's "path-property pipeline" leaf component).
pub struct PersistClassificationCache {
    pub(crate) store: Arc<Mutex<Connection>>,
}

impl ClassificationCache for PersistClassificationCache {
    fn get(&self, filter_name: &str, blob_id: ObjectId) -> Option<bool> {
        self.store
            .lock()
            .unwrap()
            .get_binary_classification(filter_name, blob_id.as_bytes())
            .unwrap_or(None)
    }

    fn put(&self, filter_name: &str, blob_id: ObjectId, is_binary: bool) {
        let _ = self
            .store
            .lock()
            .unwrap()
            .put_binary_classification(filter_name, blob_id.as_bytes(), is_binary);
    }
}

/// Everything the session/delta/commit-editor layer needs for one mapped
/// repository and branch.
pub struct RepoContext {
    pub repo: Arc<Mutex<Repository>>,
    pub store: Arc<Mutex<Connection>>,
    pub engine: Engine,
    pub cache: PersistClassificationCache,
    pub hooks: svn_hooks::HookRunner,
    pub rename_detection: bool,
    pub locks: LockRegistry,
    /// Serialises `commit` end to end (§4.4, §5: "the branch write lock"):
    /// held for the whole duration of one client's editor exchange, not just
    /// the final ref compare-and-set, so two committers can't interleave
    /// edits against the same base revision.
    pub commit_lock: Mutex<()>,
    /// Identifies this repository to clients across reconnects within one
    /// server run (the session announce step, §4.2). Real `svnserve`
    /// persists this in the repository's `db/uuid` file; we don't have an
    /// equivalent slot in the backing object store, so this is stable only
    /// for the lifetime of the `RepoContext` (i.e. across sessions sharing
    /// one server process, not across restarts).
    pub uuid: String,
}

impl RepoContext {
    pub fn open(root: &Path, branch_name: &str, hook_command_timeout: Duration) -> Result<Self> {
        let repo = Arc::new(Mutex::new(Repository::open(root)?));
        let store = Arc::new(Mutex::new(Connection::open(&root.join("svnbridge.db"))?));
        let engine = Engine::new(Arc::clone(&repo), Arc::clone(&store), branch_name);
        engine.sync()?;

        let cache = PersistClassificationCache {
            store: Arc::clone(&store),
        };
        let hooks = svn_hooks::HookRunner::new(root.join("hooks"), hook_command_timeout);
        let locks = LockRegistry::new(Arc::clone(&store), branch_name.to_string());

        Ok(Self {
            repo,
            store,
            engine,
            cache,
            hooks,
            rename_detection: true,
            locks,
            commit_lock: Mutex::new(()),
            uuid: uuid::Uuid::new_v4().to_string(),
        })
    }

    /// Initialises a brand-new bare repository with no commits (the `--init`
    /// subcommand, §2a): revision 0 is the well-defined empty tree and needs
    /// no object written for it.
    pub fn init(root: &Path) -> Result<()> {
        Repository::init_bare(root)?;
        Ok(())
    }
}

/// The process-wide shared context: the resolved configuration and every
/// currently-open repository, keyed by its mapping entry's repository path.
/// Built once at startup and handed to the acceptor; every session borrows
/// it for the lifetime of the connection.
pub struct SharedContext {
    pub config: ServerConfig,
    repositories: Mutex<HashMap<String, Arc<RepoContext>>>,
    next_session_id: AtomicU64,
}

impl SharedContext {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            repositories: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
        }
    }

    pub fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Resolves `repository_path` against the configured mapping, opening
    /// (and caching) the `RepoContext` on first use.
    pub fn repository_for_path(&self, repository_path: &str) -> Result<(Arc<RepoContext>, String)> {
        let (entry, remainder) = crate::config::resolve_repository(&self.config.repository_mapping, repository_path)
            .ok_or_else(|| Error::UnknownRepository(repository_path.to_string()))?;

        let branch = if remainder.is_empty() {
            entry.default_branch.clone()
        } else {
            remainder.to_string()
        };

        let ctx = self.open_or_get(entry, &branch)?;
        Ok((ctx, branch))
    }

    fn open_or_get(&self, entry: &RepositoryMappingEntry, branch: &str) -> Result<Arc<RepoContext>> {
        let key = format!("{}#{}", entry.repository_path.display(), branch);

        let mut repositories = self.repositories.lock().unwrap();
        if let Some(ctx) = repositories.get(&key) {
            return Ok(Arc::clone(ctx));
        }

        let ctx = Arc::new(RepoContext::open(
            &entry.repository_path,
            branch,
            self.config.hook_command_timeout,
        )?);
        repositories.insert(key, Arc::clone(&ctx));
        Ok(ctx)
    }
}
