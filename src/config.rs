//! Configuration loading (§2a, §3a): a `structopt` CLI layered over an
//! optional TOML file. CLI flags override file values; the file is
//! optional.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use structopt::StructOpt;

#[derive(Debug, Clone, StructOpt)]
#[structopt(name = "svnbridge", about = "A wire-protocol bridge onto a content-addressed object store")]
pub struct Opt {
    #[structopt(long, short = "c", help = "path to an optional TOML configuration file")]
    pub config: Option<PathBuf>,

    #[structopt(long, help = "address to bind the listener to")]
    pub host: Option<String>,

    #[structopt(long, help = "port to bind the listener to")]
    pub port: Option<u16>,

    #[structopt(long, help = "authentication realm announced to clients")]
    pub realm: Option<String>,

    #[structopt(short, parse(from_occurrences), help = "increase log verbosity (-v, -vv)")]
    pub verbose: u8,

    #[structopt(short, long, help = "suppress all but warning/error log output")]
    pub quiet: bool,

    #[structopt(long, help = "create an empty repository at the given path and exit")]
    pub init: Option<PathBuf>,
}

impl Opt {
    /// The `log` level implied by `-v`/`-vv`/`-q` (§2a).
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Warn;
        }
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    realm: Option<String>,
    reuse_address: Option<bool>,
    compression_enabled: Option<bool>,
    cache: Option<CacheFileConfig>,
    repository_mapping: Vec<RepositoryMappingEntry>,
    user_db: HashMap<String, String>,
    shared_extensions: Vec<String>,
    hook_command_timeout_seconds: Option<u64>,
    idle_timeout_seconds: Option<u64>,
    auth_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum CacheFileConfig {
    InMemory { capacity: Option<usize> },
    OnDisk { path: PathBuf },
}

/// One entry of the repository mapping (§6): a longest-prefix match of the
/// URL's repository path selects a repository root and default branch.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryMappingEntry {
    pub url_prefix: String,
    pub repository_path: PathBuf,
    pub default_branch: String,
}

#[derive(Debug, Clone)]
pub enum CacheConfig {
    InMemory { capacity: usize },
    OnDisk { path: PathBuf },
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::InMemory { capacity: 4096 }
    }
}

/// A static username→password-hash map backing the built-in authenticator.
#[derive(Debug, Clone, Default)]
pub struct UserDbConfig {
    pub users: HashMap<String, String>,
}

/// The server's fully-resolved configuration (§3a), assembled from the CLI
/// and an optional TOML file. This is the value handed to every subsystem
/// through the shared context (§9).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub realm: String,
    pub reuse_address: bool,
    pub compression_enabled: bool,
    pub cache: CacheConfig,
    pub repository_mapping: Vec<RepositoryMappingEntry>,
    pub user_db: UserDbConfig,
    pub shared_extensions: Vec<String>,
    pub hook_command_timeout: Duration,
    pub idle_timeout: Duration,
    pub auth_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3690,
            realm: "svnbridge".to_string(),
            reuse_address: true,
            compression_enabled: false,
            cache: CacheConfig::default(),
            repository_mapping: Vec::new(),
            user_db: UserDbConfig::default(),
            shared_extensions: Vec::new(),
            hook_command_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            auth_timeout: Duration::from_secs(30),
        }
    }
}

/// Loads the optional TOML file named by `opt.config`, then overlays any
/// CLI flags the operator passed explicitly.
pub fn load(opt: &Opt) -> anyhow::Result<ServerConfig> {
    let mut config = ServerConfig::default();

    if let Some(path) = &opt.config {
        let text = std::fs::read_to_string(path)?;
        let file: FileConfig = toml::from_str(&text)?;
        apply_file(&mut config, file);
    }

    if let Some(host) = &opt.host {
        config.host = host.clone();
    }
    if let Some(port) = opt.port {
        config.port = port;
    }
    if let Some(realm) = &opt.realm {
        config.realm = realm.clone();
    }

    Ok(config)
}

fn apply_file(config: &mut ServerConfig, file: FileConfig) {
    if let Some(host) = file.host {
        config.host = host;
    }
    if let Some(port) = file.port {
        config.port = port;
    }
    if let Some(realm) = file.realm {
        config.realm = realm;
    }
    if let Some(reuse_address) = file.reuse_address {
        config.reuse_address = reuse_address;
    }
    if let Some(compression_enabled) = file.compression_enabled {
        config.compression_enabled = compression_enabled;
    }
    if let Some(cache) = file.cache {
        config.cache = match cache {
            CacheFileConfig::InMemory { capacity } => CacheConfig::InMemory {
                capacity: capacity.unwrap_or(4096),
            },
            CacheFileConfig::OnDisk { path } => CacheConfig::OnDisk { path },
        };
    }
    if !file.repository_mapping.is_empty() {
        config.repository_mapping = file.repository_mapping;
    }
    if !file.user_db.is_empty() {
        config.user_db = UserDbConfig { users: file.user_db };
    }
    if !file.shared_extensions.is_empty() {
        config.shared_extensions = file.shared_extensions;
    }
    if let Some(secs) = file.hook_command_timeout_seconds {
        config.hook_command_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = file.idle_timeout_seconds {
        config.idle_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = file.auth_timeout_seconds {
        config.auth_timeout = Duration::from_secs(secs);
    }
}

/// Resolves a repository path (the part of the URL after the host) against
/// the configured mapping, by longest matching prefix (§6).
pub fn resolve_repository<'a>(
    mapping: &'a [RepositoryMappingEntry],
    repository_path: &str,
) -> Option<(&'a RepositoryMappingEntry, &'a str)> {
    mapping
        .iter()
        .filter(|entry| repository_path.starts_with(entry.url_prefix.as_str()))
        .max_by_key(|entry| entry.url_prefix.len())
        .map(|entry| (entry, repository_path[entry.url_prefix.len()..].trim_start_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> Vec<RepositoryMappingEntry> {
        vec![
            RepositoryMappingEntry {
                url_prefix: "repo".to_string(),
                repository_path: PathBuf::from("/srv/repo"),
                default_branch: "trunk".to_string(),
            },
            RepositoryMappingEntry {
                url_prefix: "repo/sub".to_string(),
                repository_path: PathBuf::from("/srv/sub"),
                default_branch: "trunk".to_string(),
            },
        ]
    }

    #[test]
    fn test_resolve_repository_picks_longest_prefix() {
        let mapping = mapping();
        let (entry, remainder) = resolve_repository(&mapping, "repo/sub/branches/foo").unwrap();
        assert_eq!(entry.repository_path, PathBuf::from("/srv/sub"));
        assert_eq!(remainder, "branches/foo");
    }

    #[test]
    fn test_resolve_repository_none_when_unmapped() {
        let mapping = mapping();
        assert!(resolve_repository(&mapping, "other").is_none());
    }
}
