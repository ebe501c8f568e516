//! Entry point (§2a, §9): parse CLI/config, optionally initialise a bare
//! repository and exit, otherwise build the shared context and run the
//! acceptor loop until shutdown.

use std::sync::Arc;

use structopt::StructOpt;

mod acceptor;
mod commit_editor;
mod config;
mod delta;
mod error;
mod locks;
mod session;
mod shared;
mod treediff;

use config::Opt;
use shared::{RepoContext, SharedContext};

fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    init_logging(&opt)?;

    if let Some(path) = &opt.init {
        RepoContext::init(path)?;
        log::info!("initialised empty repository at {}", path.display());
        return Ok(());
    }

    let config = config::load(&opt)?;
    let context = Arc::new(SharedContext::new(config));

    acceptor::serve(context)
}

/// Sets up `flexi_logger` the way the rest of the server expects: level from
/// `-v`/`-q` (§2a), coloured terminal output, no file sink by default.
fn init_logging(opt: &Opt) -> anyhow::Result<()> {
    flexi_logger::Logger::try_with_env_or_str(opt.log_level().to_string())?
        .start()
        .map(|_| ())
        .map_err(anyhow::Error::from)
}
