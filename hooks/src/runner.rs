use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Which hook is being invoked (§4.4a). Mirrors `pre-receive`/`post-receive`
/// from the abstract design, named after the `svnserve` hook files they
/// resolve to on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    PreCommit,
    PostCommit,
}

impl HookKind {
    fn file_name(self) -> &'static str {
        match self {
            HookKind::PreCommit => "pre-commit",
            HookKind::PostCommit => "post-commit",
        }
    }
}

/// The result of attempting to run a hook.
#[derive(Debug, Clone, Copy)]
pub struct HookOutcome {
    /// `false` if no executable was found at the hook's path: an absent
    /// hook is not a failure, matching Git's own convention.
    pub ran: bool,
    pub success: bool,
    pub timed_out: bool,
}

impl HookOutcome {
    fn skipped() -> Self {
        Self {
            ran: false,
            success: true,
            timed_out: false,
        }
    }
}

/// Resolves and runs `pre-commit`/`post-commit` executables from a
/// per-repository `hooks/` directory (§4.4a). Hook stdout/stderr are piped
/// and forwarded line-by-line into the server's own log, and execution is
/// bounded by a configured timeout; a hook that doesn't exit in time is
/// killed and reported as timed out.
pub struct HookRunner {
    hooks_dir: PathBuf,
    timeout: Duration,
}

impl HookRunner {
    pub fn new(hooks_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            hooks_dir: hooks_dir.into(),
            timeout,
        }
    }

    pub fn run<A, K, V>(&self, kind: HookKind, args: &[A], envs: &[(K, V)]) -> Result<HookOutcome>
    where
        A: AsRef<OsStr>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        let path = self.hooks_dir.join(kind.file_name());
        if !is_executable(&path) {
            return Ok(HookOutcome::skipped());
        }

        let mut command = std::process::Command::new(&path);
        command
            .args(args)
            .envs(envs.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(Error::Spawn)?;
        let stdout = child.stdout.take().ok_or_else(|| Error::OutputPipeCreate {
            err: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "no stdout pipe"),
            pipe: "stdout".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| Error::OutputPipeCreate {
            err: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "no stderr pipe"),
            pipe: "stderr".to_string(),
        })?;

        let stdout_handle = thread::spawn(move || log_pipe(stdout, log::Level::Debug));
        let stderr_handle = thread::spawn(move || log_pipe(stderr, log::Level::Info));

        let (status, timed_out) = wait_with_timeout(child, self.timeout)?;

        let _ = stdout_handle.join();
        let _ = stderr_handle.join();

        Ok(HookOutcome {
            ran: true,
            success: status.success(),
            timed_out,
        })
    }
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(metadata) => metadata.is_file() && metadata.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Polls `child` for completion, killing it if `timeout` elapses first. The
/// watchdog thread that performs the kill runs detached: once this function
/// observes an exit status it returns immediately rather than waiting for
/// the watchdog's sleep to finish.
fn wait_with_timeout(child: Child, timeout: Duration) -> Result<(std::process::ExitStatus, bool)> {
    let child = Arc::new(Mutex::new(child));
    let timed_out = Arc::new(AtomicBool::new(false));

    let watchdog_child = Arc::clone(&child);
    let watchdog_timed_out = Arc::clone(&timed_out);
    thread::spawn(move || {
        thread::sleep(timeout);
        let mut guard = watchdog_child.lock().unwrap();
        if matches!(guard.try_wait(), Ok(None)) {
            log::error!("hook exceeded its timeout of {:?} and was killed", timeout);
            watchdog_timed_out.store(true, Ordering::SeqCst);
            let _ = guard.kill();
            let _ = guard.wait();
        }
    });

    loop {
        let mut guard = child.lock().unwrap();
        if let Some(status) = guard.try_wait().map_err(Error::Wait)? {
            return Ok((status, timed_out.load(Ordering::SeqCst)));
        }
        drop(guard);
        thread::sleep(POLL_INTERVAL);
    }
}

fn log_pipe<R: Read>(reader: R, level: log::Level) {
    for line in BufReader::new(reader).lines() {
        match line {
            Ok(line) => log::log!(level, "{}", line),
            Err(e) => {
                log::debug!("error reading hook output: {:?}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_hook(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }

    #[test]
    fn test_missing_hook_is_skipped() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let runner = HookRunner::new(dir.path(), Duration::from_secs(5));
        let outcome = runner.run::<&str, &str, &str>(HookKind::PreCommit, &[], &[])?;
        assert!(!outcome.ran);
        assert!(outcome.success);
        Ok(())
    }

    #[test]
    fn test_successful_hook_reports_success() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_hook(dir.path(), "pre-commit", "#!/bin/sh\necho hello\nexit 0\n");

        let runner = HookRunner::new(dir.path(), Duration::from_secs(5));
        let outcome = runner.run::<&str, &str, &str>(HookKind::PreCommit, &[], &[])?;
        assert!(outcome.ran);
        assert!(outcome.success);
        assert!(!outcome.timed_out);
        Ok(())
    }

    #[test]
    fn test_failing_hook_reports_failure() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_hook(dir.path(), "pre-commit", "#!/bin/sh\nexit 1\n");

        let runner = HookRunner::new(dir.path(), Duration::from_secs(5));
        let outcome = runner.run::<&str, &str, &str>(HookKind::PreCommit, &[], &[])?;
        assert!(outcome.ran);
        assert!(!outcome.success);
        Ok(())
    }

    #[test]
    fn test_timed_out_hook_is_killed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_hook(dir.path(), "post-commit", "#!/bin/sh\nsleep 5\n");

        let runner = HookRunner::new(dir.path(), Duration::from_millis(100));
        let outcome = runner.run::<&str, &str, &str>(HookKind::PostCommit, &[], &[])?;
        assert!(outcome.ran);
        assert!(!outcome.success);
        assert!(outcome.timed_out);
        Ok(())
    }

    #[test]
    fn test_args_and_env_are_passed_through() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_hook(
            dir.path(),
            "pre-commit",
            "#!/bin/sh\n[ \"$1\" = \"deadbeef\" ] && [ \"$SVN_AUTHOR\" = \"alice\" ]\n",
        );

        let runner = HookRunner::new(dir.path(), Duration::from_secs(5));
        let outcome = runner.run(HookKind::PreCommit, &["deadbeef"], &[("SVN_AUTHOR", "alice")])?;
        assert!(outcome.success);
        Ok(())
    }
}
