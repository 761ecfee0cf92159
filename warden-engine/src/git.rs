//! Git execution seam.
//!
//! No processor shells out directly; everything on-disk goes through a
//! [`GitRunner`]. [`ProcessGitRunner`] spawns the `git` binary with a hard
//! timeout per invocation; [`FakeGitRunner`] records calls and returns
//! scripted results for tests.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::Error;

/// Result of running the configured pre-receive hook.
#[derive(Debug, Clone)]
pub struct HookOutcome {
    /// 0 = approve automatically, 1 = reject, 2 = hold for manual review.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// On-disk Git operations the chain needs, all bounded by a timeout.
pub trait GitRunner: Send + Sync {
    /// Clone `url` into `workdir`. The directory must not exist yet.
    fn clone_repo(&self, url: &str, workdir: &Path) -> Result<(), Error>;

    /// Fetch a ref from origin into the working clone. Needed for target
    /// refs outside the default clone refspec.
    fn fetch(&self, workdir: &Path, refspec: &str) -> Result<(), Error>;

    /// Apply a raw receive-pack request body to the working clone.
    fn write_pack(&self, workdir: &Path, body: &[u8]) -> Result<(), Error>;

    /// Unified diff between two commits in the working clone.
    fn diff(&self, workdir: &Path, from: &str, to: &str) -> Result<String, Error>;

    /// Run the pre-receive hook script against the working clone, feeding
    /// the ref-update line on stdin.
    fn pre_receive_hook(
        &self,
        hook: &Path,
        workdir: &Path,
        stdin: &[u8],
    ) -> Result<HookOutcome, Error>;

    /// Forward the raw request body to the upstream receive-pack endpoint
    /// and return its response bytes.
    fn receive_pack(&self, url: &str, body: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Output of one bounded subprocess run.
struct RunOutput {
    exit_code: i32,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// [`GitRunner`] that shells out to the `git` binary.
#[derive(Debug, Clone)]
pub struct ProcessGitRunner {
    timeout: Duration,
}

impl ProcessGitRunner {
    pub fn new(timeout: Duration) -> Self {
        ProcessGitRunner { timeout }
    }

    /// Spawn, feed stdin, poll until exit or deadline. A process still
    /// running at the deadline is killed and reported as an upstream
    /// failure.
    fn run(&self, mut command: Command, stdin: Option<&[u8]>, what: &str) -> Result<RunOutput, Error> {
        command
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| Error::Upstream(format!("failed to spawn {what}: {e}")))?;

        // Readers must be draining before stdin is fed, or a chatty child
        // can fill its output pipe while we block writing.
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        if let Some(data) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                // A child that exits early closes the pipe; that is its
                // answer, not ours to error on.
                let _ = pipe.write_all(data);
            }
        }

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::Upstream(format!(
                        "{what} timed out after {}s",
                        self.timeout.as_secs()
                    )));
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(25)),
                Err(e) => {
                    return Err(Error::Upstream(format!("failed to wait on {what}: {e}")));
                }
            }
        };

        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);
        Ok(RunOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    fn run_git(&self, args: &[&str], cwd: Option<&Path>, stdin: Option<&[u8]>) -> Result<RunOutput, Error> {
        let mut command = Command::new("git");
        command.args(args);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        let what = format!("git {}", args.first().unwrap_or(&""));
        let output = self.run(command, stdin, &what)?;
        if output.exit_code != 0 {
            tracing::warn!(
                command = %what,
                exit = output.exit_code,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "git invocation failed"
            );
            return Err(Error::Upstream(format!(
                "{what} exited with status {}",
                output.exit_code
            )));
        }
        Ok(output)
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = source.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(handle: Option<std::thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

impl GitRunner for ProcessGitRunner {
    fn clone_repo(&self, url: &str, workdir: &Path) -> Result<(), Error> {
        let dir = workdir.to_string_lossy();
        self.run_git(&["clone", url, dir.as_ref()], None, None)?;
        Ok(())
    }

    fn fetch(&self, workdir: &Path, refspec: &str) -> Result<(), Error> {
        self.run_git(&["fetch", "origin", refspec], Some(workdir), None)?;
        Ok(())
    }

    fn write_pack(&self, workdir: &Path, body: &[u8]) -> Result<(), Error> {
        self.run_git(&["receive-pack", "."], Some(workdir), Some(body))?;
        Ok(())
    }

    fn diff(&self, workdir: &Path, from: &str, to: &str) -> Result<String, Error> {
        let output = self.run_git(&["diff", from, to], Some(workdir), None)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn pre_receive_hook(
        &self,
        hook: &Path,
        workdir: &Path,
        stdin: &[u8],
    ) -> Result<HookOutcome, Error> {
        let mut command = Command::new(hook);
        command.current_dir(workdir);
        let output = self.run(command, Some(stdin), "pre-receive hook")?;
        Ok(HookOutcome {
            exit_code: output.exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn receive_pack(&self, url: &str, body: &[u8]) -> Result<Vec<u8>, Error> {
        let output = self.run_git(&["receive-pack", url], None, Some(body))?;
        Ok(output.stdout)
    }
}

/// Scriptable [`GitRunner`] for tests: records every call and returns
/// configured results without touching the filesystem.
#[derive(Debug, Default)]
pub struct FakeGitRunner {
    /// Human-readable record of calls, in order.
    pub calls: Mutex<Vec<String>>,
    /// Diff text returned by [`GitRunner::diff`].
    pub diff_output: Mutex<String>,
    /// Exit code returned by the pre-receive hook, if one runs.
    pub hook_exit: Mutex<i32>,
    /// When set, every operation fails with this upstream message.
    pub fail_with: Mutex<Option<String>>,
}

impl FakeGitRunner {
    pub fn new() -> Self {
        FakeGitRunner {
            hook_exit: Mutex::new(2),
            ..FakeGitRunner::default()
        }
    }

    pub fn set_diff(&self, diff: &str) {
        if let Ok(mut out) = self.diff_output.lock() {
            *out = diff.to_owned();
        }
    }

    pub fn set_hook_exit(&self, code: i32) {
        if let Ok(mut exit) = self.hook_exit.lock() {
            *exit = code;
        }
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) -> Result<(), Error> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        match self.fail_with.lock() {
            Ok(fail) => match fail.as_ref() {
                Some(message) => Err(Error::Upstream(message.clone())),
                None => Ok(()),
            },
            Err(_) => Err(Error::Internal("fake runner lock poisoned".into())),
        }
    }
}

impl GitRunner for FakeGitRunner {
    fn clone_repo(&self, url: &str, workdir: &Path) -> Result<(), Error> {
        self.record(format!("clone {url} -> {}", workdir.display()))?;
        std::fs::create_dir_all(workdir)
            .map_err(|e| Error::Internal(format!("fake clone: {e}")))?;
        Ok(())
    }

    fn fetch(&self, _workdir: &Path, refspec: &str) -> Result<(), Error> {
        self.record(format!("fetch {refspec}"))
    }

    fn write_pack(&self, workdir: &Path, body: &[u8]) -> Result<(), Error> {
        self.record(format!("write-pack {} ({} bytes)", workdir.display(), body.len()))
    }

    fn diff(&self, _workdir: &Path, from: &str, to: &str) -> Result<String, Error> {
        self.record(format!("diff {from} {to}"))?;
        Ok(self
            .diff_output
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default())
    }

    fn pre_receive_hook(
        &self,
        hook: &Path,
        _workdir: &Path,
        _stdin: &[u8],
    ) -> Result<HookOutcome, Error> {
        self.record(format!("hook {}", hook.display()))?;
        Ok(HookOutcome {
            exit_code: self.hook_exit.lock().map(|e| *e).unwrap_or(2),
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    fn receive_pack(&self, url: &str, body: &[u8]) -> Result<Vec<u8>, Error> {
        self.record(format!("receive-pack {url} ({} bytes)", body.len()))?;
        Ok(b"000eunpack ok\n0000".to_vec())
    }
}

/// Where a push's exclusive working clone lives.
pub fn workdir_for(root: &Path, push_id: &str) -> PathBuf {
    root.join(push_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fake_runner_records_calls_in_order() {
        let git = FakeGitRunner::new();
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("a__b");
        git.clone_repo("https://example.com/r.git", &workdir).unwrap();
        git.write_pack(&workdir, b"PACK").unwrap();
        let calls = git.recorded_calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("clone "));
        assert!(calls[1].starts_with("write-pack "));
    }

    #[test]
    fn fake_runner_failure_propagates_as_upstream() {
        let git = FakeGitRunner::new();
        *git.fail_with.lock().unwrap() = Some("remote hung up".into());
        let err = git.diff(Path::new("/tmp/x"), "a", "b").unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::Upstream);
    }

    #[test]
    fn workdir_is_keyed_by_push_id() {
        let dir = workdir_for(Path::new("/var/warden"), "aaa__bbb");
        assert_eq!(dir, PathBuf::from("/var/warden/aaa__bbb"));
    }
}
