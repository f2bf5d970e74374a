//! Subprocess execution: runs a materialized build-script phase, merges its
//! stdout/stderr into a single log stream, and restores the working directory
//! afterward no matter how the phase ends.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

use log::info;

use crate::error::{MusselsError, Result};

/// Restores the process-wide working directory on drop, covering every exit path
/// (success, error return, or panic unwind) through a single script phase.
pub struct CwdGuard {
    original: PathBuf,
}

impl CwdGuard {
    pub fn enter(dir: &Path) -> Result<Self> {
        let original = std::env::current_dir()?;
        std::env::set_current_dir(dir)?;
        Ok(Self { original })
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.original);
    }
}

/// Runs `script_path` with `cwd` as its working directory and `path_prepend`
/// directories added to the front of `PATH`, in order, ahead of the inherited
/// value. Merged stdout+stderr is streamed line-by-line to `log_path` as it's
/// produced, preserving each stream's own ordering (interleaving between the two
/// is not guaranteed, matching an unsynchronized pair of reader threads).
/// `log_path` is opened in append mode: callers share one path across every
/// phase of a recipe so the log accumulates configure/make/install in order.
pub fn run_script(
    phase: &str,
    script_path: &Path,
    cwd: &Path,
    path_prepend: &[String],
    log_path: &Path,
) -> Result<()> {
    let _guard = CwdGuard::enter(cwd)?;

    let mut path_var = std::env::var_os("PATH").unwrap_or_default();
    if !path_prepend.is_empty() {
        let mut joined: Vec<OsString> = path_prepend.iter().map(OsString::from).collect();
        joined.push(path_var);
        path_var = std::env::join_paths(joined).unwrap_or_default();
    }

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log_file = OpenOptions::new().create(true).append(true).open(log_path)?;
    let log = Arc::new(Mutex::new(BufWriter::new(log_file)));

    info!("running {phase} script: {}", script_path.display());
    let mut child = platform_command(script_path)
        .current_dir(cwd)
        .env("PATH", &path_var)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child.stdout.take().expect("child spawned with piped stdout");
    let stderr = child.stderr.take().expect("child spawned with piped stderr");

    let out_log = Arc::clone(&log);
    let out_thread = thread::spawn(move || stream_lines(stdout, out_log));
    let err_log = Arc::clone(&log);
    let err_thread = thread::spawn(move || stream_lines(stderr, err_log));
    let _ = out_thread.join();
    let _ = err_thread.join();

    let status = child.wait()?;
    if !status.success() {
        return Err(MusselsError::ScriptFailed {
            phase: phase.to_string(),
            exit_code: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}

fn stream_lines(reader: impl std::io::Read, log: Arc<Mutex<BufWriter<File>>>) {
    for line in BufReader::new(reader).lines().map_while(std::result::Result::ok) {
        println!("{line}");
        if let Ok(mut log) = log.lock() {
            let _ = writeln!(log, "{line}");
        }
    }
}

#[cfg(unix)]
fn platform_command(script_path: &Path) -> Command {
    Command::new(script_path)
}

#[cfg(windows)]
fn platform_command(script_path: &Path) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(script_path);
    command
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("script.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn successful_script_logs_its_output() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "echo building");
        let log_path = dir.path().join("logs").join("run.log");
        run_script("make", &script, dir.path(), &[], &log_path).unwrap();
        let logged = std::fs::read_to_string(&log_path).unwrap();
        assert!(logged.contains("building"));
    }

    #[test]
    fn repeated_runs_against_the_same_log_append_instead_of_truncating() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("logs").join("run.log");

        let configure = write_script(dir.path(), "echo configuring");
        run_script("configure", &configure, dir.path(), &[], &log_path).unwrap();
        let install = write_script(dir.path(), "echo installing");
        run_script("install", &install, dir.path(), &[], &log_path).unwrap();

        let logged = std::fs::read_to_string(&log_path).unwrap();
        assert!(logged.contains("configuring"));
        assert!(logged.contains("installing"));
    }

    #[test]
    fn nonzero_exit_is_script_failed() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "exit 7");
        let log_path = dir.path().join("run.log");
        let err = run_script("make", &script, dir.path(), &[], &log_path).unwrap_err();
        assert!(matches!(err, MusselsError::ScriptFailed { exit_code: 7, .. }));
    }

    #[test]
    fn cwd_guard_restores_directory_on_early_return() {
        let dir = tempdir().unwrap();
        let before = std::env::current_dir().unwrap();
        {
            let _guard = CwdGuard::enter(dir.path()).unwrap();
            assert_eq!(std::env::current_dir().unwrap(), dir.path().canonicalize().unwrap());
        }
        assert_eq!(std::env::current_dir().unwrap(), before);
    }
}
