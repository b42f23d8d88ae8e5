//! Pid-file lifecycle: one scraper per run directory, stop via a marker file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const PID_FILE: &str = "scraper.pid";
const STOP_FILE: &str = "scraper.stop";

#[derive(Debug)]
pub enum LifecycleError {
    AlreadyRunning(PathBuf),
    NotRunning(PathBuf),
    Io(std::io::Error),
}

impl From<std::io::Error> for LifecycleError {
    fn from(err: std::io::Error) -> Self {
        LifecycleError::Io(err)
    }
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleError::AlreadyRunning(path) => {
                write!(f, "Scraper already running (pid file {} exists)", path.display())
            }
            LifecycleError::NotRunning(path) => {
                write!(f, "Scraper not running (no pid file at {})", path.display())
            }
            LifecycleError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for LifecycleError {}

/// Exclusive claim on a run directory, released on drop.
///
/// Acquiring writes `scraper.pid`; a second acquire against the same
/// directory fails until the first lock is dropped. `scraper.stop` is the
/// out-of-process stop signal, polled by the daemon's monitor.
pub struct RunLock {
    pid_path: PathBuf,
    stop_path: PathBuf,
}

impl RunLock {
    pub fn acquire(run_dir: impl AsRef<Path>) -> Result<Self, LifecycleError> {
        let run_dir = run_dir.as_ref();
        fs::create_dir_all(run_dir)?;

        let pid_path = run_dir.join(PID_FILE);
        let stop_path = run_dir.join(STOP_FILE);

        // A marker left over from a previous run must not stop this one
        if stop_path.exists() {
            fs::remove_file(&stop_path)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&pid_path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    LifecycleError::AlreadyRunning(pid_path.clone())
                } else {
                    LifecycleError::Io(e)
                }
            })?;
        write!(file, "{}", std::process::id())?;

        Ok(RunLock {
            pid_path,
            stop_path,
        })
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_path.exists()
    }

    pub fn stop_marker_path(&self) -> &Path {
        &self.stop_path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.pid_path);
        let _ = fs::remove_file(&self.stop_path);
    }
}

/// Ask a running scraper to drain and exit by dropping the stop marker in
/// its run directory.
pub fn request_stop(run_dir: impl AsRef<Path>) -> Result<(), LifecycleError> {
    let run_dir = run_dir.as_ref();
    let pid_path = run_dir.join(PID_FILE);
    if !pid_path.exists() {
        return Err(LifecycleError::NotRunning(pid_path));
    }
    fs::write(run_dir.join(STOP_FILE), b"stop")?;
    Ok(())
}
