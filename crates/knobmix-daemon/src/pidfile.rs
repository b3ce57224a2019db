//! Single-instance guard for the knob panel.
//!
//! Only one process may own the panel's serial port. The guard file holds
//! the owner's PID on the first line and the port it was pinned to (or
//! `auto` when it scans) on the second, so a refused second instance can
//! say which port is taken.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use tracing::{debug, info, warn};

use crate::error::{DaemonError, DaemonResult};

/// Port marker written when the owner scans for the panel.
const AUTO_PORT: &str = "auto";

/// Contents of a guard file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelOwner {
    /// Process holding the panel.
    pub pid: u32,
    /// Port the process was pinned to, `None` when it scans.
    pub port: Option<String>,
}

impl PanelOwner {
    fn current(port: Option<&str>) -> Self {
        Self {
            pid: process::id(),
            port: port.map(str::to_string),
        }
    }

    /// Parses a guard file. A file with only a PID line is accepted.
    pub fn parse(contents: &str) -> Option<Self> {
        let mut lines = contents.lines().map(str::trim);
        let pid = lines.next()?.parse::<u32>().ok()?;
        let port = match lines.next() {
            None | Some("") | Some(AUTO_PORT) => None,
            Some(port) => Some(port.to_string()),
        };
        Some(Self { pid, port })
    }

    fn render(&self) -> String {
        format!("{}\n{}\n", self.pid, self.port_label())
    }

    /// Port name for messages.
    pub fn port_label(&self) -> &str {
        self.port.as_deref().unwrap_or(AUTO_PORT)
    }
}

/// Guard file that claims the panel for this process and is removed on drop.
pub struct PidFile {
    path: PathBuf,
    owner: PanelOwner,
}

impl PidFile {
    /// Claims the panel at `path` for this process.
    ///
    /// `port` is the pinned serial port, if any. Fails with
    /// [`DaemonError::AlreadyRunning`] while another live process holds the
    /// file; a file left by a dead process or one that cannot be parsed is
    /// replaced.
    pub fn create(path: impl Into<PathBuf>, port: Option<&str>) -> DaemonResult<Self> {
        let path = path.into();

        match fs::read_to_string(&path) {
            Ok(contents) => match PanelOwner::parse(&contents) {
                Some(owner) if is_process_running(owner.pid) => {
                    return Err(DaemonError::already_running(
                        path.to_string_lossy(),
                        owner.pid,
                        owner.port_label(),
                    ));
                }
                Some(owner) => {
                    warn!(path = %path.display(), pid = owner.pid, port = owner.port_label(), "Replacing guard left by a dead process");
                }
                None => {
                    warn!(path = %path.display(), "Replacing unreadable guard file");
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let owner = PanelOwner::current(port);
        fs::write(&path, owner.render())?;
        info!(path = %path.display(), pid = owner.pid, port = owner.port_label(), "Claimed knob panel");

        Ok(Self { path, owner })
    }

    /// Returns the path to the guard file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns what this process wrote into the guard file.
    pub fn owner(&self) -> &PanelOwner {
        &self.owner
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Released knob panel"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove guard file"),
        }
    }
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    if pid == process::id() {
        return true;
    }
    // Signal 0 only checks that the process exists.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    true
}

/// Returns the default guard file path.
///
/// Uses `$XDG_RUNTIME_DIR/knobmix.pid` if available, otherwise falls back to
/// `knobmix-$UID.pid` in the temporary directory.
pub fn default_pid_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("knobmix.pid")
    } else {
        #[cfg(unix)]
        let uid = unsafe { libc::getuid() };
        #[cfg(not(unix))]
        let uid = 0;
        std::env::temp_dir().join(format!("knobmix-{}.pid", uid))
    }
}
