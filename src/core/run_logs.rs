//! Per-run log directory
//!
//! Pipeline processes write their output under `<home>/Logs`. The directory
//! is wiped on the first detection start after the controller boots, then
//! every start gets its own index so files from successive runs sit side by
//! side: `<dir>/<root>.<index>.<ext>`.

use std::io;
use std::path::{Path, PathBuf};

/// Name of the log directory under the home directory
pub const LOG_DIR_NAME: &str = "Logs";

/// Log directory and run counter
#[derive(Debug, Clone)]
pub struct RunLogs {
    dir: PathBuf,
    start_index: u32,
}

impl RunLogs {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            start_index: 0,
        }
    }

    pub fn for_home(home: &Path) -> Self {
        Self::new(home.join(LOG_DIR_NAME))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Index of the current run; 0 before the first start
    pub fn start_index(&self) -> u32 {
        self.start_index
    }

    /// Begin a new run, returning its index
    pub fn detectors_started(&mut self) -> io::Result<u32> {
        if self.start_index == 0 {
            match std::fs::remove_dir_all(&self.dir) {
                Ok(()) => crate::log_debug!("Cleared log directory {}", self.dir.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        std::fs::create_dir_all(&self.dir)?;
        self.start_index += 1;
        Ok(self.start_index)
    }

    /// Path of a log file for the current run
    pub fn file_name(&self, root: &str, extension: &str) -> PathBuf {
        self.dir
            .join(format!("{root}.{}.{extension}", self.start_index))
    }
}
