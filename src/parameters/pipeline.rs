//! `[pipeline]` section
//!
//! Program entries are either bare names, looked up on `PATH`, or paths.
//! Relative paths are resolved against the home directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::supervisor::RestartPolicy;

/// Airspy receiver arguments used when no override file exists
pub const DEFAULT_AIRSPY_ARGS: &str = "-h 21 -t 0";

/// External SDR pipeline parameters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineParams {
    /// Base directory for logs, captures and relative program paths;
    /// `$HOME` when unset
    pub home: Option<PathBuf>,
    pub airspy_rx: String,
    pub airspyhf_rx: String,
    pub csdr: String,
    pub channelizer_mini: String,
    pub channelizer_hf: String,
    pub detector: String,
    /// Extra `airspy_rx` arguments for detection runs
    pub airspy_args: String,
    /// File whose first line replaces `airspy_args`, relative to home
    pub airspy_args_file: String,
    /// Restarts allowed per process after a failure; 0 disables restart
    pub max_restarts: u32,
    pub restart_delay_ms: u64,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            home: None,
            airspy_rx: "airspy_rx".to_string(),
            airspyhf_rx: "airspyhf_rx_udp".to_string(),
            csdr: "csdr-uavrt".to_string(),
            channelizer_mini: "repos/airspy_channelize_mini/airspy_channelize".to_string(),
            channelizer_hf: "repos/airspy_channelize_hf/airspy_channelize".to_string(),
            detector: "repos/uavrt_detection/uavrt_detection".to_string(),
            airspy_args: DEFAULT_AIRSPY_ARGS.to_string(),
            airspy_args_file: "airspy_cmdline.txt".to_string(),
            max_restarts: 0,
            restart_delay_ms: 1000,
        }
    }
}

impl PipelineParams {
    pub fn home_dir(&self) -> PathBuf {
        self.home
            .clone()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve a program entry to something `Command::new` can run
    pub fn resolve_program(&self, program: &str) -> PathBuf {
        let path = Path::new(program);
        if path.is_absolute() || !program.contains('/') {
            path.to_path_buf()
        } else {
            self.home_dir().join(path)
        }
    }

    /// `airspy_rx` detection arguments, honouring the override file
    pub fn airspy_extra_args(&self) -> String {
        let path = self.home_dir().join(&self.airspy_args_file);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let line = text.lines().next().unwrap_or("").trim().to_string();
                crate::log_info!("Using custom airspy command line: {}", line);
                line
            }
            Err(_) => {
                crate::log_info!("Using default airspy command line: {}", self.airspy_args);
                self.airspy_args.clone()
            }
        }
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        if self.max_restarts == 0 {
            RestartPolicy::Never
        } else {
            RestartPolicy::Restart {
                max_restarts: self.max_restarts,
                delay: self.restart_delay(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_home(dir: &Path) -> PipelineParams {
        PipelineParams {
            home: Some(dir.to_path_buf()),
            ..PipelineParams::default()
        }
    }

    #[test]
    fn test_resolve_program() {
        let params = with_home(Path::new("/home/pi"));
        assert_eq!(params.resolve_program("airspy_rx"), PathBuf::from("airspy_rx"));
        assert_eq!(params.resolve_program("/bin/true"), PathBuf::from("/bin/true"));
        assert_eq!(
            params.resolve_program(&params.detector),
            PathBuf::from("/home/pi/repos/uavrt_detection/uavrt_detection")
        );
    }

    #[test]
    fn test_airspy_args_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(with_home(dir.path()).airspy_extra_args(), DEFAULT_AIRSPY_ARGS);
    }

    #[test]
    fn test_airspy_args_override_file_first_line() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("airspy_cmdline.txt"), "-h 10 -t 1\nignored\n").unwrap();
        assert_eq!(with_home(dir.path()).airspy_extra_args(), "-h 10 -t 1");
    }

    #[test]
    fn test_restart_policy() {
        let mut params = PipelineParams::default();
        assert_eq!(params.restart_policy(), RestartPolicy::Never);
        params.max_restarts = 3;
        assert_eq!(
            params.restart_policy(),
            RestartPolicy::Restart {
                max_restarts: 3,
                delay: Duration::from_secs(1)
            }
        );
    }
}
